//! Driver framework (spec.md §4.6).
//!
//! [`driver::Driver`] is the base lifecycle trait every driver subclass
//! implements; [`driver::DeviceOps`] is the per-open data-movement
//! delegate a DevFS device node forwards reads/writes to.
//! [`lifecycle::LifecycleCell`] implements the
//! `created -> starting -> running -> stopping -> destroyed` state
//! machine. [`catalog::DriverCatalog`] publishes started drivers as DevFS
//! inodes and tracks bus children by slot.
//! [`io_request::IoRequestPool`] is the bounded pool of pooled request
//! blocks drivers use for async I/O. [`zorro`] enumerates a Zorro
//! autoconfig bus. [`framebuffer`] models surfaces, screens, and the
//! Copper program cache.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod catalog;
pub mod driver;
pub mod framebuffer;
pub mod io_request;
pub mod lifecycle;
pub mod registration;
pub mod zorro;

pub use catalog::{ChildTable, DriverCatalog};
pub use driver::{DeviceOps, Driver, DriverInfo, IoCategory};
pub use framebuffer::{ClutEntry, CopperCache, CopperProgram, IndexedFormat, Screen, Sprite, Surface};
pub use io_request::{IoRequest, IoRequestPool, RequestKind, RequestStatus};
pub use lifecycle::{DriverState, LifecycleCell};
pub use registration::DriverEntry;
