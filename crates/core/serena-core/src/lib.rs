//! Core types and synchronization primitives for the Serena kernel.
//!
//! `serena-core` has no dependency on the scheduler, VFS, or driver layers —
//! it is the bottom of the dependency graph (spec.md §2's "Sync primitives"
//! row plus the identifier newtypes and error taxonomy every other crate
//! builds on). Built `no_std` in the kernel target; the `std` feature is
//! enabled implicitly under `cfg(test)` so the host test suite can use
//! `std::sync::Arc`-backed wakers.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod sync;
pub mod task;

pub use error::{SerenaError, SerenaResult, WaitOutcome};
pub use id::{ChannelId, ClassId, IrqVector, Pid, VcpuId};
pub use task::{Priority, TaskId, TaskMeta, VcpuState};
