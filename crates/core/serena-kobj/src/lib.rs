//! The Serena class runtime: vtables, instance layout, super-dispatch, and
//! refcounting (spec.md §4.1).
//!
//! Classes are declared with [`define_class!`], placed in the
//! `serena_classes` linker section by `serena-linkset`, and resolved once at
//! boot by [`class::init`]. Every long-lived kernel object implements
//! [`any::Any`] over an [`any::ObjectHeader`].

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod any;
pub mod class;
pub mod refcount;

pub use any::{Any, ObjectHeader};
pub use class::{init, is_ancestor, lookup, resolve_super, ClassDescriptor, MAX_VTABLE_SLOTS};
pub use refcount::Ref;
