//! Reference counting for refcounted object subclasses.
//!
//! spec.md §3 is explicit that "reference counting is optional and applied
//! by refcounted subclasses; the class runtime itself does not impose a
//! memory policy" — so this is a thin, opt-in alias rather than a field on
//! [`crate::any::ObjectHeader`]. Subclasses that want shared ownership
//! (inodes handed out by the VFS, drivers attached under more than one bus
//! path) wrap themselves in [`Ref`]; subclasses that don't (most vCPU and
//! address-space state) simply never use this module.

use alloc::sync::Arc;

/// A reference-counted handle to an object.
///
/// An alias over [`alloc::sync::Arc`] rather than a hand-rolled intrusive
/// counter: the class runtime has no per-instance control block to hang a
/// count off (objects are plain Rust values behind an [`crate::any::Any`]
/// impl, not a fixed C-style struct layout), so shared ownership composes
/// the same way any other Rust subsystem's `Arc<T>` does.
pub type Ref<T> = Arc<T>;
