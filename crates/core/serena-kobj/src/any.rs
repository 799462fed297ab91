//! `Any`, the root of the single-inheritance object DAG.
//!
//! Every long-lived kernel entity carries an [`ObjectHeader`] as its first
//! field (mirroring "a record whose first word points to a class
//! descriptor" from spec.md §3) and implements [`Any`] to expose it.
//! `instanceof`/`classof` and super-dispatch are implemented once in
//! [`crate::class`] against this header rather than per type.

use serena_core::id::ClassId;

use crate::class::{self, is_ancestor};

/// The class-identity header every kernel object embeds.
///
/// Immutable after construction — spec.md's invariant that "the vtable
/// pointer is immutable after construction" is `class` here, since our
/// vtable is looked up by class id rather than stored inline per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    class: ClassId,
}

impl ObjectHeader {
    /// Creates a header for an instance of `class`.
    ///
    /// # Panics
    ///
    /// Panics if `class` has not yet been resolved by [`class::init`] —
    /// "an uninitialized class referenced at boot" is a fatal condition per
    /// spec.md §4.1.
    #[must_use]
    pub fn new(class: ClassId) -> Self {
        if let Some(desc) = class::lookup(class) {
            assert!(
                desc.is_initialized(),
                "constructing instance of uninitialized class {}",
                desc.name
            );
        }
        Self { class }
    }

    /// Returns the class id this header names.
    #[must_use]
    pub const fn class_id(self) -> ClassId {
        self.class
    }
}

/// Implemented by every object in the class runtime.
///
/// `classof(x)` from spec.md §3/§4.1 is [`Any::header`]`(x).class_id()`.
pub trait Any {
    /// Returns this object's identity header.
    fn header(&self) -> &ObjectHeader;

    /// Returns this object's dynamic class id.
    fn class_id(&self) -> ClassId {
        self.header().class_id()
    }

    /// `instanceof(self, C)`: true iff `C` is an ancestor of `classof(self)`
    /// (or `classof(self)` itself).
    fn instance_of(&self, class: ClassId) -> bool {
        is_ancestor(class, self.class_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub {
        header: ObjectHeader,
    }

    impl Any for Stub {
        fn header(&self) -> &ObjectHeader {
            &self.header
        }
    }

    #[test]
    fn header_roundtrips_class_id() {
        // Bypass `new`'s initialized-class assertion: no class table is
        // registered in host tests (see class.rs tests for why).
        let header = ObjectHeader {
            class: ClassId::new(5),
        };
        assert_eq!(header.class_id(), ClassId::new(5));
    }

    #[test]
    fn instance_of_self_with_empty_table() {
        // With no registered ancestors, instance_of is true only for the
        // exact class id (is_ancestor's base case).
        let stub = Stub {
            header: ObjectHeader {
                class: ClassId::new(7),
            },
        };
        assert!(stub.instance_of(ClassId::new(7)));
        assert!(!stub.instance_of(ClassId::new(8)));
    }
}
