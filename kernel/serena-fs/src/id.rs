//! Filesystem-scoped identifiers.

use core::fmt;

/// A filesystem-scoped inode number. Unique within one mounted
/// [`crate::inode::Filesystem`]; combine with that filesystem's
/// [`crate::types::FsId`] for a key unique across the whole mount graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Ino(u64);

impl Ino {
    /// The root directory's inode number on every Serena filesystem.
    pub const ROOT: Self = Self(1);

    /// Creates a new `Ino`.
    #[must_use]
    pub const fn new(val: u64) -> Self {
        Self(val)
    }

    /// Returns the raw `u64` value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
