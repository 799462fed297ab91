//! Kernel-wide error taxonomy.
//!
//! Every fallible kernel operation returns a [`SerenaError`] (directly, or
//! via an out-parameter set to a sentinel on error at a few legacy-shaped
//! call sites). `to_errno` gives the negative value surfaced to user space;
//! `EOK` itself never appears inside a `Result::Err` — success is `Ok(())`
//! or `Ok(value)`.

/// A POSIX-like kernel error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SerenaError {
    /// Invalid argument.
    Invalid,
    /// No such file or directory.
    NotFound,
    /// Permission denied by discretionary access check.
    Access,
    /// Resource busy (e.g. double-init, attach beyond capacity).
    Busy,
    /// No space left on device.
    NoSpace,
    /// Result too large for the supplied buffer/range.
    Range,
    /// Low-level I/O error.
    Io,
    /// Operation not implemented.
    NoSys,
    /// Wait interrupted by a signal.
    Interrupted,
    /// Wait timed out.
    TimedOut,
    /// Removable media was replaced mid-operation.
    DiskChange,
    /// Symlink resolution exceeded the recursion bound.
    SymlinkLoop,
    /// Bad file/channel descriptor.
    BadDescriptor,
    /// Operation not permitted (capability/credential check failed).
    NotPermitted,
    /// Filesystem is read-only.
    ReadOnly,
    /// Allocation failed.
    NoMemory,
    /// No medium present.
    NoMedium,
    /// Operation would block.
    WouldBlock,
    /// Path component is not a directory where one was required.
    NotADirectory,
    /// Path component is a directory where one was not allowed.
    IsADirectory,
}

impl SerenaError {
    /// Converts to the positive `errno` magnitude surfaced to user space.
    ///
    /// Syscall return values are `-errno` on failure; callers negate this.
    #[must_use]
    pub const fn to_errno(self) -> i32 {
        match self {
            Self::Invalid => 22,
            Self::NotFound => 2,
            Self::Access => 13,
            Self::Busy => 16,
            Self::NoSpace => 28,
            Self::Range => 34,
            Self::Io => 5,
            Self::NoSys => 38,
            Self::Interrupted => 4,
            Self::TimedOut => 110,
            Self::DiskChange => 61,
            Self::SymlinkLoop => 40,
            Self::BadDescriptor => 9,
            Self::NotPermitted => 1,
            Self::ReadOnly => 30,
            Self::NoMemory => 12,
            Self::NoMedium => 123,
            Self::WouldBlock => 11,
            Self::NotADirectory => 20,
            Self::IsADirectory => 21,
        }
    }
}

impl core::fmt::Display for SerenaError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Invalid => "EINVAL",
            Self::NotFound => "ENOENT",
            Self::Access => "EACCESS",
            Self::Busy => "EBUSY",
            Self::NoSpace => "ENOSPC",
            Self::Range => "ERANGE",
            Self::Io => "EIO",
            Self::NoSys => "ENOSYS",
            Self::Interrupted => "EINTR",
            Self::TimedOut => "ETIMEDOUT",
            Self::DiskChange => "EDISKCHANGE",
            Self::SymlinkLoop => "ELOOP",
            Self::BadDescriptor => "EBADF",
            Self::NotPermitted => "EPERM",
            Self::ReadOnly => "EROFS",
            Self::NoMemory => "ENOMEM",
            Self::NoMedium => "ENOMEDIUM",
            Self::WouldBlock => "EAGAIN",
            Self::NotADirectory => "ENOTDIR",
            Self::IsADirectory => "EISDIR",
        };
        f.write_str(name)
    }
}

/// A result returning a [`SerenaError`] on failure.
pub type SerenaResult<T> = Result<T, SerenaError>;

/// The outcome of a cancellable wait (sync-primitive wait, `wq_wait`, …).
///
/// Every wait in the kernel returns one of these three, per spec's uniform
/// cancellation/timeout contract (§5): a wait never leaves a waiter on its
/// queue after returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The wait completed normally (woken, or permits/condition satisfied).
    Ok,
    /// The wait was interrupted by a delivered signal.
    Interrupted,
    /// The wait's deadline elapsed before it completed.
    TimedOut,
}

impl WaitOutcome {
    /// Converts a non-`Ok` outcome to the corresponding [`SerenaError`].
    ///
    /// # Panics
    ///
    /// Panics if called on [`WaitOutcome::Ok`] — callers should check
    /// `is_ok` (or match) before converting.
    #[must_use]
    pub const fn into_error(self) -> SerenaError {
        match self {
            Self::Ok => panic!("WaitOutcome::Ok has no corresponding error"),
            Self::Interrupted => SerenaError::Interrupted,
            Self::TimedOut => SerenaError::TimedOut,
        }
    }

    /// Returns `true` if the wait completed normally.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}
