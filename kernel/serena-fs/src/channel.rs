//! An open inode handle (spec.md §4.5/§4.8: the thing
//! `Inode::create_channel` produces, before the syscall layer wraps it in
//! the full vtable-dispatched `IOChannel`).
//!
//! Ported from the donor kernel's `fs::file::{FileDescriptor, OpenFlags}`,
//! renamed to match this spec's "channel" vocabulary and widened with an
//! atomic seek offset so a channel can be shared (dup'd) across
//! descriptor-table entries without an outer lock.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use bitflags::bitflags;

use serena_core::error::SerenaResult;

use crate::inode::Inode;

bitflags! {
    /// The mode an [`OpenChannel`] was opened under.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open for reading.
        const READ = 0b0000_0001;
        /// Open for writing.
        const WRITE = 0b0000_0010;
        /// Create the target if it does not exist.
        const CREATE = 0b0000_0100;
        /// Truncate the target to zero length on open.
        const TRUNCATE = 0b0000_1000;
        /// Writes always append, ignoring the current seek offset.
        const APPEND = 0b0001_0000;
        /// Reads/writes that would block return [`serena_core::error::SerenaError::WouldBlock`]
        /// instead of suspending.
        const NONBLOCK = 0b0010_0000;
    }
}

/// An open handle onto an [`Inode`], binding an [`OpenFlags`] mode to a
/// cached seek position (spec.md §4.8: "binds an open mode ... to a
/// resource ... holds ... an optional cached seek position").
pub struct OpenChannel {
    inode: Arc<dyn Inode>,
    offset: AtomicUsize,
    flags: OpenFlags,
}

impl OpenChannel {
    /// Opens `inode` under `flags`, running the inode's
    /// [`Inode::on_open`] hook first (where device nodes delegate to
    /// their driver's own open routine).
    ///
    /// # Errors
    ///
    /// Propagates any error from `on_open`.
    pub async fn open(inode: Arc<dyn Inode>, flags: OpenFlags) -> SerenaResult<Self> {
        inode.on_open(flags).await?;
        Ok(Self {
            inode,
            offset: AtomicUsize::new(0),
            flags,
        })
    }

    /// The underlying inode.
    #[must_use]
    pub fn inode(&self) -> &Arc<dyn Inode> {
        &self.inode
    }

    /// The mode this channel was opened under.
    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// The current seek offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Relaxed)
    }

    /// Sets the seek offset, returning the previous value.
    pub fn set_offset(&self, offset: usize) -> usize {
        self.offset.swap(offset, Ordering::Relaxed)
    }

    /// Reads from the current offset, advancing it by the amount read.
    ///
    /// # Errors
    ///
    /// Returns [`serena_core::error::SerenaError::NotPermitted`] if this
    /// channel was not opened [`OpenFlags::READ`], otherwise propagates
    /// the inode's own `read` error.
    pub async fn read(&self, buf: &mut [u8]) -> SerenaResult<usize> {
        if !self.flags.contains(OpenFlags::READ) {
            return Err(serena_core::error::SerenaError::NotPermitted);
        }
        let offset = self.offset();
        let n = self.inode.read(offset, buf).await?;
        self.offset.fetch_add(n, Ordering::Relaxed);
        Ok(n)
    }

    /// Writes at the current offset (or always at EOF if
    /// [`OpenFlags::APPEND`]), advancing the offset by the amount written.
    ///
    /// # Errors
    ///
    /// Returns [`serena_core::error::SerenaError::NotPermitted`] if this
    /// channel was not opened [`OpenFlags::WRITE`], otherwise propagates
    /// the inode's own `write` error.
    pub async fn write(&self, buf: &[u8]) -> SerenaResult<usize> {
        if !self.flags.contains(OpenFlags::WRITE) {
            return Err(serena_core::error::SerenaError::NotPermitted);
        }
        let offset = if self.flags.contains(OpenFlags::APPEND) {
            self.inode.size()
        } else {
            self.offset()
        };
        let n = self.inode.write(offset, buf).await?;
        self.offset.store(offset + n, Ordering::Relaxed);
        Ok(n)
    }
}
