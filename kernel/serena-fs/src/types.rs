//! Shared VFS value types (spec.md §4.5's Inode/Filesystem field list).

use alloc::string::String;

use bitflags::bitflags;

use crate::id::Ino;

/// Filesystem-scoped inode identity: unique within one mounted filesystem,
/// not globally. Path resolution pairs this with the owning filesystem's
/// own identity to get a global `(fsid, ino)` key.
pub type FsId = u32;

bitflags! {
    /// POSIX-style permission bits (owner/group/other read-write-execute).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u16 {
        /// Owner may read.
        const OWNER_READ = 0o400;
        /// Owner may write.
        const OWNER_WRITE = 0o200;
        /// Owner may execute/traverse.
        const OWNER_EXEC = 0o100;
        /// Group may read.
        const GROUP_READ = 0o040;
        /// Group may write.
        const GROUP_WRITE = 0o020;
        /// Group may execute/traverse.
        const GROUP_EXEC = 0o010;
        /// Other may read.
        const OTHER_READ = 0o004;
        /// Other may write.
        const OTHER_WRITE = 0o002;
        /// Other may execute/traverse.
        const OTHER_EXEC = 0o001;
    }
}

impl Permissions {
    /// `rwxr-xr-x` (0755), the default for directories and device nodes.
    #[must_use]
    pub const fn standard_dir() -> Self {
        Self::from_bits_truncate(0o755)
    }

    /// `rw-r--r--` (0644), the default for regular files.
    #[must_use]
    pub const fn standard_file() -> Self {
        Self::from_bits_truncate(0o644)
    }
}

/// The kind of node an [`crate::inode::Inode`] represents (spec.md §4.5:
/// "type (regular/dir/device/fifo/lnk/fs/proc)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InodeType {
    /// A regular file.
    Regular,
    /// A directory.
    Directory,
    /// A device node backed by a driver instance (DevFS).
    Device,
    /// A named pipe.
    Fifo,
    /// A symbolic link.
    Symlink,
    /// A filesystem-mount entry (KernFS).
    Filesystem,
    /// A process/kernel-state node (KernFS, future `/proc`-style entries).
    Proc,
}

/// A three-timestamp set: access, modify, change (spec.md's "three
/// timestamps", mirrored on-disk in [`crate::sefs`] as big-endian
/// `(sec, nsec)` pairs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamps {
    /// Last read/lookup time.
    pub atime: serena_sched::Timespec,
    /// Last content modification time.
    pub mtime: serena_sched::Timespec,
    /// Last metadata change time.
    pub ctime: serena_sched::Timespec,
}

/// Inode metadata returned by [`crate::inode::Inode::get_info`] and settable
/// (in part) via `set_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeInfo {
    /// Filesystem-scoped inode number.
    pub ino: Ino,
    /// Node kind.
    pub inode_type: InodeType,
    /// Hard link count.
    pub link_count: u32,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Permission bits.
    pub permissions: Permissions,
    /// Content size in bytes (0 for directories/devices).
    pub size: u64,
}

/// One entry produced by [`crate::inode::Inode::readdir`]-style listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name, not including path separators.
    pub name: String,
    /// The kind of the named inode, without resolving it.
    pub inode_type: InodeType,
    /// The named inode's number.
    pub ino: Ino,
}
