//! The abstract filesystem node (spec.md §4.5: "Inode is the abstract node;
//! operations read, write, truncate, create_channel, lookup, link, unlink,
//! rename, get_info, set_info, are dispatched through the filesystem").
//!
//! Every operation returns a boxed, pinned future rather than being an
//! `async fn`: trait objects (`Arc<dyn Inode>`) can't yet carry native
//! `async fn`s that return `Send` futures, so each method hand-writes the
//! `Pin<Box<dyn Future<...> + Send + 'a>>` shape. Ported from the donor
//! kernel's `fs::Inode`/`fs::FileSystem` split.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use core::future::Future;
use core::pin::Pin;

use serena_core::error::SerenaResult;

use crate::channel::OpenFlags;
use crate::container::FsContainer;
use crate::types::{DirEntry, InodeInfo, InodeType, Permissions};

/// A future returned by an [`Inode`] operation.
pub type InodeFuture<'a, T> = Pin<Box<dyn Future<Output = SerenaResult<T>> + Send + 'a>>;

/// The abstract filesystem node.
///
/// Subclasses (ramfs files/dirs, SerenaFS on-disk inodes, DevFS device
/// nodes, KernFS mount entries) add payload — block map, directory
/// entries, driver binding — but every caller goes through this vtable.
pub trait Inode: Send + Sync {
    /// Exposes the concrete type for same-filesystem downcasts.
    ///
    /// `rename`'s default implementation and each filesystem's own
    /// override use this to reach the destination directory's concrete
    /// type — trait objects carry no type id otherwise.
    fn as_any(&self) -> &dyn core::any::Any;

    /// This node's kind.
    fn inode_type(&self) -> InodeType;

    /// Content size in bytes (0 for directories and most device nodes).
    fn size(&self) -> usize;

    /// Current permission bits.
    fn permissions(&self) -> Permissions;

    /// Reads up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes actually read (short reads at EOF are
    /// not an error).
    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize>;

    /// Writes `buf` starting at `offset`, extending the file if needed.
    ///
    /// Returns the number of bytes written.
    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize>;

    /// Truncates (or zero-extends) content to exactly `len` bytes.
    fn truncate(&self, len: usize) -> InodeFuture<'_, ()> {
        let _ = len;
        Box::pin(async { Err(serena_core::error::SerenaError::NoSys) })
    }

    /// Runs just before an [`OpenChannel`] is constructed over this inode
    /// under `flags`.
    ///
    /// The default does nothing. Device nodes override this to hand off to
    /// the bound driver's own open routine (spec.md §4.5: "Opening a
    /// device node constructs an IOChannel by delegating to the driver's
    /// open") — [`crate::channel::OpenChannel::open`] is the actual
    /// constructor and always calls this hook first.
    fn on_open(&self, flags: OpenFlags) -> InodeFuture<'_, ()> {
        let _ = flags;
        Box::pin(async { Ok(()) })
    }

    /// Looks up a direct child by name (directories only).
    fn lookup<'a>(&'a self, name: &'a str) -> InodeFuture<'a, Arc<dyn Inode>>;

    /// Lists direct children (directories only).
    fn readdir(&self) -> InodeFuture<'_, alloc::vec::Vec<DirEntry>>;

    /// Creates a new child named `name` of kind `itype` (directories only).
    fn create<'a>(
        &'a self,
        name: &'a str,
        itype: InodeType,
        perms: Permissions,
    ) -> InodeFuture<'a, Arc<dyn Inode>>;

    /// Creates an additional directory entry `name` pointing at `target`
    /// (directories only). The default rejects hard links to directories,
    /// matching SerenaFS's single-parent invariant.
    fn link<'a>(&'a self, name: &'a str, target: &'a Arc<dyn Inode>) -> InodeFuture<'a, ()> {
        let _ = (name, target);
        Box::pin(async { Err(serena_core::error::SerenaError::NoSys) })
    }

    /// Removes the directory entry named `name` (directories only).
    fn unlink<'a>(&'a self, name: &'a str) -> InodeFuture<'a, ()>;

    /// Atomically moves the entry named `old_name` to `new_name` under
    /// `new_parent` (which may be `self`).
    fn rename<'a>(
        &'a self,
        old_name: &'a str,
        new_parent: &'a Arc<dyn Inode>,
        new_name: &'a str,
    ) -> InodeFuture<'a, ()> {
        let _ = (old_name, new_parent, new_name);
        Box::pin(async { Err(serena_core::error::SerenaError::NoSys) })
    }

    /// Returns this symlink's target path. Not a future: symlink targets
    /// are small and stored inline, so resolution never needs to suspend.
    fn read_link(&self) -> SerenaResult<String> {
        Err(serena_core::error::SerenaError::Invalid)
    }

    /// Creates a symlink named `name` pointing at `target` (directories
    /// only). Synchronous for the same reason as [`Inode::read_link`].
    fn create_symlink(
        &self,
        name: &str,
        target: &str,
        perms: Permissions,
    ) -> SerenaResult<Arc<dyn Inode>> {
        let _ = (name, target, perms);
        Err(serena_core::error::SerenaError::NoSys)
    }

    /// Returns a metadata snapshot (link count, owner, size, timestamps).
    fn get_info(&self) -> InodeInfo;

    /// Applies a partial metadata update (owner, permissions).
    fn set_info<'a>(&'a self, uid: Option<u32>, gid: Option<u32>, perms: Option<Permissions>) -> InodeFuture<'a, ()> {
        let _ = (uid, gid, perms);
        Box::pin(async { Err(serena_core::error::SerenaError::NoSys) })
    }
}

/// Owns inodes and implements their operations for one inode subclass.
///
/// Reports its backing container, read-only flag, and on-disk/filesystem
/// identity, matching spec.md §4.5's "Filesystem owns inodes and
/// implements the operations for its inode subclass."
pub trait Filesystem: Send + Sync {
    /// A short identifying name (`"ramfs"`, `"sefs"`, `"devfs"`, …).
    fn name(&self) -> &'static str;

    /// The root directory inode.
    fn root(&self) -> Arc<dyn Inode>;

    /// `true` if this filesystem rejects write operations
    /// (spec.md's `EROFS` path-resolution failure mode).
    fn is_read_only(&self) -> bool {
        false
    }

    /// The block-addressable store this filesystem is mounted on, if any
    /// (in-memory and synthetic filesystems have none).
    fn container(&self) -> Option<&dyn FsContainer> {
        None
    }
}
