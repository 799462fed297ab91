//! `/fs`: one entry per mounted filesystem (spec.md §4.5: "KernFS backs
//! `/fs` with filesystem-mount entries.").
//!
//! No donor file backs this directly — DevFS is the donor's only synthetic
//! filesystem — so `KernFsDir` is new code in the same shape as
//! `devfs::DevFsDir`: a read-only directory whose listing is generated on
//! the fly from [`crate::hierarchy::FileHierarchy`]'s own mount table
//! rather than stored as children.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::Write as _;

use serena_core::error::SerenaError;
use serena_core::sync::IrqSpinLock;

use crate::id::Ino;
use crate::inode::{Filesystem, Inode, InodeFuture};
use crate::types::{DirEntry, InodeInfo, InodeType, Permissions};

/// One line of `/fs` listing: a mounted filesystem's path and name.
#[derive(Debug, Clone)]
pub struct MountEntry {
    /// The path this filesystem is mounted at.
    pub path: String,
    /// The filesystem's own name (`"ramfs"`, `"sefs"`, …).
    pub fs_name: &'static str,
    /// Whether the mount rejects writes.
    pub read_only: bool,
}

/// The `/fs` filesystem. `entries` is refreshed by
/// [`crate::hierarchy::FileHierarchy::mount`]/`unmount` via
/// [`KernFs::set_entries`] — KernFS has no mount table of its own, it only
/// renders one it's handed.
pub struct KernFs {
    root: Arc<KernFsDir>,
}

impl Default for KernFs {
    fn default() -> Self {
        Self::new()
    }
}

impl KernFs {
    /// Creates a `/fs` filesystem with no entries yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Arc::new(KernFsDir {
                entries: IrqSpinLock::new(Vec::new()),
            }),
        }
    }

    /// Replaces the current mount listing.
    pub fn set_entries(&self, entries: Vec<MountEntry>) {
        *self.root.entries.lock() = entries;
    }
}

impl Filesystem for KernFs {
    fn name(&self) -> &'static str {
        "kernfs"
    }

    fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }

    fn is_read_only(&self) -> bool {
        true
    }
}

struct KernFsDir {
    entries: IrqSpinLock<Vec<MountEntry>>,
}

impl Inode for KernFsDir {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        InodeType::Directory
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::standard_dir()
    }

    fn read<'a>(&'a self, _offset: usize, _buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async { Err(SerenaError::IsADirectory) })
    }

    fn write<'a>(&'a self, _offset: usize, _buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async { Err(SerenaError::IsADirectory) })
    }

    fn lookup<'a>(&'a self, name: &'a str) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async move {
            let entries = self.entries.lock();
            let entry = entries
                .iter()
                .find(|e| e.path == name)
                .cloned()
                .ok_or(SerenaError::NotFound)?;
            Ok(Arc::new(MountFile(entry)) as Arc<dyn Inode>)
        })
    }

    fn readdir(&self) -> InodeFuture<'_, Vec<DirEntry>> {
        Box::pin(async move {
            Ok(self
                .entries
                .lock()
                .iter()
                .enumerate()
                .map(|(i, e)| DirEntry {
                    name: e.path.clone(),
                    inode_type: InodeType::Filesystem,
                    ino: Ino::new(i as u64 + 2),
                })
                .collect())
        })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
    ) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(SerenaError::ReadOnly) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> InodeFuture<'a, ()> {
        Box::pin(async { Err(SerenaError::ReadOnly) })
    }

    fn get_info(&self) -> InodeInfo {
        InodeInfo {
            ino: Ino::ROOT,
            inode_type: InodeType::Directory,
            link_count: 1,
            uid: 0,
            gid: 0,
            permissions: Permissions::standard_dir(),
            size: 0,
        }
    }
}

/// A single read-only `/fs/<mount>` entry rendering that mount's summary.
struct MountFile(MountEntry);

impl Inode for MountFile {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        InodeType::Filesystem
    }

    fn size(&self) -> usize {
        self.render().len()
    }

    fn permissions(&self) -> Permissions {
        Permissions::OWNER_READ | Permissions::GROUP_READ | Permissions::OTHER_READ
    }

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            let text = self.render();
            let bytes = text.as_bytes();
            if offset >= bytes.len() {
                return Ok(0);
            }
            let n = buf.len().min(bytes.len() - offset);
            buf[..n].copy_from_slice(&bytes[offset..offset + n]);
            Ok(n)
        })
    }

    fn write<'a>(&'a self, _offset: usize, _buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async { Err(SerenaError::ReadOnly) })
    }

    fn lookup<'a>(&'a self, _name: &'a str) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(SerenaError::NotADirectory) })
    }

    fn readdir(&self) -> InodeFuture<'_, Vec<DirEntry>> {
        Box::pin(async { Err(SerenaError::NotADirectory) })
    }

    fn create<'a>(
        &'a self,
        _name: &'a str,
        _itype: InodeType,
        _perms: Permissions,
    ) -> InodeFuture<'a, Arc<dyn Inode>> {
        Box::pin(async { Err(SerenaError::NotADirectory) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> InodeFuture<'a, ()> {
        Box::pin(async { Err(SerenaError::NotADirectory) })
    }

    fn get_info(&self) -> InodeInfo {
        InodeInfo {
            ino: Ino::new(2),
            inode_type: InodeType::Filesystem,
            link_count: 1,
            uid: 0,
            gid: 0,
            permissions: self.permissions(),
            size: self.render().len() as u64,
        }
    }
}

impl MountFile {
    fn render(&self) -> String {
        let mut s = String::new();
        let _ = write!(
            s,
            "{} {} {}\n",
            self.0.path,
            self.0.fs_name,
            if self.0.read_only { "ro" } else { "rw" }
        );
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString as _;

    fn block_on<F: core::future::Future>(fut: F) -> F::Output {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> core::task::RawWaker {
            core::task::RawWaker::new(p, &VTABLE)
        }
        static VTABLE: core::task::RawWakerVTable =
            core::task::RawWakerVTable::new(clone, noop, noop, noop);
        let raw = core::task::RawWaker::new(core::ptr::null(), &VTABLE);
        let waker = unsafe { core::task::Waker::from_raw(raw) };
        let mut cx = core::task::Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        loop {
            if let core::task::Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    #[test]
    fn lists_set_mount_entries() {
        block_on(async {
            let kernfs = KernFs::new();
            kernfs.set_entries(alloc::vec![MountEntry {
                path: "/".to_string(),
                fs_name: "ramfs",
                read_only: false,
            }]);
            let entries = kernfs.root().readdir().await.unwrap();
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].name, "/");
        });
    }

    #[test]
    fn mount_file_renders_summary() {
        block_on(async {
            let kernfs = KernFs::new();
            kernfs.set_entries(alloc::vec![MountEntry {
                path: "/dev".to_string(),
                fs_name: "devfs",
                read_only: true,
            }]);
            let file = kernfs.root().lookup("/dev").await.unwrap();
            let mut buf = [0u8; 64];
            let n = file.read(0, &mut buf).await.unwrap();
            let text = core::str::from_utf8(&buf[..n]).unwrap();
            assert!(text.contains("devfs"));
            assert!(text.contains("ro"));
        });
    }
}
