//! `/dev`: publishes drivers as inodes (spec.md §4.5: "directory nodes
//! represent buses, device nodes wrap a driver instance plus an opaque
//! `arg`. Opening a device node constructs an IOChannel by delegating to
//! the driver's open.").
//!
//! Ported from the donor kernel's `fs::devfs`. `/dev/null` and `/dev/zero`
//! are built in; real device entries are registered by
//! `kernel/serena-driver-api` through [`DevFs::with_extra_devices`] — this
//! crate has no dependency on the driver framework, only on the `Inode`
//! shape a driver-backed node must present.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;
use core::pin::Pin;

use serena_core::error::SerenaError;

use crate::id::Ino;
use crate::inode::{Filesystem, Inode, InodeFuture};
use crate::types::{DirEntry, InodeInfo, InodeType, Permissions};

/// The devfs filesystem.
pub struct DevFs {
    root: Arc<DevFsDir>,
}

impl Default for DevFs {
    fn default() -> Self {
        Self::new()
    }
}

impl DevFs {
    /// Creates a devfs with the standard built-in devices (`null`, `zero`).
    #[must_use]
    pub fn new() -> Self {
        let mut entries: BTreeMap<&'static str, Arc<dyn Inode>> = BTreeMap::new();
        entries.insert("null", Arc::new(DevNull));
        entries.insert("zero", Arc::new(DevZero));
        Self {
            root: Arc::new(DevFsDir { entries }),
        }
    }

    /// Creates a devfs with the built-in devices plus driver-registered
    /// entries (device nodes, or sub-directories for bus drivers).
    #[must_use]
    pub fn with_extra_devices(
        devices: impl IntoIterator<Item = (&'static str, Arc<dyn Inode>)>,
    ) -> Self {
        let mut entries: BTreeMap<&'static str, Arc<dyn Inode>> = BTreeMap::new();
        entries.insert("null", Arc::new(DevNull));
        entries.insert("zero", Arc::new(DevZero));
        for (name, inode) in devices {
            entries.insert(name, inode);
        }
        Self {
            root: Arc::new(DevFsDir { entries }),
        }
    }
}

impl Filesystem for DevFs {
    fn name(&self) -> &'static str {
        "devfs"
    }

    fn root(&self) -> Arc<dyn Inode> {
        self.root.clone()
    }
}

/// The devfs root directory (or a bus driver's sub-directory, once
/// `serena-driver-api` grows nested bus publishing).
struct DevFsDir {
    entries: BTreeMap<&'static str, Arc<dyn Inode>>,
}

impl Inode for DevFsDir {
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
        Box::pin(async move { self.entries.get(name).cloned().ok_or(SerenaError::NotFound) })
    }

    fn readdir(&self) -> InodeFuture<'_, Vec<DirEntry>> {
        Box::pin(async move {
            Ok(self
                .entries
                .iter()
                .enumerate()
                .map(|(i, (name, inode))| DirEntry {
                    name: (*name).to_string(),
                    inode_type: inode.inode_type(),
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
        Box::pin(async { Err(SerenaError::NotPermitted) })
    }

    fn unlink<'a>(&'a self, _name: &'a str) -> InodeFuture<'a, ()> {
        Box::pin(async { Err(SerenaError::NotPermitted) })
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

/// `/dev/null` — reads return EOF, writes are silently discarded.
pub struct DevNull;

impl Inode for DevNull {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        InodeType::Device
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::standard_file()
    }

    fn read<'a>(&'a self, _offset: usize, _buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async { Ok(0) })
    }

    fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move { Ok(buf.len()) })
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
            inode_type: InodeType::Device,
            link_count: 1,
            uid: 0,
            gid: 0,
            permissions: Permissions::standard_file(),
            size: 0,
        }
    }
}

/// `/dev/zero` — reads fill the buffer with zeros, writes are discarded.
pub struct DevZero;

impl Inode for DevZero {
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }

    fn inode_type(&self) -> InodeType {
        InodeType::Device
    }

    fn size(&self) -> usize {
        0
    }

    fn permissions(&self) -> Permissions {
        Permissions::standard_file()
    }

    fn read<'a>(&'a self, _offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move {
            buf.fill(0);
            Ok(buf.len())
        })
    }

    fn write<'a>(&'a self, _offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
        Box::pin(async move { Ok(buf.len()) })
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
            ino: Ino::new(3),
            inode_type: InodeType::Device,
            link_count: 1,
            uid: 0,
            gid: 0,
            permissions: Permissions::standard_file(),
            size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: Future>(fut: F) -> F::Output {
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
    fn null_read_returns_eof() {
        block_on(async {
            let devfs = DevFs::new();
            let null = devfs.root().lookup("null").await.unwrap();
            let mut buf = [1u8; 4];
            assert_eq!(null.read(0, &mut buf).await.unwrap(), 0);
        });
    }

    #[test]
    fn zero_read_fills_buffer() {
        block_on(async {
            let devfs = DevFs::new();
            let zero = devfs.root().lookup("zero").await.unwrap();
            let mut buf = [1u8; 4];
            assert_eq!(zero.read(0, &mut buf).await.unwrap(), 4);
            assert_eq!(buf, [0u8; 4]);
        });
    }

    #[test]
    fn writes_to_null_and_zero_are_discarded_but_accepted() {
        block_on(async {
            let devfs = DevFs::new();
            let null = devfs.root().lookup("null").await.unwrap();
            assert_eq!(null.write(0, b"abc").await.unwrap(), 3);
        });
    }

    #[test]
    fn root_readdir_lists_builtins() {
        block_on(async {
            let devfs = DevFs::new();
            let entries = devfs.root().readdir().await.unwrap();
            let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            names.sort_unstable();
            assert_eq!(names, ["null", "zero"]);
        });
    }
}
