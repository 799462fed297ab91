//! The driver catalog: publishes driver-backed inodes under DevFS
//! (spec.md §4.6: "The driver catalog publishes named entries under a
//! filesystem root (DevFS)... Drivers may be buses... and/or child
//! drivers... The framework tracks children by slot and refuses attach
//! beyond `max_child_count`.").
//!
//! Grounded on spec.md §5's locking table row "Driver catalog | catalog mtx
//! | held during publish/unpublish": every mutating catalog operation runs
//! under [`serena_core::sync::Mutex`], the same async-aware mutex
//! `kernel/serena-fs` uses for its own per-inode state.

use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::any::Any;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::sync::Mutex;
use serena_fs::inode::InodeFuture;
use serena_fs::types::{DirEntry, InodeInfo, InodeType, Permissions};
use serena_fs::{Ino, Inode, OpenFlags};

use crate::driver::{Driver, DeviceOps};

/// One entry attached to a bus driver's child slot table.
struct ChildSlot {
    slot_id: u32,
    driver: Arc<dyn Driver>,
}

/// Tracks the children attached to one bus driver, enforcing
/// `max_child_count` and stable slot ids within one enumeration.
pub struct ChildTable {
    max_child_count: u32,
    children: Mutex<Vec<ChildSlot>>,
}

impl ChildTable {
    /// Creates an empty child table with room for `max_child_count`
    /// entries.
    #[must_use]
    pub fn new(max_child_count: u32) -> Self {
        Self {
            max_child_count,
            children: Mutex::new(Vec::new()),
        }
    }

    /// Attaches `child` at `slot_id` (spec.md's `AttachStartChild(child,
    /// slotId)`).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Busy`] if `slot_id` is already occupied, or
    /// [`SerenaError::NoSpace`] if attaching would exceed
    /// `max_child_count`.
    pub async fn attach_child(&self, slot_id: u32, child: Arc<dyn Driver>) -> SerenaResult<()> {
        let mut children = self.children.lock().await;
        if children.len() as u32 >= self.max_child_count {
            return Err(SerenaError::NoSpace);
        }
        if children.iter().any(|c| c.slot_id == slot_id) {
            return Err(SerenaError::Busy);
        }
        children.push(ChildSlot { slot_id, driver: child });
        Ok(())
    }

    /// Returns the number of attached children currently `running`.
    pub async fn running_count(&self) -> u32 {
        let children = self.children.lock().await;
        children
            .iter()
            .filter(|c| c.driver.state() == crate::lifecycle::DriverState::Running)
            .count() as u32
    }

    /// Returns the child attached at `slot_id`, if any.
    pub async fn child_at(&self, slot_id: u32) -> Option<Arc<dyn Driver>> {
        let children = self.children.lock().await;
        children
            .iter()
            .find(|c| c.slot_id == slot_id)
            .map(|c| c.driver.clone())
    }
}

/// One published catalog entry: a driver plus the opaque unit argument its
/// DevFS node was registered with.
struct CatalogEntry {
    name: String,
    driver: Arc<dyn Driver>,
    ops: Arc<dyn DeviceOps>,
    arg: u64,
    ino: Ino,
}

/// The driver catalog: a DevFS-backed directory of published device nodes.
///
/// `publish`/`unpublish` run under a single internal mutex (spec.md §5's
/// "catalog mtx | held during publish/unpublish"); `start_driver`/
/// `stop_driver` additionally drive the [`crate::lifecycle::DriverState`]
/// machine around the driver's own `start`/`stop` hooks.
pub struct DriverCatalog {
    entries: Mutex<Vec<CatalogEntry>>,
    next_ino: core::sync::atomic::AtomicU64,
}

impl Default for DriverCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_ino: core::sync::atomic::AtomicU64::new(16),
        }
    }

    /// Starts `driver` (`created -> starting -> running`, or `-> destroyed`
    /// on failure) and publishes it under `name` with device data-movement
    /// delegated to `ops` with opaque unit `arg`.
    ///
    /// # Errors
    ///
    /// Propagates `driver.start()`'s error. Returns [`SerenaError::Busy`]
    /// if `driver` was not in the `created` state, or if `name` is already
    /// published.
    pub async fn publish(
        &self,
        name: &str,
        driver: Arc<dyn Driver>,
        ops: Arc<dyn DeviceOps>,
        arg: u64,
    ) -> SerenaResult<()> {
        if driver.state() != crate::lifecycle::DriverState::Created {
            return Err(SerenaError::Busy);
        }
        match driver.start() {
            Ok(()) => {}
            Err(e) => return Err(e),
        }
        let ino = Ino::new(self.next_ino.fetch_add(1, core::sync::atomic::Ordering::Relaxed));
        let mut entries = self.entries.lock().await;
        if entries.iter().any(|e| e.name == name) {
            return Err(SerenaError::Busy);
        }
        entries.push(CatalogEntry {
            name: name.to_string(),
            driver,
            ops,
            arg,
            ino,
        });
        Ok(())
    }

    /// Stops and removes the catalog entry named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::NotFound`] if no such entry is published, or
    /// [`SerenaError::Busy`] if the driver still has running children.
    pub async fn unpublish(&self, name: &str) -> SerenaResult<()> {
        let mut entries = self.entries.lock().await;
        let idx = entries
            .iter()
            .position(|e| e.name == name)
            .ok_or(SerenaError::NotFound)?;
        if entries[idx].driver.running_child_count() > 0 {
            return Err(SerenaError::Busy);
        }
        entries[idx].driver.stop()?;
        entries.remove(idx);
        Ok(())
    }

    /// Builds the `(name, inode)` pairs [`serena_fs::DevFs::with_extra_devices`]
    /// expects, snapshotting the catalog at call time.
    ///
    /// Named entries are leaked to `'static` the same way every other
    /// DevFS built-in node is: the catalog, like the driver table it
    /// publishes, lives for the kernel's entire run.
    pub async fn devfs_entries(&self) -> Vec<(&'static str, Arc<dyn Inode>)> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .map(|e| {
                let name: &'static str = Box::leak(e.name.clone().into_boxed_str());
                let node: Arc<dyn Inode> = Arc::new(DeviceNode {
                    ino: e.ino,
                    ops: e.ops.clone(),
                    arg: e.arg,
                });
                (name, node)
            })
            .collect()
    }
}

/// The DevFS inode a catalog entry publishes: wraps a driver instance plus
/// an opaque `arg` (spec.md §4.5).
struct DeviceNode {
    ino: Ino,
    ops: Arc<dyn DeviceOps>,
    arg: u64,
}

impl Inode for DeviceNode {
    fn as_any(&self) -> &dyn Any {
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

    fn read<'a>(&'a self, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
        self.ops.read(self.arg, offset, buf)
    }

    fn write<'a>(&'a self, offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
        self.ops.write(self.arg, offset, buf)
    }

    fn on_open(&self, flags: OpenFlags) -> InodeFuture<'_, ()> {
        self.ops.on_open(self.arg, flags)
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
            ino: self.ino,
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
    use crate::driver::{DriverInfo, IoCategory};
    use crate::lifecycle::{DriverState, LifecycleCell};

    struct NullDriver {
        info: DriverInfo,
        lifecycle: LifecycleCell,
    }

    impl Driver for NullDriver {
        fn info(&self) -> &DriverInfo {
            &self.info
        }
        fn state(&self) -> DriverState {
            self.lifecycle.get()
        }
        fn start(&self) -> SerenaResult<()> {
            assert!(self.lifecycle.begin_start());
            assert!(self.lifecycle.start_succeeded());
            Ok(())
        }
        fn stop(&self) -> SerenaResult<()> {
            assert!(self.lifecycle.begin_stop());
            assert!(self.lifecycle.finish_stop());
            Ok(())
        }
    }

    struct EchoOps;

    impl DeviceOps for EchoOps {
        fn read<'a>(&'a self, _arg: u64, _offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize> {
            Box::pin(async move {
                buf.fill(0x42);
                Ok(buf.len())
            })
        }
        fn write<'a>(&'a self, _arg: u64, _offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize> {
            Box::pin(async move { Ok(buf.len()) })
        }
    }

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

    fn driver(name: &str) -> Arc<NullDriver> {
        Arc::new(NullDriver {
            info: DriverInfo {
                name: name.to_string(),
                categories: &[IoCategory::Serial],
                max_child_count: 0,
            },
            lifecycle: LifecycleCell::new(),
        })
    }

    #[test]
    fn publish_starts_driver_and_lists_in_devfs() {
        block_on(async {
            let catalog = DriverCatalog::new();
            catalog
                .publish("ttyS0", driver("ttyS0"), Arc::new(EchoOps), 0)
                .await
                .unwrap();
            let entries = catalog.devfs_entries().await;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].0, "ttyS0");
            let mut buf = [0u8; 4];
            entries[0].1.read(0, &mut buf).await.unwrap();
            assert_eq!(buf, [0x42; 4]);
        });
    }

    #[test]
    fn publish_duplicate_name_is_busy() {
        block_on(async {
            let catalog = DriverCatalog::new();
            catalog
                .publish("a", driver("a"), Arc::new(EchoOps), 0)
                .await
                .unwrap();
            let err = catalog
                .publish("a", driver("a"), Arc::new(EchoOps), 0)
                .await
                .unwrap_err();
            assert_eq!(err, SerenaError::Busy);
        });
    }

    #[test]
    fn unpublish_missing_is_not_found() {
        block_on(async {
            let catalog = DriverCatalog::new();
            assert_eq!(
                catalog.unpublish("nope").await.unwrap_err(),
                SerenaError::NotFound
            );
        });
    }

    #[test]
    fn unpublish_stops_driver_and_removes_entry() {
        block_on(async {
            let catalog = DriverCatalog::new();
            catalog
                .publish("a", driver("a"), Arc::new(EchoOps), 0)
                .await
                .unwrap();
            catalog.unpublish("a").await.unwrap();
            assert!(catalog.devfs_entries().await.is_empty());
        });
    }

    #[test]
    fn child_table_rejects_duplicate_slot_and_overflow() {
        block_on(async {
            let table = ChildTable::new(1);
            table.attach_child(0, driver("child0")).await.unwrap();
            assert_eq!(
                table.attach_child(0, driver("child0b")).await.unwrap_err(),
                SerenaError::Busy
            );
            assert_eq!(
                table.attach_child(1, driver("child1")).await.unwrap_err(),
                SerenaError::NoSpace
            );
        });
    }
}
