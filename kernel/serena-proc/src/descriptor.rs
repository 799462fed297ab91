//! Per-process descriptor table (spec.md §4.7: "descriptor table keyed
//! by small integers (`stdin`=0, `stdout`=1, `stderr`=2)").
//!
//! Grounded on the donor's `fs::file::FileDescriptorTable`
//! (`kernel/hadron-kernel/src/fs/file.rs`'s slot-indexed table), adapted
//! to hold [`serena_fs::OpenChannel`]s instead of the donor's own file
//! descriptor struct, and to the async [`serena_core::sync::Mutex`] this
//! workspace uses everywhere spec.md §5 calls for a held mutex (here,
//! "Process descriptor table | process mtx | held across open/close/
//! dup").

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::id::ChannelId;
use serena_core::sync::Mutex;
use serena_fs::OpenChannel;

/// The conventional slot for standard input.
pub const STDIN: ChannelId = ChannelId::new(0);
/// The conventional slot for standard output.
pub const STDOUT: ChannelId = ChannelId::new(1);
/// The conventional slot for standard error.
pub const STDERR: ChannelId = ChannelId::new(2);

/// A process's open-channel table, indexed by small integer descriptor.
pub struct DescriptorTable {
    entries: Mutex<BTreeMap<u32, Arc<OpenChannel>>>,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Installs `channel` at the lowest unused descriptor, returning it.
    pub async fn insert(&self, channel: Arc<OpenChannel>) -> ChannelId {
        let mut entries = self.entries.lock().await;
        let mut candidate = 0u32;
        while entries.contains_key(&candidate) {
            candidate += 1;
        }
        entries.insert(candidate, channel);
        ChannelId::new(candidate)
    }

    /// Installs `channel` at exactly `id`, overwriting any existing entry
    /// (used for `stdin`/`stdout`/`stderr` inheritance during `spawn`).
    pub async fn insert_at(&self, id: ChannelId, channel: Arc<OpenChannel>) {
        self.entries.lock().await.insert(id.as_u32(), channel);
    }

    /// Returns the channel at `id`, if open.
    pub async fn get(&self, id: ChannelId) -> Option<Arc<OpenChannel>> {
        self.entries.lock().await.get(&id.as_u32()).cloned()
    }

    /// Duplicates the channel at `src` into a fresh descriptor, returning
    /// it (spec.md §4.8's `dup`).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::BadDescriptor`] if `src` is not open.
    pub async fn dup(&self, src: ChannelId) -> SerenaResult<ChannelId> {
        let channel = {
            let entries = self.entries.lock().await;
            entries
                .get(&src.as_u32())
                .cloned()
                .ok_or(SerenaError::BadDescriptor)?
        };
        Ok(self.insert(channel).await)
    }

    /// Closes the descriptor at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::BadDescriptor`] if `id` was not open.
    pub async fn close(&self, id: ChannelId) -> SerenaResult<()> {
        let mut entries = self.entries.lock().await;
        entries
            .remove(&id.as_u32())
            .map(|_| ())
            .ok_or(SerenaError::BadDescriptor)
    }

    /// Copies every entry of `other` into this table at the same
    /// descriptor numbers (spec.md §4.7: "Descriptor-inheritance is
    /// all-or-nothing: by default the first three descriptors are
    /// inherited").
    pub async fn inherit_from(&self, other: &DescriptorTable, ids: &[ChannelId]) {
        for &id in ids {
            if let Some(channel) = other.get(id).await {
                self.insert_at(id, channel).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serena_fs::ramfs::RamFs;
    use serena_fs::{Filesystem, InodeType, OpenFlags, Permissions};

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

    async fn channel() -> Arc<OpenChannel> {
        let fs = RamFs::new();
        let root = fs.root();
        let file = root
            .create("f", InodeType::Regular, Permissions::standard_file())
            .await
            .unwrap();
        Arc::new(OpenChannel::open(file, OpenFlags::READ).await.unwrap())
    }

    #[test]
    fn insert_fills_lowest_free_slot() {
        block_on(async {
            let table = DescriptorTable::new();
            let a = table.insert(channel().await).await;
            let b = table.insert(channel().await).await;
            assert_eq!(a, ChannelId::new(0));
            assert_eq!(b, ChannelId::new(1));
            table.close(a).await.unwrap();
            let c = table.insert(channel().await).await;
            assert_eq!(c, ChannelId::new(0));
        });
    }

    #[test]
    fn dup_shares_the_same_channel() {
        block_on(async {
            let table = DescriptorTable::new();
            let a = table.insert(channel().await).await;
            let b = table.dup(a).await.unwrap();
            assert!(Arc::ptr_eq(
                &table.get(a).await.unwrap(),
                &table.get(b).await.unwrap()
            ));
        });
    }

    #[test]
    fn close_missing_is_bad_descriptor() {
        block_on(async {
            let table = DescriptorTable::new();
            assert_eq!(
                table.close(ChannelId::new(9)).await.unwrap_err(),
                SerenaError::BadDescriptor
            );
        });
    }

    #[test]
    fn inherit_copies_listed_descriptors() {
        block_on(async {
            let parent = DescriptorTable::new();
            parent.insert_at(STDIN, channel().await).await;
            parent.insert_at(STDOUT, channel().await).await;

            let child = DescriptorTable::new();
            child.inherit_from(&parent, &[STDIN, STDOUT, STDERR]).await;

            assert!(child.get(STDIN).await.is_some());
            assert!(child.get(STDOUT).await.is_some());
            assert!(child.get(STDERR).await.is_none());
        });
    }
}
