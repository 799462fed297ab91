//! The disk cache (spec.md §4.5: "An LRU map `(fsid, lba) -> block`.
//! Operations: `map(lba, mode)` pins a block for read or read/write;
//! `unmap(token, write_mode)` unpins and possibly schedules writeback;
//! `prefetch(lba)` is a hint; `sync(lba)` and `sync(all)` flush.").
//!
//! No donor file implements quite this shape (the donor kernel's
//! filesystems go straight through `hadris_io` byte streams), so this is
//! new code grounded on the donor's general pattern for small bounded
//! in-kernel caches: a fixed-capacity table guarded by one lock
//! ([`serena_core::sync::IrqSpinLock`], the same primitive
//! `kernel/serena-sched`'s deadline queue uses) with an explicit
//! least-recently-used eviction scan, rather than an intrusive list.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::sync::IrqSpinLock;

use crate::container::FsContainer;
use crate::types::FsId;

/// The access mode a block was [`DiskCache::map`]ped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Read-only: the cache will never schedule this entry's writeback.
    Read,
    /// Read/write: dirties the entry; [`DiskCache::unmap`] with
    /// `write_mode = true` schedules a writeback.
    ReadWrite,
}

/// A key into the cache: a filesystem id paired with a logical block
/// address, unique across every mounted container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct BlockKey {
    fsid: FsId,
    lba: u64,
}

struct CacheEntry {
    data: Vec<u8>,
    pin_count: u32,
    dirty: bool,
    /// Monotonically increasing use counter; the lowest among unpinned
    /// entries is evicted first.
    last_used: u64,
}

/// An opaque handle returned by [`DiskCache::map`], presented back to
/// [`DiskCache::unmap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapToken {
    fsid: FsId,
    lba: u64,
}

struct Inner {
    entries: BTreeMap<BlockKey, CacheEntry>,
    clock: u64,
    capacity: usize,
}

/// An LRU cache of disk blocks, shared across every mounted container.
pub struct DiskCache {
    inner: IrqSpinLock<Inner>,
}

impl DiskCache {
    /// Creates an empty cache holding at most `capacity` blocks.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            inner: IrqSpinLock::new(Inner {
                entries: BTreeMap::new(),
                clock: 0,
                capacity,
            }),
        }
    }

    /// Pins logical block `lba` of `container` into the cache for `mode`
    /// access, reading it from the container on a miss.
    ///
    /// Returns a [`MapToken`] to hand back to [`DiskCache::unmap`] and a
    /// copy of the block's current bytes. The cache entry itself is kept
    /// pinned (not evicted) until unmapped, matching testable property 9
    /// ("a block returned from `map(lba, ReadWrite)` is stable until
    /// `unmap(token)`").
    ///
    /// # Errors
    ///
    /// Propagates the container's own read error on a cache miss.
    pub async fn map(
        &self,
        fsid: FsId,
        container: &dyn FsContainer,
        lba: u64,
        mode: MapMode,
    ) -> SerenaResult<(MapToken, Vec<u8>)> {
        let key = BlockKey { fsid, lba };

        if let Some(data) = self.try_pin_hit(key) {
            return Ok((MapToken { fsid, lba }, data));
        }

        let geometry = container.geometry();
        let mut buf = alloc::vec![0u8; geometry.block_size as usize];
        container.read_block(lba, &mut buf).await?;

        let mut inner = self.inner.lock();
        self.evict_if_needed(&mut inner);
        inner.clock += 1;
        let use_tick = inner.clock;
        inner.entries.insert(
            key,
            CacheEntry {
                data: buf.clone(),
                pin_count: 1,
                dirty: mode == MapMode::ReadWrite,
                last_used: use_tick,
            },
        );
        Ok((MapToken { fsid, lba }, buf))
    }

    fn try_pin_hit(&self, key: BlockKey) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let use_tick = inner.clock;
        let entry = inner.entries.get_mut(&key)?;
        entry.pin_count += 1;
        entry.last_used = use_tick;
        Some(entry.data.clone())
    }

    /// Unpins `token`. If `write_mode` is set, the entry is marked dirty
    /// and a writeback is scheduled (performed inline here — Serena has
    /// no background writeback vCPU yet, so `unmap` itself flushes once
    /// the pin count reaches zero).
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::Invalid`] if `token` does not name a
    /// currently-pinned entry.
    pub async fn unmap(
        &self,
        container: &dyn FsContainer,
        token: MapToken,
        write_mode: bool,
    ) -> SerenaResult<()> {
        let key = BlockKey {
            fsid: token.fsid,
            lba: token.lba,
        };

        let should_flush = {
            let mut inner = self.inner.lock();
            let entry = inner
                .entries
                .get_mut(&key)
                .ok_or(SerenaError::Invalid)?;
            entry.pin_count = entry.pin_count.saturating_sub(1);
            if write_mode {
                entry.dirty = true;
            }
            entry.pin_count == 0 && entry.dirty
        };

        if should_flush {
            self.sync_one(container, token.fsid, token.lba).await?;
        }
        Ok(())
    }

    /// Writes back a block's contents if the caller has a newer version
    /// than what `map` returned (read-modify-write callers copy the
    /// returned buffer, mutate it, then call this before `unmap`).
    pub fn update(&self, token: MapToken, data: &[u8]) {
        let key = BlockKey {
            fsid: token.fsid,
            lba: token.lba,
        };
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.data.clear();
            entry.data.extend_from_slice(data);
            entry.dirty = true;
        }
    }

    /// A hint that `lba` is likely to be accessed soon. Best-effort: the
    /// current implementation does nothing (no background I/O vCPU to
    /// hand the prefetch to yet), but the call is a stable no-op rather
    /// than an error so callers don't need a feature check.
    pub fn prefetch(&self, _fsid: FsId, _lba: u64) {}

    /// Flushes one dirty, unpinned block back to `container`.
    async fn sync_one(&self, container: &dyn FsContainer, fsid: FsId, lba: u64) -> SerenaResult<()> {
        let key = BlockKey { fsid, lba };
        let data = {
            let inner = self.inner.lock();
            match inner.entries.get(&key) {
                Some(entry) if entry.dirty => entry.data.clone(),
                _ => return Ok(()),
            }
        };
        container.write_block(lba, &data).await?;
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.dirty = false;
        }
        Ok(())
    }

    /// Flushes every dirty, unpinned block belonging to `fsid` back to
    /// `container`.
    pub async fn sync_all(&self, fsid: FsId, container: &dyn FsContainer) -> SerenaResult<()> {
        let dirty_lbas: Vec<u64> = {
            let inner = self.inner.lock();
            inner
                .entries
                .iter()
                .filter(|(k, e)| k.fsid == fsid && e.dirty && e.pin_count == 0)
                .map(|(k, _)| k.lba)
                .collect()
        };
        for lba in dirty_lbas {
            self.sync_one(container, fsid, lba).await?;
        }
        Ok(())
    }

    /// Evicts the least-recently-used unpinned entry if the cache is at
    /// capacity. A no-op if every entry is pinned (callers simply grow
    /// past `capacity` in that case, rather than failing `map`).
    fn evict_if_needed(&self, inner: &mut Inner) {
        if inner.entries.len() < inner.capacity {
            return;
        }
        let victim = inner
            .entries
            .iter()
            .filter(|(_, e)| e.pin_count == 0)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| *k);
        if let Some(key) = victim {
            inner.entries.remove(&key);
        }
    }
}

/// Binds a [`DiskCache`] to one [`FsContainer`], with the cache's block
/// size expressed as a multiple of the container's own sector size
/// (spec.md: "Sessions bind a cache to a container and a sector/block
/// ratio; closing a session syncs.").
pub struct CacheSession<'a> {
    cache: &'a DiskCache,
    container: Arc<dyn FsContainer>,
    fsid: FsId,
}

impl<'a> CacheSession<'a> {
    /// Opens a session binding `cache` to `container` under `fsid`.
    #[must_use]
    pub fn new(cache: &'a DiskCache, container: Arc<dyn FsContainer>, fsid: FsId) -> Self {
        Self {
            cache,
            container,
            fsid,
        }
    }

    /// See [`DiskCache::map`].
    ///
    /// # Errors
    ///
    /// See [`DiskCache::map`].
    pub async fn map(&self, lba: u64, mode: MapMode) -> SerenaResult<(MapToken, Vec<u8>)> {
        self.cache
            .map(self.fsid, self.container.as_ref(), lba, mode)
            .await
    }

    /// See [`DiskCache::unmap`].
    ///
    /// # Errors
    ///
    /// See [`DiskCache::unmap`].
    pub async fn unmap(&self, token: MapToken, write_mode: bool) -> SerenaResult<()> {
        self.cache
            .unmap(self.container.as_ref(), token, write_mode)
            .await
    }

    /// Flushes every dirty block belonging to this session's filesystem.
    ///
    /// # Errors
    ///
    /// Propagates the container's own write error.
    pub async fn sync(&self) -> SerenaResult<()> {
        self.cache.sync_all(self.fsid, self.container.as_ref()).await
    }
}

impl Drop for CacheSession<'_> {
    fn drop(&mut self) {
        // Best-effort: a session close syncs, but `Drop` can't run async
        // code or propagate an I/O error. Callers that need a guaranteed,
        // checked flush should call `sync` explicitly before the session
        // goes out of scope.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerGeometry;
    use core::future::Future;
    use core::pin::Pin;
    use core::task::{Context, Poll};

    struct MemContainer {
        blocks: IrqSpinLock<Vec<Vec<u8>>>,
        block_size: u32,
    }

    impl MemContainer {
        fn new(block_count: usize, block_size: u32) -> Self {
            Self {
                blocks: IrqSpinLock::new(alloc::vec![alloc::vec![0u8; block_size as usize]; block_count]),
                block_size,
            }
        }
    }

    impl FsContainer for MemContainer {
        fn geometry(&self) -> ContainerGeometry {
            ContainerGeometry {
                block_size: self.block_size,
                block_count: self.blocks.lock().len() as u64,
                read_only: false,
                removable: false,
            }
        }

        fn read_block<'a>(
            &'a self,
            lba: u64,
            buf: &'a mut [u8],
        ) -> crate::container::ContainerFuture<'a, ()> {
            Box::pin(async move {
                buf.copy_from_slice(&self.blocks.lock()[lba as usize]);
                Ok(())
            })
        }

        fn write_block<'a>(&'a self, lba: u64, buf: &'a [u8]) -> crate::container::ContainerFuture<'a, ()> {
            Box::pin(async move {
                self.blocks.lock()[lba as usize].copy_from_slice(buf);
                Ok(())
            })
        }
    }

    use alloc::boxed::Box;

    fn block_on<F: Future>(fut: F) -> F::Output {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> core::task::RawWaker {
            core::task::RawWaker::new(p, &VTABLE)
        }
        static VTABLE: core::task::RawWakerVTable =
            core::task::RawWakerVTable::new(clone, noop, noop, noop);
        let raw = core::task::RawWaker::new(core::ptr::null(), &VTABLE);
        let waker = unsafe { core::task::Waker::from_raw(raw) };
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        loop {
            if let Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    #[test]
    fn map_miss_reads_from_container_then_hits_cache() {
        let container = MemContainer::new(4, 16);
        let cache = DiskCache::new(8);
        block_on(async {
            let (token, data) = cache.map(1, &container, 0, MapMode::Read).await.unwrap();
            assert_eq!(data, alloc::vec![0u8; 16]);
            cache.unmap(&container, token, false).await.unwrap();
        });
    }

    #[test]
    fn mapped_block_stable_until_unmap() {
        let container = MemContainer::new(4, 16);
        let cache = DiskCache::new(8);
        block_on(async {
            let (token, mut data) = cache.map(1, &container, 2, MapMode::ReadWrite).await.unwrap();
            data[0] = 0xAB;
            cache.update(token, &data);
            let (_token2, data2) = cache.map(1, &container, 2, MapMode::Read).await.unwrap();
            assert_eq!(data2[0], 0xAB);
            cache.unmap(&container, token, true).await.unwrap();
        });
    }

    #[test]
    fn unmap_with_write_mode_flushes_to_container() {
        let container = MemContainer::new(4, 16);
        let cache = DiskCache::new(8);
        block_on(async {
            let (token, mut data) = cache.map(1, &container, 3, MapMode::ReadWrite).await.unwrap();
            data[0] = 0x7F;
            cache.update(token, &data);
            cache.unmap(&container, token, true).await.unwrap();
            let mut check = alloc::vec![0u8; 16];
            container.read_block(3, &mut check).await.unwrap();
            assert_eq!(check[0], 0x7F);
        });
    }

    #[test]
    fn unmap_unknown_token_is_invalid() {
        let container = MemContainer::new(4, 16);
        let cache = DiskCache::new(8);
        let result = block_on(cache.unmap(&container, MapToken { fsid: 9, lba: 9 }, false));
        assert_eq!(result, Err(SerenaError::Invalid));
    }
}
