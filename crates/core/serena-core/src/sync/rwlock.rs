//! Async-aware reader-writer lock with recursive exclusive re-acquisition.
//!
//! `state` is 0 when unlocked, `N` while `N` readers hold it, and
//! [`WRITE_LOCKED`] while a writer holds it. A vCPU that already holds the
//! write lock may call [`RwMutex::write`]/[`RwMutex::try_write`] again
//! without deadlocking: `owner` records which vCPU holds the write lock and
//! `recursion` counts how many nested acquisitions it has made, so the lock
//! is only released to other waiters once the last nested guard drops.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::{Context, Poll};

use crate::id::VcpuId;
use crate::sync::WaitQueue;

const WRITE_LOCKED: u32 = u32::MAX;
const NO_OWNER: u32 = u32::MAX;

/// An async-aware reader-writer lock.
pub struct RwMutex<T> {
    state: AtomicU32,
    owner: AtomicU32,
    recursion: AtomicU32,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

// SAFETY: `state` gates all access to `data`; readers only ever get `&T`.
unsafe impl<T: Send> Send for RwMutex<T> {}
// SAFETY: same reasoning as `Send`.
unsafe impl<T: Send + Sync> Sync for RwMutex<T> {}

impl<T> RwMutex<T> {
    /// Creates a new unlocked `RwMutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU32::new(0),
            owner: AtomicU32::new(NO_OWNER),
            recursion: AtomicU32::new(0),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns a future that resolves to a shared [`RwMutexReadGuard`].
    pub fn read(&self) -> RwMutexReadFuture<'_, T> {
        RwMutexReadFuture { lock: self }
    }

    /// Returns a future that resolves to an exclusive [`RwMutexWriteGuard`].
    ///
    /// `owner` identifies the calling vCPU; if it already holds the write
    /// lock, this call nests rather than deadlocking.
    pub fn write(&self, owner: VcpuId) -> RwMutexWriteFuture<'_, T> {
        RwMutexWriteFuture { lock: self, owner }
    }

    /// Attempts to acquire a shared lock without blocking.
    pub fn try_read(&self) -> Option<RwMutexReadGuard<'_, T>> {
        loop {
            let current = self.state.load(Ordering::Relaxed);
            if current == WRITE_LOCKED {
                return None;
            }
            if self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(RwMutexReadGuard { lock: self });
            }
        }
    }

    /// Attempts to acquire an exclusive lock without blocking.
    ///
    /// If the calling vCPU (`owner`) already holds the write lock, this
    /// succeeds and increments the recursion depth instead of failing.
    pub fn try_write(&self, owner: VcpuId) -> Option<RwMutexWriteGuard<'_, T>> {
        if self.state.load(Ordering::Relaxed) == WRITE_LOCKED
            && self.owner.load(Ordering::Relaxed) == owner.as_u32()
        {
            self.recursion.fetch_add(1, Ordering::Relaxed);
            return Some(RwMutexWriteGuard { lock: self });
        }

        if self
            .state
            .compare_exchange(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(owner.as_u32(), Ordering::Relaxed);
            self.recursion.store(1, Ordering::Relaxed);
            return Some(RwMutexWriteGuard { lock: self });
        }

        None
    }
}

/// Future returned by [`RwMutex::read`].
pub struct RwMutexReadFuture<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<'a, T> Future for RwMutexReadFuture<'a, T> {
    type Output = RwMutexReadGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(guard) = self.lock.try_read() {
            return Poll::Ready(guard);
        }
        let registered = self.lock.waiters.register_waker(cx.waker());
        if let Some(guard) = self.lock.try_read() {
            return Poll::Ready(guard);
        }
        if !registered {
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}

/// Future returned by [`RwMutex::write`].
pub struct RwMutexWriteFuture<'a, T> {
    lock: &'a RwMutex<T>,
    owner: VcpuId,
}

impl<'a, T> Future for RwMutexWriteFuture<'a, T> {
    type Output = RwMutexWriteGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(guard) = self.lock.try_write(self.owner) {
            return Poll::Ready(guard);
        }
        let registered = self.lock.waiters.register_waker(cx.waker());
        if let Some(guard) = self.lock.try_write(self.owner) {
            return Poll::Ready(guard);
        }
        if !registered {
            cx.waker().wake_by_ref();
        }
        Poll::Pending
    }
}

/// RAII guard for shared (read) access.
pub struct RwMutexReadGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<T> Deref for RwMutexReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: `state` guarantees no writer holds the lock.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwMutexReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::Release);
        self.lock.waiters.wake_one();
    }
}

/// RAII guard for exclusive (write) access.
pub struct RwMutexWriteGuard<'a, T> {
    lock: &'a RwMutex<T>,
}

impl<T> Deref for RwMutexWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: `state == WRITE_LOCKED` guarantees exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwMutexWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `state == WRITE_LOCKED` guarantees exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwMutexWriteGuard<'_, T> {
    fn drop(&mut self) {
        let depth = self.lock.recursion.fetch_sub(1, Ordering::AcqRel);
        if depth == 1 {
            self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
            self.lock.state.store(0, Ordering::Release);
            self.lock.waiters.wake_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lock() {
        let lock = RwMutex::new(5);
        let guard = lock.try_read().unwrap();
        assert_eq!(*guard, 5);
    }

    #[test]
    fn multiple_readers() {
        let lock = RwMutex::new(5);
        let g1 = lock.try_read().unwrap();
        let g2 = lock.try_read().unwrap();
        assert_eq!(*g1, 5);
        assert_eq!(*g2, 5);
    }

    #[test]
    fn write_lock() {
        let lock = RwMutex::new(5);
        let mut guard = lock.try_write(VcpuId::new(0)).unwrap();
        *guard = 10;
        drop(guard);
        assert_eq!(*lock.try_read().unwrap(), 10);
    }

    #[test]
    fn try_read_fails_while_write_held() {
        let lock = RwMutex::new(5);
        let _w = lock.try_write(VcpuId::new(0)).unwrap();
        assert!(lock.try_read().is_none());
    }

    #[test]
    fn try_write_fails_while_read_held() {
        let lock = RwMutex::new(5);
        let _r = lock.try_read().unwrap();
        assert!(lock.try_write(VcpuId::new(0)).is_none());
    }

    #[test]
    fn try_write_fails_while_other_vcpu_writes() {
        let lock = RwMutex::new(5);
        let _w = lock.try_write(VcpuId::new(0)).unwrap();
        assert!(lock.try_write(VcpuId::new(1)).is_none());
    }

    #[test]
    fn write_after_readers_dropped() {
        let lock = RwMutex::new(5);
        {
            let _r1 = lock.try_read().unwrap();
            let _r2 = lock.try_read().unwrap();
        }
        assert!(lock.try_write(VcpuId::new(0)).is_some());
    }

    #[test]
    fn same_owner_reacquires_write_recursively() {
        let lock = RwMutex::new(5);
        let owner = VcpuId::new(3);
        let outer = lock.try_write(owner).unwrap();
        let inner = lock.try_write(owner).unwrap();
        drop(inner);
        // Still held by the outer guard — other vCPUs still locked out.
        assert!(lock.try_write(VcpuId::new(4)).is_none());
        drop(outer);
        assert!(lock.try_write(VcpuId::new(4)).is_some());
    }
}
