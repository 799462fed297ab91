//! Async-aware mutual exclusion lock.
//!
//! Unlike [`IrqSpinLock`](crate::sync::IrqSpinLock), [`Mutex`] parks the
//! current vCPU task via [`WaitQueue`] when contended, letting the executor
//! run other ready work instead of spinning. Const-constructable for use in
//! `static` items.

use core::cell::UnsafeCell;
use core::future::Future;
use core::ops::{Deref, DerefMut};
use core::pin::Pin;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll};

use crate::sync::WaitQueue;

/// An async-aware mutual exclusion lock.
///
/// # Example
///
/// ```ignore
/// static COUNTER: Mutex<u64> = Mutex::new(0);
///
/// async fn increment() {
///     let mut guard = COUNTER.lock().await;
///     *guard += 1;
/// }
/// ```
pub struct Mutex<T> {
    locked: AtomicBool,
    waiters: WaitQueue,
    data: UnsafeCell<T>,
}

// SAFETY: the `locked` flag ensures exclusive access to `data`.
unsafe impl<T: Send> Send for Mutex<T> {}
// SAFETY: same reasoning as `Send`.
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitQueue::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Returns a future that resolves to a [`MutexGuard`] once the lock is
    /// acquired.
    pub fn lock(&self) -> MutexLockFuture<'_, T> {
        MutexLockFuture { mutex: self }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Acquires the lock synchronously by spinning.
    ///
    /// Only for use outside an async context — during boot, before the
    /// executor is running.
    pub fn lock_sync(&self) -> MutexGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            core::hint::spin_loop();
        }
    }
}

/// Future returned by [`Mutex::lock`].
pub struct MutexLockFuture<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Future for MutexLockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self
            .mutex
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        // Register before retrying to avoid a lost wakeup: if the unlock
        // happens between our first failed CAS and this registration, the
        // retry below catches it.
        let registered = self.mutex.waiters.register_waker(cx.waker());

        if self
            .mutex
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        if !registered {
            cx.waker().wake_by_ref();
        }

        Poll::Pending
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> MutexGuard<'a, T> {
    /// Returns the mutex this guard locks.
    ///
    /// Used by [`Condvar::wait`](crate::sync::Condvar::wait) to recover the
    /// mutex reference before consuming the guard.
    pub(crate) const fn mutex(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.mutex.waiters.wake_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::noop_waker;

    #[test]
    fn try_lock_succeeds_when_free() {
        let mtx = Mutex::new(0u32);
        assert!(mtx.try_lock().is_some());
    }

    #[test]
    fn try_lock_fails_when_held() {
        let mtx = Mutex::new(0u32);
        let _guard = mtx.try_lock().unwrap();
        assert!(mtx.try_lock().is_none());
    }

    #[test]
    fn try_lock_succeeds_after_drop() {
        let mtx = Mutex::new(0u32);
        {
            let _guard = mtx.try_lock().unwrap();
        }
        assert!(mtx.try_lock().is_some());
    }

    #[test]
    fn lock_future_ready_when_free() {
        let mtx = Mutex::new(5u32);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mtx.lock();
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(guard) => assert_eq!(*guard, 5),
            Poll::Pending => panic!("expected ready"),
        }
    }

    #[test]
    fn lock_future_pending_when_held() {
        let mtx = Mutex::new(0u32);
        let _held = mtx.try_lock().unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mtx.lock();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
    }

    #[test]
    fn guard_mutates_data() {
        let mtx = Mutex::new(10u32);
        *mtx.try_lock().unwrap() += 5;
        assert_eq!(*mtx.try_lock().unwrap(), 15);
    }

    #[test]
    fn unlock_wakes_a_waiter() {
        let mtx = Mutex::new(0u32);
        let held = mtx.try_lock().unwrap();

        let (waker, counter) = crate::sync::test_waker::counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = mtx.lock();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        drop(held);
        assert!(counter.load(core::sync::atomic::Ordering::SeqCst) > 0);
    }
}
