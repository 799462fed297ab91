//! Counting semaphore.
//!
//! [`Semaphore`] limits concurrent access to a resource: tasks acquire
//! permits before proceeding and release them when done.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU32, Ordering};
use core::task::{Context, Poll};

use crate::sync::WaitQueue;

/// A counting semaphore.
///
/// # Example
///
/// ```ignore
/// static SEM: Semaphore = Semaphore::new(3); // 3 concurrent permits
///
/// async fn access_resource() {
///     let _permit = SEM.acquire().await;
///     // permit released on drop
/// }
/// ```
pub struct Semaphore {
    permits: AtomicU32,
    waiters: WaitQueue,
}

impl Semaphore {
    /// Creates a new semaphore with the given number of permits.
    pub const fn new(permits: u32) -> Self {
        Self {
            permits: AtomicU32::new(permits),
            waiters: WaitQueue::new(),
        }
    }

    /// Asynchronously acquires a single permit, parking the task if none
    /// are free.
    pub fn acquire(&self) -> SemaphoreAcquireFuture<'_> {
        self.acquire_many(1)
    }

    /// Asynchronously acquires `n` permits (spec.md §4.3 `wait(n)`).
    ///
    /// Takes whatever is currently available towards `n` on each wakeup,
    /// parking again for the remainder if it isn't enough yet — the same
    /// "loop to take remaining permits" a waiter does after
    /// [`post`](Self::post) hands it a partial share.
    pub fn acquire_many(&self, n: u32) -> SemaphoreAcquireFuture<'_> {
        SemaphoreAcquireFuture {
            sem: self,
            remaining: n,
            total: n,
            done: false,
        }
    }

    /// Tries to acquire a single permit without blocking.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.try_acquire_many(1)
    }

    /// Tries to acquire all `n` permits at once, without blocking and
    /// without taking a partial share (spec.md §4.3 `trywait`).
    #[must_use]
    pub fn try_acquire_many(&self, n: u32) -> Option<SemaphorePermit<'_>> {
        loop {
            let current = self.permits.load(Ordering::Relaxed);
            if current < n {
                return None;
            }
            if self
                .permits
                .compare_exchange_weak(current, current - n, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(SemaphorePermit { sem: self, count: n });
            }
        }
    }

    /// Takes up to `n` permits right now, returning how many it actually
    /// took (which may be `0..=n`). Never blocks.
    fn take_some(&self, n: u32) -> u32 {
        loop {
            let current = self.permits.load(Ordering::Relaxed);
            let take = current.min(n);
            if take == 0 {
                return 0;
            }
            if self
                .permits
                .compare_exchange_weak(current, current - take, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return take;
            }
        }
    }

    /// Returns the number of currently available permits.
    #[must_use]
    pub fn available_permits(&self) -> u32 {
        self.permits.load(Ordering::Relaxed)
    }

    /// Adds `n` permits back to the pool and wakes one waiter, which may
    /// loop to take the remaining permits if `n` doesn't fully satisfy it
    /// (spec.md §4.3 `post(n)`).
    pub fn post(&self, n: u32) {
        self.permits.fetch_add(n, Ordering::Release);
        self.waiters.wake_one();
    }
}

/// Future returned by [`Semaphore::acquire`] and [`Semaphore::acquire_many`].
pub struct SemaphoreAcquireFuture<'a> {
    sem: &'a Semaphore,
    remaining: u32,
    total: u32,
    done: bool,
}

impl<'a> Future for SemaphoreAcquireFuture<'a> {
    type Output = SemaphorePermit<'a>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.remaining > 0 {
            let took = self.sem.take_some(self.remaining);
            self.remaining -= took;
        }
        if self.remaining == 0 {
            self.done = true;
            return Poll::Ready(SemaphorePermit {
                sem: self.sem,
                count: self.total,
            });
        }

        let registered = self.sem.waiters.register_waker(cx.waker());

        let took = self.sem.take_some(self.remaining);
        self.remaining -= took;
        if self.remaining == 0 {
            self.done = true;
            return Poll::Ready(SemaphorePermit {
                sem: self.sem,
                count: self.total,
            });
        }

        if !registered {
            cx.waker().wake_by_ref();
        }

        Poll::Pending
    }
}

impl Drop for SemaphoreAcquireFuture<'_> {
    fn drop(&mut self) {
        // A multi-permit acquire that's cancelled mid-wait may already hold
        // a partial share towards `total`; hand it back rather than leaking
        // it, since it never got wrapped in a `SemaphorePermit`. Once
        // `done`, the permits belong to the returned `SemaphorePermit`.
        let taken = self.total - self.remaining;
        if !self.done && taken > 0 {
            self.sem.post(taken);
        }
    }
}

/// RAII permit that releases `count` permits back to the [`Semaphore`] on
/// drop.
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
    count: u32,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.sem.post(self.count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_succeeds() {
        let sem = Semaphore::new(2);
        let p1 = sem.try_acquire();
        assert!(p1.is_some());
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn try_acquire_exhausts_permits() {
        let sem = Semaphore::new(2);
        let _p1 = sem.try_acquire().unwrap();
        let _p2 = sem.try_acquire().unwrap();
        assert!(sem.try_acquire().is_none());
        assert_eq!(sem.available_permits(), 0);
    }

    #[test]
    fn permit_drop_releases() {
        let sem = Semaphore::new(1);
        {
            let _p = sem.try_acquire().unwrap();
            assert_eq!(sem.available_permits(), 0);
        }
        assert_eq!(sem.available_permits(), 1);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn zero_permits() {
        let sem = Semaphore::new(0);
        assert!(sem.try_acquire().is_none());
    }

    #[test]
    fn multiple_acquire_release_cycles() {
        let sem = Semaphore::new(3);
        for _ in 0..10 {
            let _p1 = sem.try_acquire().unwrap();
            let _p2 = sem.try_acquire().unwrap();
            let _p3 = sem.try_acquire().unwrap();
            assert!(sem.try_acquire().is_none());
        }
        assert_eq!(sem.available_permits(), 3);
    }

    #[test]
    fn acquire_future_ready_when_available() {
        use crate::sync::test_waker::noop_waker;
        let sem = Semaphore::new(1);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = sem.acquire();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(_)));
    }

    #[test]
    fn acquire_future_pending_when_exhausted() {
        use crate::sync::test_waker::noop_waker;
        let sem = Semaphore::new(1);
        let _p = sem.try_acquire().unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = sem.acquire();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
    }

    #[test]
    fn release_wakes_a_waiter() {
        use crate::sync::test_waker::counting_waker;
        let sem = Semaphore::new(1);
        let held = sem.try_acquire().unwrap();

        let (waker, counter) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = sem.acquire();
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        drop(held);
        assert!(counter.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn try_acquire_many_is_all_or_nothing() {
        let sem = Semaphore::new(2);
        assert!(sem.try_acquire_many(3).is_none());
        assert_eq!(sem.available_permits(), 2, "a failed trywait takes nothing");
        let p = sem.try_acquire_many(2).unwrap();
        assert_eq!(sem.available_permits(), 0);
        drop(p);
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn post_n_adds_back_n_permits() {
        let sem = Semaphore::new(0);
        sem.post(3);
        assert_eq!(sem.available_permits(), 3);
    }

    #[test]
    fn acquire_many_takes_partial_share_then_completes_across_two_posts() {
        use crate::sync::test_waker::noop_waker;
        let sem = Semaphore::new(1);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = sem.acquire_many(3);

        // First poll takes the 1 available permit, still needs 2 more.
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
        assert_eq!(sem.available_permits(), 0);

        sem.post(1);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        sem.post(1);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(permit) => drop(permit),
            Poll::Pending => panic!("expected ready after enough posts"),
        }
        assert_eq!(sem.available_permits(), 3, "permit releases all 3 on drop");
    }

    #[test]
    fn dropping_a_pending_multi_acquire_returns_its_partial_share() {
        use crate::sync::test_waker::noop_waker;
        let sem = Semaphore::new(1);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        {
            let mut fut = sem.acquire_many(3);
            assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
            assert_eq!(sem.available_permits(), 0);
        }
        assert_eq!(
            sem.available_permits(),
            1,
            "cancelling a pending acquire must not leak the permit it already took"
        );
    }
}
