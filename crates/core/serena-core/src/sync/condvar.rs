//! Condition variable for waiting on a predicate guarded by a [`Mutex`].
//!
//! `cnd_wait` must release the mutex and start waiting as a single atomic
//! step with respect to `notify` — otherwise a notify arriving between the
//! unlock and the wait registration is lost forever. [`Condvar::wait`]
//! achieves this by registering the waker *before* dropping the guard: the
//! single-CPU cooperative executor cannot run `notify_one`/`notify_all`
//! concurrently with this poll, so registration strictly precedes release
//! from every other task's point of view.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::sync::mutex::{Mutex, MutexGuard};
use crate::sync::WaitQueue;

/// A condition variable, always used together with a [`Mutex`] guarding the
/// predicate being waited on.
pub struct Condvar {
    waiters: WaitQueue,
}

impl Default for Condvar {
    fn default() -> Self {
        Self::new()
    }
}

impl Condvar {
    /// Creates a new condition variable with no waiters.
    pub const fn new() -> Self {
        Self {
            waiters: WaitQueue::new(),
        }
    }

    /// Atomically releases `guard`'s mutex and waits to be notified.
    ///
    /// Resolves to the mutex, which the caller must re-lock (and re-check
    /// its predicate against — spurious wakeups are possible, as with every
    /// condvar) before trusting the state it guards.
    pub fn wait<'a, T>(&'a self, guard: MutexGuard<'a, T>) -> CondvarWaitFuture<'a, T> {
        CondvarWaitFuture {
            condvar: self,
            mutex: guard.mutex(),
            guard: Some(guard),
        }
    }

    /// Wakes one waiting task.
    pub fn notify_one(&self) {
        self.waiters.wake_one();
    }

    /// Wakes every waiting task.
    pub fn notify_all(&self) {
        self.waiters.wake_all();
    }
}

/// Future returned by [`Condvar::wait`].
pub struct CondvarWaitFuture<'a, T> {
    condvar: &'a Condvar,
    mutex: &'a Mutex<T>,
    guard: Option<MutexGuard<'a, T>>,
}

impl<'a, T> Future for CondvarWaitFuture<'a, T> {
    type Output = &'a Mutex<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(guard) = self.guard.take() {
            // Register first, then drop the guard: no notify can slip in
            // between registration and release on a single CPU.
            let registered = self.condvar.waiters.register_waker(cx.waker());
            drop(guard);
            if !registered {
                cx.waker().wake_by_ref();
            }
            return Poll::Pending;
        }

        // Second poll: we were woken after releasing the guard.
        Poll::Ready(self.mutex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::{counting_waker, noop_waker};

    #[test]
    fn notify_wakes_waiter() {
        let mtx = Mutex::new(0u32);
        let cv = Condvar::new();

        let guard = mtx.try_lock().unwrap();
        let (waker, counter) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = cv.wait(guard);

        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
        // Mutex was released by the wait.
        assert!(mtx.try_lock().is_some());

        cv.notify_one();
        assert!(counter.load(core::sync::atomic::Ordering::SeqCst) > 0);
    }

    #[test]
    fn wait_releases_mutex_immediately() {
        let mtx = Mutex::new(0u32);
        let cv = Condvar::new();
        let guard = mtx.try_lock().unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = cv.wait(guard);
        let _ = Pin::new(&mut fut).poll(&mut cx);
        assert!(
            mtx.try_lock().is_some(),
            "mutex must be free during the wait"
        );
    }

    #[test]
    fn second_poll_resolves_to_mutex() {
        let mtx = Mutex::new(7u32);
        let cv = Condvar::new();
        let guard = mtx.try_lock().unwrap();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = cv.wait(guard);
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(m) => assert_eq!(*m.try_lock().unwrap(), 7),
            Poll::Pending => panic!("expected ready on second poll"),
        }
    }
}
