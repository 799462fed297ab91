//! Stateless wait queue for interrupt-driven wakeups.
//!
//! [`WaitQueue`] stores [`Waker`]s from tasks waiting for an event. A wake
//! that arrives with no registered waiter is lost — the event is not
//! remembered. This is the right model for "something changed, go re-check
//! your condition" wakeups (mutex release, semaphore permit, rwmtx state
//! change); for "a specific signal was posted and must be observed even if
//! no one was waiting yet" semantics, see [`super::SignalWaitQueue`].
//!
//! Backed by a fixed-capacity [`ArrayVec`] so this type needs no allocator.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use planck_noalloc::vec::ArrayVec;

use crate::sync::IrqSpinLock;

/// Maximum number of waiters per queue.
const MAX_WAITERS: usize = 32;

/// Which waiter a queue wakes first (spec.md §4.3: "policy = FIFO or LIFO").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Wake the longest-waiting task first.
    #[default]
    Fifo,
    /// Wake the most recently registered task first.
    Lifo,
}

/// A queue of [`Waker`]s waiting for an event.
pub struct WaitQueue {
    waiters: IrqSpinLock<ArrayVec<Waker, MAX_WAITERS>>,
    policy: WaitPolicy,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    /// Creates an empty wait queue with FIFO wake order.
    pub const fn new() -> Self {
        Self::with_policy(WaitPolicy::Fifo)
    }

    /// Creates an empty wait queue with the given wake order.
    pub const fn with_policy(policy: WaitPolicy) -> Self {
        Self {
            waiters: IrqSpinLock::new(ArrayVec::new()),
            policy,
        }
    }

    /// Returns a future that completes the next time this queue is woken.
    ///
    /// Note this is edge-triggered: if the queue is woken between polls with
    /// no task registered, that wake is lost. Callers must register, then
    /// re-check their condition, in that order (see [`Mutex::lock`](crate::sync::Mutex::lock)
    /// for the canonical pattern).
    pub fn wait(&self) -> WaitFuture<'_> {
        WaitFuture {
            queue: self,
            registered: false,
        }
    }

    /// Registers a waker without creating a future.
    ///
    /// Returns `true` if registered, `false` if the queue was full — callers
    /// that get `false` back should self-wake to fall back to polling.
    pub fn register_waker(&self, waker: &Waker) -> bool {
        let mut waiters = self.waiters.lock();
        if waiters.len() < MAX_WAITERS {
            waiters.push(waker.clone());
            true
        } else {
            false
        }
    }

    /// Wakes one waiting task, in the queue's configured [`WaitPolicy`]
    /// order.
    pub fn wake_one(&self) {
        let mut waiters = self.waiters.lock();
        if waiters.is_empty() {
            return;
        }
        let waker = match self.policy {
            // Shift-preserving: `swap_remove(0)` would move the newest
            // waiter into slot 0, corrupting the order of the rest.
            WaitPolicy::Fifo => waiters.remove(0),
            WaitPolicy::Lifo => waiters.pop().expect("checked non-empty above"),
        };
        drop(waiters);
        waker.wake();
    }

    /// Wakes all waiting tasks, notified in the queue's configured
    /// [`WaitPolicy`] order.
    pub fn wake_all(&self) {
        let mut waiters = self.waiters.lock();
        let mut oldest_first = ArrayVec::<Waker, MAX_WAITERS>::new();
        while !waiters.is_empty() {
            oldest_first.push(waiters.remove(0));
        }
        drop(waiters);
        match self.policy {
            WaitPolicy::Fifo => {
                for w in oldest_first.iter() {
                    w.wake_by_ref();
                }
            }
            WaitPolicy::Lifo => {
                while let Some(w) = oldest_first.pop() {
                    w.wake();
                }
            }
        }
    }
}

/// Future returned by [`WaitQueue::wait`].
pub struct WaitFuture<'a> {
    queue: &'a WaitQueue,
    registered: bool,
}

impl Future for WaitFuture<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            Poll::Ready(())
        } else {
            self.registered = true;
            let mut waiters = self.queue.waiters.lock();
            if waiters.len() < MAX_WAITERS {
                waiters.push(cx.waker().clone());
            }
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::{counting_waker, noop_waker};
    use std::sync::atomic::Ordering;

    #[test]
    fn register_waker_succeeds() {
        let wq = WaitQueue::new();
        let waker = noop_waker();
        assert!(wq.register_waker(&waker));
    }

    #[test]
    fn register_waker_full() {
        let wq = WaitQueue::new();
        let waker = noop_waker();
        for _ in 0..MAX_WAITERS {
            assert!(wq.register_waker(&waker));
        }
        assert!(!wq.register_waker(&waker));
    }

    #[test]
    fn wake_one_fifo() {
        let wq = WaitQueue::new();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        wq.register_waker(&w1);
        wq.register_waker(&w2);

        wq.wake_one();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert_eq!(c2.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn wake_one_fifo_preserves_remaining_order_with_three_waiters() {
        // Regression test for swap_remove(0) corrupting order: with
        // [v1, v2, v3], successive wake_one calls must yield v1, v2, v3 --
        // swap_remove(0) would yield v1, v3, v2 instead.
        let wq = WaitQueue::new();
        let (v1, c1) = counting_waker();
        let (v2, c2) = counting_waker();
        let (v3, c3) = counting_waker();
        wq.register_waker(&v1);
        wq.register_waker(&v2);
        wq.register_waker(&v3);

        wq.wake_one();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert_eq!(c2.load(Ordering::SeqCst), 0);
        assert_eq!(c3.load(Ordering::SeqCst), 0);

        wq.wake_one();
        assert!(c2.load(Ordering::SeqCst) > 0);
        assert_eq!(c3.load(Ordering::SeqCst), 0);

        wq.wake_one();
        assert!(c3.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn wake_one_lifo_wakes_most_recent_first() {
        let wq = WaitQueue::with_policy(WaitPolicy::Lifo);
        let (v1, c1) = counting_waker();
        let (v2, c2) = counting_waker();
        wq.register_waker(&v1);
        wq.register_waker(&v2);

        wq.wake_one();
        assert!(c2.load(Ordering::SeqCst) > 0);
        assert_eq!(c1.load(Ordering::SeqCst), 0);

        wq.wake_one();
        assert!(c1.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn wake_all_wakes_everyone() {
        let wq = WaitQueue::new();
        let (w1, c1) = counting_waker();
        let (w2, c2) = counting_waker();
        let (w3, c3) = counting_waker();
        wq.register_waker(&w1);
        wq.register_waker(&w2);
        wq.register_waker(&w3);

        wq.wake_all();
        assert!(c1.load(Ordering::SeqCst) > 0);
        assert!(c2.load(Ordering::SeqCst) > 0);
        assert!(c3.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn wake_one_empty_no_panic() {
        let wq = WaitQueue::new();
        wq.wake_one();
    }

    #[test]
    fn wake_all_empty_no_panic() {
        let wq = WaitQueue::new();
        wq.wake_all();
    }

    #[test]
    fn wait_future_pending_then_ready() {
        let wq = WaitQueue::new();
        let waker = noop_waker();
        let mut cx = core::task::Context::from_waker(&waker);
        let mut fut = wq.wait();

        let result = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(result, Poll::Pending));

        let result = Pin::new(&mut fut).poll(&mut cx);
        assert!(matches!(result, Poll::Ready(())));
    }
}
