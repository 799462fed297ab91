//! Stateful wait queue for signal delivery.
//!
//! Unlike [`super::WaitQueue`], a [`SignalWaitQueue`] remembers pending
//! events in an atomic bitmask: a signal posted before anyone calls
//! [`SignalWaitQueue::sigwait`] is still observed by the next waiter whose
//! mask intersects it. This mirrors how per-process pending-signal state
//! works: `kill` before `sigwait` must not lose the signal.
//!
//! Each bit is a signal number in `0..64`.

use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::{Context, Poll, Waker};

use planck_noalloc::vec::ArrayVec;

use crate::sync::waitqueue::WaitPolicy;
use crate::sync::IrqSpinLock;

/// Maximum number of waiters per queue.
const MAX_WAITERS: usize = 32;

/// A set of signal numbers, represented as a 64-bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalSet(u64);

impl SignalSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// The set containing every signal number.
    pub const ALL: Self = Self(u64::MAX);

    /// Builds a set from a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Builds a set containing a single signal number.
    ///
    /// # Panics
    ///
    /// Panics if `signum >= 64`.
    #[must_use]
    pub const fn single(signum: u32) -> Self {
        assert!(signum < 64, "signal number out of range");
        Self(1u64 << signum)
    }

    /// Returns the raw bitmask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if this set shares any member with `other`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// A wait queue backed by a pending-signal bitmask.
///
/// [`post`](Self::post) is never lost: it ORs the bit in unconditionally,
/// regardless of whether a waiter is currently registered.
///
/// The queue's [`WaitPolicy`] governs only the *notification order* among
/// currently registered waiters ([`post`](Self::post) always broadcasts to
/// all of them, unlike [`super::WaitQueue::wake_one`]); which waiter
/// actually consumes the signal is decided by each waiter's own mask match
/// and the `try_take` CAS race, not by the policy.
pub struct SignalWaitQueue {
    pending: AtomicU64,
    waiters: IrqSpinLock<ArrayVec<Waker, MAX_WAITERS>>,
    policy: WaitPolicy,
}

impl Default for SignalWaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalWaitQueue {
    /// Creates an empty queue with no pending signals and FIFO notification
    /// order.
    pub const fn new() -> Self {
        Self::with_policy(WaitPolicy::Fifo)
    }

    /// Creates an empty queue with the given notification order.
    pub const fn with_policy(policy: WaitPolicy) -> Self {
        Self {
            pending: AtomicU64::new(0),
            waiters: IrqSpinLock::new(ArrayVec::new()),
            policy,
        }
    }

    /// Posts a signal, marking it pending and waking every registered
    /// waiter so each can re-check its own mask.
    ///
    /// # Panics
    ///
    /// Panics if `signum >= 64`.
    pub fn post(&self, signum: u32) {
        assert!(signum < 64, "signal number out of range");
        self.pending.fetch_or(1u64 << signum, Ordering::AcqRel);
        self.wake_all();
    }

    /// Returns `true` if any signal in `mask` is currently pending.
    #[must_use]
    pub fn has_pending(&self, mask: SignalSet) -> bool {
        self.pending.load(Ordering::Acquire) & mask.bits() != 0
    }

    /// Waits until a signal in `mask` is pending, then consumes and returns
    /// its number.
    ///
    /// If more than one signal in `mask` is pending, the lowest-numbered
    /// one is returned first (matching a process's own pending-signal
    /// dequeue order).
    pub fn sigwait(&self, mask: SignalSet) -> SigWaitFuture<'_> {
        SigWaitFuture {
            queue: self,
            mask,
            registered: false,
        }
    }

    fn try_take(&self, mask: SignalSet) -> Option<u32> {
        loop {
            let current = self.pending.load(Ordering::Acquire);
            let masked = current & mask.bits();
            if masked == 0 {
                return None;
            }
            let bit = masked.trailing_zeros();
            let next = current & !(1u64 << bit);
            if self
                .pending
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return Some(bit);
            }
        }
    }

    fn register_waker(&self, waker: &Waker) -> bool {
        let mut waiters = self.waiters.lock();
        if waiters.len() < MAX_WAITERS {
            waiters.push(waker.clone());
            true
        } else {
            false
        }
    }

    fn wake_all(&self) {
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

/// Future returned by [`SignalWaitQueue::sigwait`].
pub struct SigWaitFuture<'a> {
    queue: &'a SignalWaitQueue,
    mask: SignalSet,
    registered: bool,
}

impl Future for SigWaitFuture<'_> {
    type Output = u32;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u32> {
        if let Some(signum) = self.queue.try_take(self.mask) {
            return Poll::Ready(signum);
        }

        if !self.registered {
            self.registered = true;
            let registered = self.queue.register_waker(cx.waker());

            // Retry after registering, in case a post() raced between our
            // first try_take and the waker registration.
            if let Some(signum) = self.queue.try_take(self.mask) {
                return Poll::Ready(signum);
            }

            if !registered {
                cx.waker().wake_by_ref();
            }
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::test_waker::{counting_waker, noop_waker};
    use std::sync::atomic::Ordering as StdOrdering;

    #[test]
    fn post_before_wait_is_not_lost() {
        let q = SignalWaitQueue::new();
        q.post(5);
        assert!(q.has_pending(SignalSet::single(5)));
    }

    #[test]
    fn sigwait_consumes_pending_signal() {
        let q = SignalWaitQueue::new();
        q.post(5);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = q.sigwait(SignalSet::single(5));
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(signum) => assert_eq!(signum, 5),
            Poll::Pending => panic!("expected ready"),
        }
        assert!(!q.has_pending(SignalSet::single(5)));
    }

    #[test]
    fn sigwait_pending_when_mask_misses() {
        let q = SignalWaitQueue::new();
        q.post(5);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = q.sigwait(SignalSet::single(9));
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));
    }

    #[test]
    fn post_wakes_registered_waiter() {
        let q = SignalWaitQueue::new();
        let (waker, count) = counting_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = q.sigwait(SignalSet::single(2));
        assert!(matches!(Pin::new(&mut fut).poll(&mut cx), Poll::Pending));

        q.post(2);
        assert!(count.load(StdOrdering::SeqCst) > 0);
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(signum) => assert_eq!(signum, 2),
            Poll::Pending => panic!("expected ready after post"),
        }
    }

    #[test]
    fn lowest_numbered_signal_dequeued_first() {
        let q = SignalWaitQueue::new();
        q.post(10);
        q.post(3);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = q.sigwait(SignalSet::from_bits((1 << 3) | (1 << 10)));
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(signum) => assert_eq!(signum, 3),
            Poll::Pending => panic!("expected ready"),
        }
    }

    #[test]
    fn lifo_policy_notifies_most_recent_waiter_first() {
        use core::task::{RawWaker, RawWakerVTable};

        static ORDER: IrqSpinLock<ArrayVec<u32, 4>> = IrqSpinLock::new(ArrayVec::new());

        fn clone_1(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE_1)
        }
        fn clone_2(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE_2)
        }
        fn record_1(_: *const ()) {
            ORDER.lock().push(1);
        }
        fn record_2(_: *const ()) {
            ORDER.lock().push(2);
        }
        fn noop_drop(_: *const ()) {}
        static VTABLE_1: RawWakerVTable = RawWakerVTable::new(clone_1, record_1, record_1, noop_drop);
        static VTABLE_2: RawWakerVTable = RawWakerVTable::new(clone_2, record_2, record_2, noop_drop);
        let w1 = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE_1)) };
        let w2 = unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE_2)) };

        let q = SignalWaitQueue::with_policy(WaitPolicy::Lifo);
        let mut cx1 = Context::from_waker(&w1);
        let mut cx2 = Context::from_waker(&w2);
        let mut f1 = q.sigwait(SignalSet::single(0));
        let mut f2 = q.sigwait(SignalSet::single(0));
        assert!(matches!(Pin::new(&mut f1).poll(&mut cx1), Poll::Pending));
        assert!(matches!(Pin::new(&mut f2).poll(&mut cx2), Poll::Pending));

        q.post(0);
        let order: std::vec::Vec<u32> = ORDER.lock().iter().copied().collect();
        assert_eq!(order, std::vec![2, 1]);
    }

    #[test]
    fn signal_set_union_and_intersects() {
        let a = SignalSet::single(1);
        let b = SignalSet::single(2);
        let u = a.union(b);
        assert!(u.intersects(a));
        assert!(u.intersects(b));
        assert!(!a.intersects(b));
    }
}
