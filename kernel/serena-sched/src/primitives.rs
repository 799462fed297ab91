//! Timer-dependent async scheduling primitives.
//!
//! Grounded on the donor kernel's `sched::primitives::sleep_ticks` (itself
//! layered over `sched::timer::register_sleep_waker`): a `Future` that
//! checks the clock once on each poll and, if not yet due, arms a
//! [`crate::clock::Clock`] deadline carrying this poll's waker.
//!
//! [`timeout`] composes that same deadline mechanism with an arbitrary
//! future to give `serena-core`'s wait primitives — which know nothing of
//! the scheduler's clock, by design (spec.md's "bottom of the dependency
//! graph" layering) — the timed variants spec.md §4.3/§5 ask for
//! ("every wait returns EOK, EINTR, or ETIMEDOUT"). Rather than teaching
//! `Mutex`/`Condvar`/`Semaphore`/the wait queues about ticks, the timeout
//! is applied here, one layer up, where the clock already lives.

use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::sync::{Condvar, Mutex, MutexGuard, Semaphore, SemaphorePermit};

use crate::clock::global_clock;

/// Sleeps until at least `ticks` platform ticks have elapsed.
pub fn sleep_ticks(ticks: u64) -> SleepFuture {
    SleepFuture {
        deadline: global_clock().ticks() + ticks,
        armed: false,
    }
}

/// A future that completes once the clock reaches a target tick.
pub struct SleepFuture {
    deadline: u64,
    armed: bool,
}

impl Future for SleepFuture {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let clock = global_clock();
        if clock.ticks() >= self.deadline {
            return Poll::Ready(());
        }
        if !self.armed {
            self.armed = true;
            let waker = Box::leak(Box::new(cx.waker().clone())) as *mut Waker as usize;
            clock.deadline(self.deadline, wake_leaked_waker, waker);
        }
        Poll::Pending
    }
}

fn wake_leaked_waker(ctx: usize) {
    // SAFETY: `ctx` was produced by `Box::leak` above and is only ever
    // passed to this callback once, by the deadline queue, which removes
    // an entry before firing it — so this reclaims exactly one allocation.
    let waker = unsafe { alloc::boxed::Box::from_raw(ctx as *mut Waker) };
    waker.wake();
}

/// Races `fut` against a `ticks`-tick deadline.
///
/// Resolves to `Some(output)` if `fut` completes first, `None` if the
/// deadline elapses first. `fut` is polled first on every poll, so a future
/// that becomes ready the same tick its deadline expires still wins.
pub fn timeout<F: Future>(fut: F, ticks: u64) -> TimeoutFuture<F> {
    TimeoutFuture {
        fut: Box::pin(fut),
        sleep: sleep_ticks(ticks),
    }
}

/// Future returned by [`timeout`].
pub struct TimeoutFuture<F: Future> {
    fut: Pin<Box<F>>,
    sleep: SleepFuture,
}

impl<F: Future> Future for TimeoutFuture<F> {
    type Output = Option<F::Output>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Poll::Ready(v) = self.fut.as_mut().poll(cx) {
            return Poll::Ready(Some(v));
        }
        if let Poll::Ready(()) = Pin::new(&mut self.sleep).poll(cx) {
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}

/// Waits on `cv`, giving up with [`SerenaError::TimedOut`] after `ticks`
/// platform ticks (spec.md §4.3 cnd: "Supports absolute and relative
/// timeouts").
///
/// On success the caller holds the re-locked mutex, same as
/// [`Condvar::wait`]. On timeout the mutex is left unlocked — callers that
/// need to keep holding it across the error should re-lock it themselves.
pub async fn condvar_wait_timeout<'a, T>(
    cv: &'a Condvar,
    guard: MutexGuard<'a, T>,
    ticks: u64,
) -> SerenaResult<MutexGuard<'a, T>> {
    match timeout(cv.wait(guard), ticks).await {
        Some(mutex) => Ok(mutex.lock().await),
        None => Err(SerenaError::TimedOut),
    }
}

/// Acquires `n` permits from `sem`, giving up with
/// [`SerenaError::TimedOut`] after `ticks` platform ticks (spec.md §4.3
/// sem: `timedwait`).
pub async fn semaphore_wait_timeout(
    sem: &Semaphore,
    n: u32,
    ticks: u64,
) -> SerenaResult<SemaphorePermit<'_>> {
    timeout(sem.acquire_many(n), ticks)
        .await
        .ok_or(SerenaError::TimedOut)
}

/// Locks `mtx`, giving up with [`SerenaError::TimedOut`] after `ticks`
/// platform ticks (spec.md §5: "every wait returns EOK, EINTR, or
/// ETIMEDOUT").
pub async fn mutex_lock_timeout<T>(mtx: &Mutex<T>, ticks: u64) -> SerenaResult<MutexGuard<'_, T>> {
    timeout(mtx.lock(), ticks).await.ok_or(SerenaError::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::task::Context;

    #[test]
    fn sleep_ready_immediately_when_deadline_already_passed() {
        let fut = SleepFuture {
            deadline: 0,
            armed: false,
        };
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(())));
    }

    struct Never;
    impl Future for Never {
        type Output = ();
        fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
            Poll::Pending
        }
    }

    #[test]
    fn timeout_resolves_none_when_deadline_already_passed() {
        let fut = TimeoutFuture {
            fut: Box::pin(Never),
            sleep: SleepFuture {
                deadline: 0,
                armed: false,
            },
        };
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(None)));
    }

    #[test]
    fn timeout_resolves_inner_output_when_it_completes_first() {
        let fut = TimeoutFuture {
            fut: Box::pin(core::future::ready(42u32)),
            sleep: SleepFuture {
                deadline: u64::MAX,
                armed: false,
            },
        };
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Some(42))));
    }

    #[test]
    fn mutex_lock_timeout_succeeds_when_uncontended() {
        let mtx = Mutex::new(5u32);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(mutex_lock_timeout(&mtx, 1000));
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(guard)) => assert_eq!(*guard, 5),
            _ => panic!("expected immediate lock"),
        }
    }

    #[test]
    fn semaphore_wait_timeout_succeeds_when_permits_available() {
        let sem = Semaphore::new(2);
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(semaphore_wait_timeout(&sem, 2, 1000));
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(permit)) => {
                assert_eq!(sem.available_permits(), 0);
                drop(permit);
            }
            _ => panic!("expected immediate acquire"),
        }
        assert_eq!(sem.available_permits(), 2);
    }

    #[test]
    fn condvar_wait_timeout_succeeds_when_notified_before_deadline() {
        let mtx = Mutex::new(0u32);
        let cv = Condvar::new();
        let guard = mtx.lock_sync();
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = core::pin::pin!(condvar_wait_timeout(&cv, guard, 1000));
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Pending));

        cv.notify_one();
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Ready(Ok(_))));
    }

    fn noop_waker() -> Waker {
        use core::task::{RawWaker, RawWakerVTable};
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(core::ptr::null(), &VTABLE)) }
    }
}
