//! Synchronization primitives.
//!
//! [`IrqSpinLock`] is the only primitive that may be held across an
//! interrupt; it never yields. Everything else (`Mutex`, `Semaphore`,
//! `RwMutex`, `Condvar`, the wait queues) is async-aware: contention parks
//! the current vCPU task via a [`WaitQueue`] or [`SignalWaitQueue`] instead
//! of spinning, so the single-CPU executor can run other ready work.

mod condvar;
mod irq_spinlock;
mod mutex;
mod rwlock;
mod semaphore;
mod seqlock;
mod signal_waitqueue;
#[cfg(test)]
pub(crate) mod test_waker;
mod waitqueue;

pub use condvar::Condvar;
pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard};
pub use mutex::{Mutex, MutexGuard, MutexLockFuture};
pub use rwlock::{RwMutex, RwMutexReadGuard, RwMutexWriteGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use seqlock::{SeqLock, SeqLockWriteGuard};
pub use signal_waitqueue::{SignalSet, SignalWaitQueue};
pub use waitqueue::{WaitPolicy, WaitQueue};
