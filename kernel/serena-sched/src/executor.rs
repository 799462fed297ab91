//! Single-CPU cooperative vCPU executor (spec.md §3 "vCPU", §4.2).
//!
//! A vCPU is modeled as a `Future<Output = ()>` (see `SPEC_FULL.md`'s Rust
//! mapping): `mtx_lock`, `cnd_wait`, `wq_wait`, and friends in
//! `serena-core::sync` are `async fn`s the vCPU's task awaits, and
//! "blocking" is the task yielding to [`Executor::run`] via a
//! [`serena_core::sync::WaitQueue`]-registered [`core::task::Waker`].
//! Ported from the donor kernel's per-CPU `sched::executor::Executor`
//! (`kernel/hadron-kernel/src/sched/executor.rs`) with the work-stealing
//! and per-CPU array machinery removed — Serena targets one 68k CPU, so
//! there is exactly one executor and nothing to steal from.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use core::future::Future;
use core::pin::Pin;
use core::sync::atomic::{AtomicU64, Ordering};
use core::task::{Context, Poll};

use serena_core::sync::IrqSpinLock;
use serena_core::task::{Priority, TaskId, TaskMeta, VcpuState};

use crate::ready_queue::ReadyQueues;
use crate::waker::task_waker;

type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct TaskEntry {
    future: TaskFuture,
    meta: TaskMeta,
}

/// The single-CPU executor.
pub struct Executor {
    tasks: IrqSpinLock<BTreeMap<TaskId, TaskEntry>>,
    ready: IrqSpinLock<ReadyQueues>,
    /// vCPUs held off the ready queue by an explicit suspend (spec.md §3:
    /// "destroyed after relinquish+scheduler drain" implies suspend must
    /// survive stray wakes, so membership here overrides any wake).
    suspended: IrqSpinLock<BTreeSet<TaskId>>,
    next_id: AtomicU64,
}

static EXECUTOR: Executor = Executor::new();

/// Returns the global executor.
#[must_use]
pub fn global() -> &'static Executor {
    &EXECUTOR
}

impl Executor {
    /// Creates an executor with no tasks.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tasks: IrqSpinLock::new(BTreeMap::new()),
            ready: IrqSpinLock::new(ReadyQueues::new()),
            suspended: IrqSpinLock::new(BTreeSet::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawns a task at [`Priority::Normal`].
    pub fn spawn(&self, future: impl Future<Output = ()> + Send + 'static) -> TaskId {
        self.spawn_with_meta(future, TaskMeta::default())
    }

    /// Spawns a task with explicit metadata (name, priority, owning vCPU).
    pub fn spawn_with_meta(
        &self,
        future: impl Future<Output = ()> + Send + 'static,
        meta: TaskMeta,
    ) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let priority = meta.priority;
        self.tasks.lock().insert(
            id,
            TaskEntry {
                future: Box::pin(future),
                meta,
            },
        );
        self.ready.lock().push(priority, id);
        id
    }

    /// Re-queues `id` on its ready tier, unless it is currently suspended.
    ///
    /// Called by [`crate::waker::task_waker`] wakers; a wake delivered to a
    /// suspended vCPU is held (not lost) until [`Executor::resume`].
    pub(crate) fn requeue(&self, priority: Priority, id: TaskId) {
        if self.suspended.lock().contains(&id) {
            return;
        }
        self.ready.lock().push(priority, id);
    }

    /// Holds `id` off the ready queue until [`Executor::resume`] is called,
    /// even if a wake for it arrives in the meantime.
    pub fn suspend(&self, id: TaskId) {
        self.suspended.lock().insert(id);
    }

    /// Releases a previous [`Executor::suspend`], re-queuing the task if it
    /// had a wake pending.
    ///
    /// Returns `true` iff `id` was suspended.
    pub fn resume(&self, id: TaskId) -> bool {
        let was_suspended = self.suspended.lock().remove(&id);
        if was_suspended {
            let priority = self
                .tasks
                .lock()
                .get(&id)
                .map_or(Priority::Normal, |e| e.meta.priority);
            self.ready.lock().push(priority, id);
        }
        was_suspended
    }

    /// Returns the scheduling state of a known task, or `None` if it has
    /// terminated (and been reaped) or was never spawned.
    #[must_use]
    pub fn state(&self, id: TaskId) -> Option<VcpuState> {
        if self.suspended.lock().contains(&id) {
            return Some(VcpuState::Suspended);
        }
        if !self.tasks.lock().contains_key(&id) {
            return None;
        }
        // A task present in `tasks` but not `suspended` is either sitting
        // in a ready queue or out being polled; both collapse to `Ready`
        // for external observers (spec.md's scheduler is the only code
        // that distinguishes "running" from "ready").
        Some(VcpuState::Ready)
    }

    /// Runs one batch of ready tasks to completion (drains the ready
    /// queues until empty, polling each task at most once per pass).
    ///
    /// Exposed for host tests and for [`Executor::run`]'s main loop; a real
    /// boot calls `run` directly.
    pub fn run_once(&self) {
        loop {
            let (priority, id) = match self.ready.lock().pop() {
                Some(pair) => pair,
                None => break,
            };

            let waker = task_waker(id, priority);
            let mut cx = Context::from_waker(&waker);

            let entry = self.tasks.lock().remove(&id);
            if let Some(mut entry) = entry {
                match entry.future.as_mut().poll(&mut cx) {
                    Poll::Ready(()) => {}
                    Poll::Pending => {
                        self.tasks.lock().insert(id, entry);
                    }
                }
            }
        }
    }

    /// Runs forever, polling ready tasks and otherwise returning control to
    /// the caller-supplied idle hook (the platform's `enable-interrupts-and-
    /// halt` trampoline) when nothing is ready.
    ///
    /// `idle` is called with interrupts re-enabled by the caller's
    /// convention; this function never inspects interrupt state itself
    /// (that discipline belongs to the platform glue, out of scope here).
    pub fn run(&self, mut idle: impl FnMut()) -> ! {
        loop {
            self.run_once();
            idle();
        }
    }

    /// Returns the number of tasks currently tracked (ready, waiting, or
    /// suspended) — not counting a task that has returned `Poll::Ready`.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicBool;

    #[test]
    fn spawn_and_run_completes_task() {
        let exec = Executor::new();
        static DONE: AtomicBool = AtomicBool::new(false);
        DONE.store(false, Ordering::SeqCst);
        exec.spawn(async {
            DONE.store(true, Ordering::SeqCst);
        });
        exec.run_once();
        assert!(DONE.load(Ordering::SeqCst));
        assert_eq!(exec.task_count(), 0);
    }

    #[test]
    fn pending_task_is_requeued_via_waker() {
        let exec = Executor::new();
        static POLLS: AtomicU64 = AtomicU64::new(0);
        POLLS.store(0, Ordering::SeqCst);

        struct TwicePending;
        impl Future for TwicePending {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                let n = POLLS.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    cx.waker().wake_by_ref();
                    Poll::Pending
                } else {
                    Poll::Ready(())
                }
            }
        }

        exec.spawn(TwicePending);
        exec.run_once();
        // After the first batch the self-woken task is back in the ready
        // queue; a second batch drains it to completion.
        exec.run_once();
        assert_eq!(POLLS.load(Ordering::SeqCst), 2);
        assert_eq!(exec.task_count(), 0);
    }

    #[test]
    fn suspended_task_is_not_polled_until_resumed() {
        let exec = Executor::new();
        static POLLS: AtomicU64 = AtomicU64::new(0);
        POLLS.store(0, Ordering::SeqCst);

        struct PendingForever;
        impl Future for PendingForever {
            type Output = ();
            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
                POLLS.fetch_add(1, Ordering::SeqCst);
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }

        let id = exec.spawn(PendingForever);
        exec.suspend(id);
        exec.run_once();
        // Task was never in the ready queue, so it was never polled.
        assert_eq!(POLLS.load(Ordering::SeqCst), 0);
        assert_eq!(exec.state(id), Some(VcpuState::Suspended));

        assert!(exec.resume(id));
        exec.run_once();
        assert!(POLLS.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn resume_of_non_suspended_task_returns_false() {
        let exec = Executor::new();
        assert!(!exec.resume(TaskId(999)));
    }

    #[test]
    fn critical_priority_drains_before_normal() {
        let exec = Executor::new();
        static ORDER: IrqSpinLock<alloc::vec::Vec<u32>> = IrqSpinLock::new(alloc::vec::Vec::new());

        exec.spawn_with_meta(
            async {
                ORDER.lock().push(1);
            },
            TaskMeta::new("normal").with_priority(Priority::Normal),
        );
        exec.spawn_with_meta(
            async {
                ORDER.lock().push(2);
            },
            TaskMeta::new("critical").with_priority(Priority::Critical),
        );
        exec.run_once();
        assert_eq!(*ORDER.lock(), alloc::vec![2, 1]);
    }
}
