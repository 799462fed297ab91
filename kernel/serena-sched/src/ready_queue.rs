//! Priority-tiered ready queue for the vCPU executor.
//!
//! Ported from the donor kernel's per-CPU `ReadyQueues` (`sched/executor.rs`)
//! with the cross-CPU work-stealing half removed: Serena targets a single
//! 68k CPU, so there is nothing to steal from (spec.md's non-goals exclude
//! SMP). The starvation-prevention rule between Normal and Background tiers
//! is kept unchanged — it follows directly from spec.md §4.2's "multi-level
//! (QoS x priority)" ready queue, independent of CPU count.

use alloc::collections::VecDeque;

use serena_core::task::{Priority, TaskId};

/// How many consecutive Normal-tier pops before forcing one Background pop,
/// so a steady stream of Normal work cannot starve housekeeping entirely.
const BACKGROUND_STARVATION_LIMIT: u64 = 100;

/// Three FIFO queues, one per [`Priority`] tier.
pub struct ReadyQueues {
    queues: [VecDeque<TaskId>; Priority::COUNT],
    normal_streak: u64,
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyQueues {
    /// Creates three empty queues.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
            normal_streak: 0,
        }
    }

    /// Enqueues `id` on the tail of its priority's queue.
    pub fn push(&mut self, priority: Priority, id: TaskId) {
        self.queues[priority as usize].push_back(id);
    }

    /// Pops the next task to run.
    ///
    /// Critical always drains first. Between Normal and Background: once
    /// Normal has run [`BACKGROUND_STARVATION_LIMIT`] times in a row while
    /// Background has pending work, one Background task is forced through.
    pub fn pop(&mut self) -> Option<(Priority, TaskId)> {
        if let Some(id) = self.queues[Priority::Critical as usize].pop_front() {
            self.normal_streak = 0;
            return Some((Priority::Critical, id));
        }

        let has_background = !self.queues[Priority::Background as usize].is_empty();
        let has_normal = !self.queues[Priority::Normal as usize].is_empty();

        if has_normal && has_background && self.normal_streak >= BACKGROUND_STARVATION_LIMIT {
            self.normal_streak = 0;
            if let Some(id) = self.queues[Priority::Background as usize].pop_front() {
                return Some((Priority::Background, id));
            }
        }

        if let Some(id) = self.queues[Priority::Normal as usize].pop_front() {
            self.normal_streak = if has_background { self.normal_streak + 1 } else { 0 };
            return Some((Priority::Normal, id));
        }

        self.normal_streak = 0;
        self.queues[Priority::Background as usize]
            .pop_front()
            .map(|id| (Priority::Background, id))
    }

    /// Returns `true` if every tier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(VecDeque::is_empty)
    }
}
