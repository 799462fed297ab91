//! vCPU task metadata and scheduling classes.

use crate::id::VcpuId;

/// Unique identifier for a spawned scheduler task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

/// Scheduling tier for the single-CPU executor's ready queues.
///
/// Queues are served Critical-first, then Normal, with Background given a
/// turn periodically so it cannot starve behind a steady stream of Normal
/// work (see [`crate::task::Priority::COUNT`] users in `serena-sched`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Interrupt bottom-halves and time-critical driver work (disk DMA
    /// completion, audio/video frame deadlines).
    Critical = 0,
    /// Ordinary process and driver vCPU work.
    Normal = 1,
    /// Housekeeping: cache writeback, deferred cleanup.
    Background = 2,
}

impl Priority {
    /// Number of priority tiers.
    pub const COUNT: usize = 3;

    /// Converts a raw `u8` to a priority, defaulting to `Normal` for any
    /// out-of-range value.
    #[must_use]
    pub const fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::Critical,
            2 => Self::Background,
            _ => Self::Normal,
        }
    }
}

/// Lifecycle state of a vCPU, as tracked by the scheduler.
///
/// A vCPU moves `Ready -> Running -> {Ready, Waiting, Suspended, Terminated}`.
/// Only `Waiting` vCPUs sit on a wait queue; `Suspended` vCPUs are held off
/// the ready queue entirely until explicitly resumed (process stop/continue,
/// driver suspend).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcpuState {
    /// On a ready queue, eligible to be scheduled.
    Ready,
    /// Currently executing on the (sole) physical CPU.
    Running,
    /// Blocked on a sync primitive or wait queue.
    Waiting,
    /// Held off the ready queue by an explicit suspend request.
    Suspended,
    /// Exited; resources pending reclamation.
    Terminated,
}

/// Metadata attached to a spawned scheduler task.
#[derive(Debug, Clone, Copy)]
pub struct TaskMeta {
    /// Human-readable name for debugging and `kinfo!` logging.
    pub name: &'static str,
    /// Scheduling tier.
    pub priority: Priority,
    /// Owning vCPU, if this task represents vCPU-bound work.
    pub vcpu: Option<VcpuId>,
}

impl Default for TaskMeta {
    fn default() -> Self {
        Self {
            name: "<anon>",
            priority: Priority::Normal,
            vcpu: None,
        }
    }
}

impl TaskMeta {
    /// Creates metadata with a name and default priority.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            priority: Priority::Normal,
            vcpu: None,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Binds the task to a vCPU id.
    #[must_use]
    pub const fn with_vcpu(mut self, vcpu: VcpuId) -> Self {
        self.vcpu = Some(vcpu);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_from_u8_critical() {
        assert_eq!(Priority::from_u8(0), Priority::Critical);
    }

    #[test]
    fn priority_from_u8_normal() {
        assert_eq!(Priority::from_u8(1), Priority::Normal);
    }

    #[test]
    fn priority_from_u8_background() {
        assert_eq!(Priority::from_u8(2), Priority::Background);
    }

    #[test]
    fn priority_from_u8_unknown_defaults_normal() {
        assert_eq!(Priority::from_u8(255), Priority::Normal);
        assert_eq!(Priority::from_u8(42), Priority::Normal);
    }

    #[test]
    fn priority_count() {
        assert_eq!(Priority::COUNT, 3);
    }

    #[test]
    fn task_meta_default() {
        let meta = TaskMeta::default();
        assert_eq!(meta.name, "<anon>");
        assert_eq!(meta.priority, Priority::Normal);
        assert!(meta.vcpu.is_none());
    }

    #[test]
    fn task_meta_builder() {
        let meta = TaskMeta::new("disk0-vcpu")
            .with_priority(Priority::Critical)
            .with_vcpu(VcpuId::new(2));
        assert_eq!(meta.name, "disk0-vcpu");
        assert_eq!(meta.priority, Priority::Critical);
        assert_eq!(meta.vcpu, Some(VcpuId::new(2)));
    }

    #[test]
    fn task_id_equality() {
        assert_eq!(TaskId(1), TaskId(1));
        assert_ne!(TaskId(1), TaskId(2));
    }

    #[test]
    fn task_id_ordering() {
        assert!(TaskId(1) < TaskId(2));
        assert!(TaskId(100) > TaskId(0));
    }

    #[test]
    fn vcpu_state_equality() {
        assert_eq!(VcpuState::Ready, VcpuState::Ready);
        assert_ne!(VcpuState::Ready, VcpuState::Running);
    }
}
