//! Signal numbers and per-process routing (spec.md §4.7: "Signals may be
//! routed at VCPU, VCPU_GROUP, or PROC scope.").
//!
//! Signal numbers follow conventional POSIX numbering (not specified by
//! spec.md, which only names signals by their `SIG*`-equivalent
//! mnemonics); no donor constant for these survives in the retrieval
//! pack's `hadron-kernel` (its own `proc/signal.rs` references
//! `SIGCHLD`/`SIGKILL`/etc. from a `syscall` module whose constant
//! definitions are absent from the pack), so this module defines them
//! directly rather than importing an incomplete donor item.
//!
//! Delivery itself reuses [`serena_core::sync::SignalWaitQueue`]
//! unchanged: each route names *which* queue a signal's bit gets OR'd
//! into (one per vCPU, one per vCPU group, or the process-wide queue),
//! not a new posting mechanism.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use serena_core::id::VcpuId;
use serena_core::sync::{Mutex, SignalSet, SignalWaitQueue};

/// Interrupt/terminate on receipt (Ctrl-C equivalent).
pub const SIGINT: u32 = 2;
/// Unconditional terminate, not interceptable.
pub const SIGKILL: u32 = 9;
/// Broken-pipe write.
pub const SIGPIPE: u32 = 13;
/// Polite terminate request.
pub const SIGTERM: u32 = 15;
/// Child process state change (exit, per spec.md §4.7's `exit` contract).
pub const SIGCHLD: u32 = 17;
/// Invalid memory reference (the `SIGSEGV`-equivalent exception of
/// scenario S5).
pub const SIGSEGV: u32 = 11;

/// Where a given signal number is delivered (spec.md: "routed at VCPU,
/// VCPU_GROUP, or PROC scope").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRoute {
    /// Delivered to one named vCPU's signal wait queue.
    Vcpu(VcpuId),
    /// Delivered to every vCPU in a named group.
    VcpuGroup(u32),
    /// Delivered to the process-wide signal wait queue (the default).
    Proc,
}

/// A process's signal routing table plus the wait queues signals are
/// actually posted to.
pub struct SignalRouting {
    routes: Mutex<BTreeMap<u32, SignalRoute>>,
    proc_wide: Arc<SignalWaitQueue>,
    per_vcpu: Mutex<BTreeMap<VcpuId, Arc<SignalWaitQueue>>>,
    per_group: Mutex<BTreeMap<u32, Arc<SignalWaitQueue>>>,
}

impl Default for SignalRouting {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalRouting {
    /// Creates a routing table with every signal defaulting to `Proc`
    /// scope and an empty process-wide queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(BTreeMap::new()),
            proc_wide: Arc::new(SignalWaitQueue::new()),
            per_vcpu: Mutex::new(BTreeMap::new()),
            per_group: Mutex::new(BTreeMap::new()),
        }
    }

    /// The process-wide signal queue (also the target for any signum
    /// with no explicit route).
    #[must_use]
    pub fn proc_queue(&self) -> &Arc<SignalWaitQueue> {
        &self.proc_wide
    }

    /// Sets the route for `signum`.
    pub async fn set_route(&self, signum: u32, route: SignalRoute) {
        self.routes.lock().await.insert(signum, route);
    }

    /// Registers the signal queue for a specific vCPU, creating it if
    /// absent, and returns it.
    pub async fn vcpu_queue(&self, vcpu: VcpuId) -> Arc<SignalWaitQueue> {
        let mut per_vcpu = self.per_vcpu.lock().await;
        per_vcpu
            .entry(vcpu)
            .or_insert_with(|| Arc::new(SignalWaitQueue::new()))
            .clone()
    }

    /// Registers the signal queue for a vCPU group, creating it if
    /// absent, and returns it.
    pub async fn group_queue(&self, group: u32) -> Arc<SignalWaitQueue> {
        let mut per_group = self.per_group.lock().await;
        per_group
            .entry(group)
            .or_insert_with(|| Arc::new(SignalWaitQueue::new()))
            .clone()
    }

    /// Posts `signum` to whichever queue its route names, falling back
    /// to the process-wide queue for an unrouted signal.
    pub async fn post(&self, signum: u32) {
        let route = self
            .routes
            .lock()
            .await
            .get(&signum)
            .copied()
            .unwrap_or(SignalRoute::Proc);
        match route {
            SignalRoute::Proc => self.proc_wide.post(signum),
            SignalRoute::Vcpu(vcpu) => self.vcpu_queue(vcpu).await.post(signum),
            SignalRoute::VcpuGroup(group) => self.group_queue(group).await.post(signum),
        }
    }

    /// Clears every route, reverting every signal to `Proc` scope
    /// (spec.md §4.7: `exec` "discards old exception handlers" — signal
    /// routes, like exception handlers, do not survive an image change).
    pub async fn reset(&self) {
        self.routes.lock().await.clear();
        self.per_vcpu.lock().await.clear();
        self.per_group.lock().await.clear();
    }
}
