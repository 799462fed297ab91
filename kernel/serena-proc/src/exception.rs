//! CPU exception dispatch (spec.md §4.7 "Exceptions").
//!
//! Platform-independent: the actual register save/restore and user-stack
//! frame construction is per-architecture trap glue that belongs outside
//! this crate (mirroring `serena-sched::executor::Executor::run`'s own
//! "platform glue, out of scope here" idle hook). This module owns the
//! *policy*: which handler a faulting vCPU resolves to, double-fault
//! detection, and consuming/discarding handler state across `exec`
//! (scenario: a vCPU takes a fault, the handler calls `exec`, and the new
//! image starts with no inherited exception state).

use alloc::collections::{BTreeMap, BTreeSet};

use serena_core::id::VcpuId;
use serena_core::sync::Mutex;

/// A platform-independent CPU exception code (spec.md: "`EXCPT_DIV_ZERO`,
/// `EXCPT_ILLEGAL`, `EXCPT_TRAP`, `EXCPT_FPE`, `EXCPT_BUS`, `EXCPT_SEGV`").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExceptionCode {
    /// Integer division by zero.
    DivZero,
    /// Illegal instruction.
    Illegal,
    /// Debug trap / breakpoint.
    Trap,
    /// Floating-point exception.
    Fpe,
    /// Unaligned or otherwise invalid bus access.
    Bus,
    /// Invalid memory reference.
    Segv,
}

/// The information handed to a user handler (spec.md: "`excpt_info`").
#[derive(Debug, Clone, Copy)]
pub struct ExceptionInfo {
    /// Which exception was taken.
    pub code: ExceptionCode,
    /// The faulting address, if the exception carries one (`Segv`/`Bus`).
    pub address: Option<usize>,
}

/// The saved machine context a handler frame carries (spec.md:
/// "`mcontext`"). Opaque here: the architecture layer defines its actual
/// register layout and owns the copy in/out of the user stack frame.
#[derive(Debug, Clone, Copy)]
pub struct MContext {
    /// Program counter at the moment of the fault.
    pub pc: usize,
    /// Stack pointer at the moment of the fault.
    pub sp: usize,
}

/// A handler's return value (spec.md: "`CONTINUE_EXECUTION` or
/// `ABORT_EXECUTION`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Restore the saved `mcontext` and resume where the fault occurred.
    ContinueExecution,
    /// Discard the saved `mcontext`; the vCPU does not resume the faulted
    /// code.
    AbortExecution,
}

/// What a faulting vCPU should do next, per spec.md's dispatch rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Build a frame and resume the vCPU in this handler entry point.
    Enter(usize),
    /// No handler is registered, or the vCPU was already inside one
    /// ("double fault"): the process must exit with `JREASON_EXCEPTION`.
    Fatal,
}

/// Per-process exception handler table and per-vCPU "currently in a
/// handler" tracking (for double-fault detection).
pub struct ExceptionTable {
    handlers: Mutex<BTreeMap<ExceptionCode, usize>>,
    in_handler: Mutex<BTreeSet<VcpuId>>,
}

impl Default for ExceptionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionTable {
    /// Creates an empty table (no handlers registered).
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            in_handler: Mutex::new(BTreeSet::new()),
        }
    }

    /// Registers `entry` as the handler for `code`.
    pub async fn set_handler(&self, code: ExceptionCode, entry: usize) {
        self.handlers.lock().await.insert(code, entry);
    }

    /// Clears every registered handler and in-handler marker (spec.md
    /// §4.7 `exec`: "discards old exception handlers ... the new image
    /// starts clean").
    pub async fn reset(&self) {
        self.handlers.lock().await.clear();
        self.in_handler.lock().await.clear();
    }

    /// Resolves what should happen when `vcpu` takes `code`.
    ///
    /// If no handler is registered, or `vcpu` was already marked as
    /// inside a handler (a double fault), returns [`Dispatch::Fatal`].
    /// Otherwise marks `vcpu` as in-handler and returns
    /// [`Dispatch::Enter`].
    pub async fn dispatch(&self, vcpu: VcpuId, code: ExceptionCode) -> Dispatch {
        let mut in_handler = self.in_handler.lock().await;
        if in_handler.contains(&vcpu) {
            return Dispatch::Fatal;
        }
        let Some(&entry) = self.handlers.lock().await.get(&code) else {
            return Dispatch::Fatal;
        };
        in_handler.insert(vcpu);
        Dispatch::Enter(entry)
    }

    /// Records that `vcpu` has returned from its handler with `outcome`
    /// (spec.md: "on handler return, the kernel restores or discards the
    /// saved mcontext based on the handler's return value").
    ///
    /// The actual mcontext restore/discard is architecture-specific and
    /// happens at the trap-return trampoline; this only clears the
    /// double-fault marker so a later, unrelated fault on the same vCPU
    /// is not mistaken for a double fault.
    pub async fn handler_return(&self, vcpu: VcpuId, outcome: HandlerOutcome) {
        let _ = outcome;
        self.in_handler.lock().await.remove(&vcpu);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: core::future::Future>(fut: F) -> F::Output {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> core::task::RawWaker {
            core::task::RawWaker::new(p, &VTABLE)
        }
        static VTABLE: core::task::RawWakerVTable =
            core::task::RawWakerVTable::new(clone, noop, noop, noop);
        let raw = core::task::RawWaker::new(core::ptr::null(), &VTABLE);
        let waker = unsafe { core::task::Waker::from_raw(raw) };
        let mut cx = core::task::Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        loop {
            if let core::task::Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    #[test]
    fn no_handler_is_fatal() {
        block_on(async {
            let table = ExceptionTable::new();
            let vcpu = VcpuId::new(0);
            assert_eq!(table.dispatch(vcpu, ExceptionCode::Segv).await, Dispatch::Fatal);
        });
    }

    #[test]
    fn registered_handler_is_entered_once() {
        block_on(async {
            let table = ExceptionTable::new();
            let vcpu = VcpuId::new(0);
            table.set_handler(ExceptionCode::Segv, 0x1000).await;
            assert_eq!(
                table.dispatch(vcpu, ExceptionCode::Segv).await,
                Dispatch::Enter(0x1000)
            );
        });
    }

    #[test]
    fn second_fault_before_return_is_a_double_fault() {
        block_on(async {
            let table = ExceptionTable::new();
            let vcpu = VcpuId::new(0);
            table.set_handler(ExceptionCode::Segv, 0x1000).await;
            assert!(matches!(
                table.dispatch(vcpu, ExceptionCode::Segv).await,
                Dispatch::Enter(_)
            ));
            assert_eq!(table.dispatch(vcpu, ExceptionCode::Segv).await, Dispatch::Fatal);
        });
    }

    #[test]
    fn handler_return_clears_double_fault_marker() {
        block_on(async {
            let table = ExceptionTable::new();
            let vcpu = VcpuId::new(0);
            table.set_handler(ExceptionCode::Segv, 0x1000).await;
            table.dispatch(vcpu, ExceptionCode::Segv).await;
            table
                .handler_return(vcpu, HandlerOutcome::ContinueExecution)
                .await;
            assert!(matches!(
                table.dispatch(vcpu, ExceptionCode::Segv).await,
                Dispatch::Enter(_)
            ));
        });
    }

    #[test]
    fn reset_clears_handlers_and_in_handler_state() {
        block_on(async {
            let table = ExceptionTable::new();
            let vcpu = VcpuId::new(0);
            table.set_handler(ExceptionCode::Segv, 0x1000).await;
            table.dispatch(vcpu, ExceptionCode::Segv).await;
            table.reset().await;
            // new image: no handler registered, so the next fault is fatal
            // rather than being dispatched into the now-discarded handler.
            assert_eq!(table.dispatch(vcpu, ExceptionCode::Segv).await, Dispatch::Fatal);
        });
    }
}
