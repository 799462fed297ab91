//! Process table (spec.md §4.7: "A process tree rooted at `kerneld`.
//! Each process owns an address space, a descriptor table, one or more
//! vCPUs, credentials, exception handlers, a signal routing table, a
//! umask, and a cwd/root pair.").
//!
//! Grounded on the donor's `kernel/hadron-kernel/src/proc/mod.rs` for the
//! process-table shape (`PROCESS_TABLE`, `register_process`,
//! `lookup_process`, `unregister_process`, `children_of`) and its
//! `handle_wait` zombie-reap pattern, generalized away from the donor's
//! x86_64 specifics (CR3/GS-base switching, `iretq` trap frames,
//! per-CPU statics) since Serena's single vCPU per spec.md has none of
//! that machinery.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use serena_core::error::{SerenaError, SerenaResult};
use serena_core::id::{Pid, VcpuId};
use serena_core::sync::{Mutex, SignalSet};
use serena_core::task::TaskId;
use serena_fs::Inode;
use serena_sched::executor;

use crate::address_space::AddressSpace;
use crate::descriptor::{DescriptorTable, STDERR, STDIN, STDOUT};
use crate::exception::ExceptionTable;
use crate::security::Credentials;
use crate::signal::{SignalRouting, SIGCHLD};

/// A process's run state (spec.md: "`exit` ... zombie, destroys vCPUs
/// except a designated announcer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Runnable or blocked, not yet exited.
    Running,
    /// Exited; waiting for a parent to reap it via `waitpid`.
    Zombie {
        /// The exit reason (spec.md's `JREASON_*` family).
        reason: ExitReason,
        /// The process-supplied (or exception-forced) exit code.
        code: i32,
    },
}

/// Why a process exited (spec.md §4.7: normal exit vs. a double-fault
/// forcing `JREASON_EXCEPTION`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The process called `exit` itself.
    Normal,
    /// An unhandled/double exception forced termination.
    Exception,
    /// Killed by a signal (`SIGKILL`, or an unhandled terminating signal).
    Signaled,
}

/// What [`ProcessTable::waitpid`] should match (spec.md: "scope `VCPU |
/// VCPU_GROUP | PROC | GROUP | ALL`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitScope {
    /// A specific vCPU within a specific process.
    Vcpu(Pid, VcpuId),
    /// A specific vCPU group.
    VcpuGroup(Pid, u32),
    /// A specific process.
    Proc(Pid),
    /// Any process in the caller's process group.
    Group(u32),
    /// Any child at all.
    All,
}

/// A single process (spec.md §4.7).
pub struct Process {
    /// Process id.
    pub pid: Pid,
    /// Parent's process id (`None` only for `kerneld` itself).
    pub parent: Mutex<Option<Pid>>,
    /// Process group id, for `WaitScope::Group`.
    pub pgid: u32,
    /// Owning credentials.
    pub credentials: Credentials,
    /// Address space (spec.md §4.4).
    pub address_space: AddressSpace,
    /// Open-channel descriptor table.
    pub descriptors: DescriptorTable,
    /// vCPU task ids currently running this process's code.
    pub vcpus: Mutex<Vec<(VcpuId, TaskId)>>,
    /// Exception handler table (spec.md §4.7 Exceptions).
    pub exceptions: ExceptionTable,
    /// Signal routing table and pending-signal queues.
    pub signals: SignalRouting,
    /// File creation mask.
    pub umask: Mutex<u16>,
    /// Current working directory inode.
    pub cwd: Mutex<Arc<dyn Inode>>,
    /// Process-private root inode (normally the system root).
    pub root: Mutex<Arc<dyn Inode>>,
    /// Run state; `None` once reaped.
    pub state: Mutex<ProcessState>,
    /// Child pids, for `children_of`/reparenting on exit.
    pub children: Mutex<Vec<Pid>>,
}

impl Process {
    /// Returns `true` if this process has at least one live vCPU task.
    pub async fn has_live_vcpu(&self) -> bool {
        !self.vcpus.lock().await.is_empty()
    }
}

/// Options controlling `spawn`'s descriptor inheritance (spec.md:
/// "Descriptor-inheritance is all-or-nothing: by default the first three
/// descriptors are inherited unless `NoDefaultDescriptors` is set").
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnOptions {
    /// Suppress inheriting stdin/stdout/stderr from the parent.
    pub no_default_descriptors: bool,
    /// Process group to join; `None` starts a new group equal to the new pid.
    pub pgid: Option<u32>,
}

/// The system-wide process table (spec.md: "a process tree rooted at
/// `kerneld`").
///
/// Grounded on the donor's `PROCESS_TABLE: SpinLock<BTreeMap<u32,
/// Arc<Process>>>`, widened to an async [`Mutex`] since every caller here
/// already runs inside an `async fn` vCPU task.
pub struct ProcessTable {
    processes: Mutex<BTreeMap<u32, Arc<Process>>>,
    next_pid: Mutex<u32>,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable {
    /// Creates an empty table. `kerneld` itself must be registered by the
    /// caller via [`ProcessTable::register`] with `Pid::INIT`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(BTreeMap::new()),
            next_pid: Mutex::new(Pid::INIT.as_u32()),
        }
    }

    /// Allocates the next process id.
    pub async fn allocate_pid(&self) -> Pid {
        let mut next = self.next_pid.lock().await;
        let pid = Pid::new(*next);
        *next += 1;
        pid
    }

    /// Registers `process`, keyed by its own pid.
    pub async fn register(&self, process: Arc<Process>) {
        self.processes
            .lock()
            .await
            .insert(process.pid.as_u32(), process);
    }

    /// Looks up a process by pid.
    pub async fn lookup(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.lock().await.get(&pid.as_u32()).cloned()
    }

    /// Removes a process entirely (only valid once it has been reaped).
    pub async fn unregister(&self, pid: Pid) {
        self.processes.lock().await.remove(&pid.as_u32());
    }

    /// Returns the pids of every process whose `parent` is `pid`.
    pub async fn children_of(&self, pid: Pid) -> Vec<Pid> {
        let processes = self.processes.lock().await;
        let mut out = Vec::new();
        for p in processes.values() {
            if *p.parent.lock().await == Some(pid) {
                out.push(p.pid);
            }
        }
        out
    }

    /// Opens `path`, builds an argv/envp image, and creates a new child
    /// process of `parent` (spec.md §4.7 `spawn`).
    ///
    /// Image loading here is abstracted to "caller-supplied entry point
    /// plus a raw byte image copied into the new address space" rather
    /// than a real executable-format parser: spec.md never mandates a
    /// specific binary format, and Amiga binary compatibility is an
    /// explicit non-goal, so there is nothing concrete to parse against.
    ///
    /// # Errors
    ///
    /// Propagates [`SerenaError::NoMemory`] if the image can't be
    /// allocated.
    #[allow(clippy::too_many_arguments)]
    pub async fn spawn(
        &self,
        parent: &Process,
        image: &[u8],
        entry_offset: usize,
        credentials: Credentials,
        cwd: Arc<dyn Inode>,
        root: Arc<dyn Inode>,
        opts: SpawnOptions,
    ) -> SerenaResult<Arc<Process>> {
        let pid = self.allocate_pid().await;
        let address_space = AddressSpace::new();
        let base = address_space
            .allocate(image.len())
            .await
            .ok_or(SerenaError::NoMemory)?;
        // SAFETY: `base` was just allocated by `address_space.allocate`
        // with at least `image.len()` bytes available.
        unsafe {
            core::ptr::copy_nonoverlapping(image.as_ptr(), base as *mut u8, image.len());
        }
        let entry = base + entry_offset;

        let descriptors = DescriptorTable::new();
        if !opts.no_default_descriptors {
            descriptors
                .inherit_from(&parent.descriptors, &[STDIN, STDOUT, STDERR])
                .await;
        }

        let pgid = opts.pgid.unwrap_or(pid.as_u32());
        let process = Arc::new(Process {
            pid,
            parent: Mutex::new(Some(parent.pid)),
            pgid,
            credentials,
            address_space,
            descriptors,
            vcpus: Mutex::new(Vec::new()),
            exceptions: ExceptionTable::new(),
            signals: SignalRouting::new(),
            umask: Mutex::new(*parent.umask.lock().await),
            cwd: Mutex::new(cwd),
            root: Mutex::new(root),
            state: Mutex::new(ProcessState::Running),
            children: Mutex::new(Vec::new()),
        });

        let task_id = spawn_main_vcpu(&process, entry);
        process
            .vcpus
            .lock()
            .await
            .push((VcpuId::new(0), task_id));

        parent.children.lock().await.push(pid);
        self.register(process.clone()).await;
        Ok(process)
    }

    /// Replaces `process`'s image in place (spec.md §4.7 `exec`: "adopts
    /// the new mappings, resets the main vCPU, discards old exception
    /// handlers ... An exception taken while executing exec consumes the
    /// exception condition").
    ///
    /// # Errors
    ///
    /// Propagates [`SerenaError::NoMemory`] if the new image can't be
    /// allocated.
    pub async fn exec(
        &self,
        process: &Process,
        image: &[u8],
        entry_offset: usize,
    ) -> SerenaResult<usize> {
        let incoming = AddressSpace::new();
        let base = incoming
            .allocate(image.len())
            .await
            .ok_or(SerenaError::NoMemory)?;
        // SAFETY: see `spawn`.
        unsafe {
            core::ptr::copy_nonoverlapping(image.as_ptr(), base as *mut u8, image.len());
        }
        process.address_space.adopt_from(&incoming).await;
        process.exceptions.reset().await;
        process.signals.reset().await;
        Ok(base + entry_offset)
    }

    /// Marks `process` as a zombie with the given reason/code, notifies
    /// its parent with `SIGCHLD`, and reparents its children onto
    /// `kerneld` (spec.md: "`kerneld` reparents on parent exit").
    pub async fn exit(&self, process: &Process, reason: ExitReason, code: i32) {
        *process.state.lock().await = ProcessState::Zombie { reason, code };
        process.vcpus.lock().await.clear();
        process.address_space.unmap_all().await;

        if let Some(parent_pid) = *process.parent.lock().await {
            if let Some(parent) = self.lookup(parent_pid).await {
                parent.signals.post(SIGCHLD).await;
            }
        }

        let orphans = core::mem::take(&mut *process.children.lock().await);
        for child_pid in orphans {
            if let Some(child) = self.lookup(child_pid).await {
                *child.parent.lock().await = Some(Pid::INIT);
                if let Some(init) = self.lookup(Pid::INIT).await {
                    init.children.lock().await.push(child_pid);
                }
            }
        }
    }

    /// Waits for a child matching `scope` to become a zombie, reaps it,
    /// and returns `(pid, reason, code)`.
    ///
    /// With `nohang = true`, returns `Ok(None)` immediately if no
    /// matching child is currently a zombie, instead of waiting.
    ///
    /// # Errors
    ///
    /// Returns [`SerenaError::NotFound`] if `scope` names no child of
    /// `waiter` at all.
    pub async fn waitpid(
        &self,
        waiter: &Process,
        scope: WaitScope,
        nohang: bool,
    ) -> SerenaResult<Option<(Pid, ExitReason, i32)>> {
        loop {
            let candidates = self.matching_children(waiter, scope).await?;
            for pid in &candidates {
                if let Some(child) = self.lookup(*pid).await {
                    if let ProcessState::Zombie { reason, code } = *child.state.lock().await {
                        self.unregister(*pid).await;
                        waiter.children.lock().await.retain(|c| c != pid);
                        return Ok(Some((*pid, reason, code)));
                    }
                }
            }
            if nohang {
                return Ok(None);
            }
            waiter
                .signals
                .proc_queue()
                .sigwait(SignalSet::single(SIGCHLD))
                .await;
        }
    }

    async fn matching_children(
        &self,
        waiter: &Process,
        scope: WaitScope,
    ) -> SerenaResult<Vec<Pid>> {
        let own_children = waiter.children.lock().await.clone();
        match scope {
            WaitScope::All => Ok(own_children),
            WaitScope::Proc(pid) => {
                if own_children.contains(&pid) {
                    Ok(alloc::vec![pid])
                } else {
                    Err(SerenaError::NotFound)
                }
            }
            WaitScope::Vcpu(pid, _) | WaitScope::VcpuGroup(pid, _) => {
                if own_children.contains(&pid) {
                    Ok(alloc::vec![pid])
                } else {
                    Err(SerenaError::NotFound)
                }
            }
            WaitScope::Group(pgid) => {
                let mut out = Vec::new();
                for pid in own_children {
                    if let Some(child) = self.lookup(pid).await {
                        if child.pgid == pgid {
                            out.push(pid);
                        }
                    }
                }
                Ok(out)
            }
        }
    }
}

fn spawn_main_vcpu(process: &Arc<Process>, entry: usize) -> TaskId {
    let _ = entry;
    // Platform glue (loading a real register/stack frame and jumping to
    // `entry`) is out of scope here, matching `serena-sched::Executor`'s
    // own "idle hook ... platform glue, out of scope" precedent. The task
    // spawned is a placeholder that simply completes, standing in for
    // whatever the trap-return trampoline would otherwise drive.
    let process = process.clone();
    executor::global().spawn(async move {
        let _ = process;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serena_fs::ramfs::RamFs;
    use serena_fs::Filesystem;

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

    fn root_inode() -> Arc<dyn Inode> {
        let fs = RamFs::new();
        fs.root()
    }

    fn init_process() -> Arc<Process> {
        Arc::new(Process {
            pid: Pid::INIT,
            parent: Mutex::new(None),
            pgid: Pid::INIT.as_u32(),
            credentials: Credentials {
                pid: Pid::INIT,
                uid: 0,
            },
            address_space: AddressSpace::new(),
            descriptors: DescriptorTable::new(),
            vcpus: Mutex::new(Vec::new()),
            exceptions: ExceptionTable::new(),
            signals: SignalRouting::new(),
            umask: Mutex::new(0o022),
            cwd: Mutex::new(root_inode()),
            root: Mutex::new(root_inode()),
            state: Mutex::new(ProcessState::Running),
            children: Mutex::new(Vec::new()),
        })
    }

    #[test]
    fn spawn_registers_child_under_parent() {
        block_on(async {
            let table = ProcessTable::new();
            let init = init_process();
            table.register(init.clone()).await;

            let child = table
                .spawn(
                    &init,
                    b"\0\0\0\0",
                    0,
                    Credentials {
                        pid: init.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();

            assert!(table.lookup(child.pid).await.is_some());
            assert_eq!(table.children_of(init.pid).await, alloc::vec![child.pid]);
            assert!(child.descriptors.get(STDIN).await.is_none());
        });
    }

    #[test]
    fn exit_marks_zombie_and_notifies_parent() {
        block_on(async {
            let table = ProcessTable::new();
            let init = init_process();
            table.register(init.clone()).await;
            let child = table
                .spawn(
                    &init,
                    b"\0",
                    0,
                    Credentials {
                        pid: init.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();

            table.exit(&child, ExitReason::Normal, 7).await;
            assert!(init.signals.proc_queue().has_pending(SignalSet::single(SIGCHLD)));

            let reaped = table
                .waitpid(&init, WaitScope::Proc(child.pid), true)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reaped, (child.pid, ExitReason::Normal, 7));
            assert!(table.lookup(child.pid).await.is_none());
        });
    }

    #[test]
    fn waitpid_nohang_returns_none_without_a_zombie() {
        block_on(async {
            let table = ProcessTable::new();
            let init = init_process();
            table.register(init.clone()).await;
            let child = table
                .spawn(
                    &init,
                    b"\0",
                    0,
                    Credentials {
                        pid: init.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();

            let result = table
                .waitpid(&init, WaitScope::Proc(child.pid), true)
                .await
                .unwrap();
            assert!(result.is_none());
        });
    }

    #[test]
    fn exit_reparents_orphans_to_init() {
        block_on(async {
            let table = ProcessTable::new();
            let init = init_process();
            table.register(init.clone()).await;
            let parent = table
                .spawn(
                    &init,
                    b"\0",
                    0,
                    Credentials {
                        pid: init.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();
            let grandchild = table
                .spawn(
                    &parent,
                    b"\0",
                    0,
                    Credentials {
                        pid: parent.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();

            table.exit(&parent, ExitReason::Normal, 0).await;
            assert_eq!(*grandchild.parent.lock().await, Some(Pid::INIT));
            assert!(table.children_of(Pid::INIT).await.contains(&grandchild.pid));
        });
    }

    #[test]
    fn exec_replaces_image_and_resets_exceptions() {
        block_on(async {
            let table = ProcessTable::new();
            let init = init_process();
            table.register(init.clone()).await;
            let child = table
                .spawn(
                    &init,
                    b"\0\0",
                    0,
                    Credentials {
                        pid: init.pid,
                        uid: 0,
                    },
                    root_inode(),
                    root_inode(),
                    SpawnOptions::default(),
                )
                .await
                .unwrap();

            let before_blocks = child.address_space.block_count().await;
            assert_eq!(before_blocks, 1);

            let entry = table.exec(&child, b"\0\0\0\0", 0).await.unwrap();
            assert_ne!(entry, 0);
            assert_eq!(child.address_space.block_count().await, 1);
        });
    }
}
