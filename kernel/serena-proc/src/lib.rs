//! Process table, address space, exec, exceptions, signals, and security
//! (spec.md §4.4, §4.7, §9).
//!
//! [`address_space::AddressSpace`] is a process's flat list of
//! page-aligned kernel allocations. [`descriptor::DescriptorTable`] is
//! the small-integer-keyed open-channel table every process owns.
//! [`process::ProcessTable`] is the system-wide `pid -> Process` map,
//! with `spawn`/`exec`/`exit`/`waitpid` implementing the process
//! lifecycle. [`exception::ExceptionTable`] dispatches platform-
//! independent CPU exceptions to user handlers, detecting double faults.
//! [`signal::SignalRouting`] posts signals to the VCPU/VCPU_GROUP/PROC
//! scoped queue their route names. [`security::can_send_signal`] is the
//! credential check a signal send must pass.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod address_space;
pub mod descriptor;
pub mod exception;
pub mod process;
pub mod security;
pub mod signal;

pub use address_space::AddressSpace;
pub use descriptor::DescriptorTable;
pub use exception::{Dispatch, ExceptionCode, ExceptionInfo, ExceptionTable, HandlerOutcome, MContext};
pub use process::{ExitReason, Process, ProcessState, ProcessTable, SpawnOptions, WaitScope};
pub use security::{can_send_signal, Credentials};
pub use signal::{SignalRoute, SignalRouting, SIGCHLD, SIGINT, SIGKILL, SIGPIPE, SIGSEGV, SIGTERM};
