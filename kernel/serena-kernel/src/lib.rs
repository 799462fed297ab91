//! Logging, configuration, process argument blocks, and the syscall
//! table — the top of the Serena kernel-core stack (spec.md §4.8: "the
//! file-handle abstraction, the kernel/user boundary").
//!
//! Every other crate in this workspace (`serena-core`, `serena-kobj`,
//! `serena-sched`, `serena-fs`, `serena-driver-api`, `serena-proc`) is a
//! self-contained subsystem; `serena-kernel` is where they're wired
//! together into the syscall-facing surface, the way the donor's
//! `kernel/hadron-kernel` crate sits on top of its own subsystem crates.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod config;
pub mod log;
pub mod process_args;
pub mod syscall;

pub use process_args::ProcessArguments;
pub use syscall::{Syscall, SyscallResult};
