//! Signal-send credential policy (spec.md §4.7: "Signals carry
//! credentials `(pid, ppid, uid)`. A send is permitted iff sender uid is
//! 0, equal to receiver uid, or the signal is `SIGCHLD` from the
//! receiver's parent.").
//!
//! Grounded on the donor's `SignalState` atomic-bitmask shape
//! (`proc/signal.rs`) for signal representation, and on spec.md §9's
//! `gSecurityManager` singleton note — collapsed here into a pure
//! function over explicit [`Credentials`] rather than a global object,
//! per SPEC_FULL.md's "pack singletons into an explicit context"
//! redesign guidance.

use serena_core::id::Pid;

use crate::signal::SIGCHLD;

/// The credentials a signal send carries (spec.md: "`(pid, ppid, uid)`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    /// Sending process's id.
    pub pid: Pid,
    /// Sending process's effective user id.
    pub uid: u32,
}

/// Returns `true` if `sender` may deliver `signum` to a process with id
/// `receiver_pid`, parent `receiver_ppid`, and owner `receiver_uid`.
#[must_use]
pub fn can_send_signal(
    sender: Credentials,
    signum: u32,
    receiver_pid: Pid,
    receiver_ppid: Option<Pid>,
    receiver_uid: u32,
) -> bool {
    let _ = receiver_pid;
    sender.uid == 0
        || sender.uid == receiver_uid
        || (signum == SIGCHLD && receiver_ppid == Some(sender.pid))
}
