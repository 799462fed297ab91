//! Driver lifecycle state machine (spec.md §4.6):
//!
//! ```text
//! created ──start──▶ starting ──ok──▶ running ──stop──▶ stopping ──▶ destroyed
//!                      │                                  ▲
//!                      └──fail──▶ destroyed              running-child-count→0
//! ```
//!
//! This is a different shape from the donor's own `DriverState`
//! (`Registered -> Probing -> Active <-> Suspended -> Shutdown/Failed`),
//! per SPEC_FULL.md: implemented here from spec.md's transitions directly,
//! keeping the donor's `ManagedDriver` suspend/resume symmetry only in
//! spirit (`stop`/`start` are the save/restore pair here, there is no
//! separate suspend state).

use core::sync::atomic::{AtomicU8, Ordering};

/// A driver's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    /// Constructed but not yet started.
    Created = 0,
    /// `start` has been called; probing and child-attach are in progress.
    Starting = 1,
    /// Started successfully; serving I/O and may host running children.
    Running = 2,
    /// `stop` has been called; waiting for `running_child_count() == 0`.
    Stopping = 3,
    /// Terminal: resources released, the driver will not run again.
    Destroyed = 4,
}

impl DriverState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Destroyed,
        }
    }
}

/// An atomic cell holding a [`DriverState`], with the legal-transition
/// check centralized so every driver and the catalog agree on it.
#[derive(Debug)]
pub struct LifecycleCell(AtomicU8);

impl Default for LifecycleCell {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleCell {
    /// Creates a cell in the `created` state.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(DriverState::Created as u8))
    }

    /// Returns the current state.
    #[must_use]
    pub fn get(&self) -> DriverState {
        DriverState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Attempts `created -> starting`. Returns `false` if not currently
    /// `created`.
    pub fn begin_start(&self) -> bool {
        self.0
            .compare_exchange(
                DriverState::Created as u8,
                DriverState::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `starting -> running`, the `ok` edge. Returns `false` if not
    /// currently `starting`.
    pub fn start_succeeded(&self) -> bool {
        self.0
            .compare_exchange(
                DriverState::Starting as u8,
                DriverState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `starting -> destroyed`, the `fail` edge.
    pub fn start_failed(&self) -> bool {
        self.0
            .compare_exchange(
                DriverState::Starting as u8,
                DriverState::Destroyed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Attempts `running -> stopping`. Returns `false` if not currently
    /// `running`.
    pub fn begin_stop(&self) -> bool {
        self.0
            .compare_exchange(
                DriverState::Running as u8,
                DriverState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `stopping -> destroyed`, taken once `running_child_count() == 0`.
    /// Returns `false` if not currently `stopping`.
    pub fn finish_stop(&self) -> bool {
        self.0
            .compare_exchange(
                DriverState::Stopping as u8,
                DriverState::Destroyed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
