//! Monotonic tick clock and deadline queue (spec.md §3 "Clock", §4.2).
//!
//! The platform timer IRQ calls [`Clock::tick`] once per period (~60 Hz on
//! real Amiga hardware; the rate itself is a `serena-kernel::config`
//! constant, opaque to this crate). `tick` advances the counter, fires any
//! deadline whose target has arrived, and returns whether the scheduler
//! should be re-entered.
//!
//! `gettime_hires` additionally folds in a sub-tick cycle count supplied by
//! the caller (CIA/Paula cycle counter reads are platform code, out of
//! scope here) without ever observing a tick boundary mid-read: both fields
//! are published together through a [`SeqLock`], the same "read, copy,
//! re-read, retry on mismatch" loop spec.md §4.2 asks for.

use serena_core::sync::{IrqSpinLock, SeqLock};
use planck_noalloc::vec::ArrayVec;

/// Maximum number of simultaneously armed deadlines.
const MAX_DEADLINES: usize = 64;

/// Platform timer IRQ rate, matching the real Amiga CIA tick period.
pub const TICKS_PER_SEC: u32 = 60;

/// Sub-tick cycle-counter resolution assumed for `gettime_hires`
/// interpolation (opaque to this crate beyond scaling the nanosecond term).
pub const CYCLES_PER_TICK: u32 = 1000;

static CLOCK: Clock = Clock::new(TICKS_PER_SEC, CYCLES_PER_TICK);

/// Returns the kernel's single global clock.
#[must_use]
pub fn global_clock() -> &'static Clock {
    &CLOCK
}

/// A `(seconds, nanoseconds)` timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timespec {
    /// Whole seconds.
    pub sec: u64,
    /// Nanoseconds within the current second, `< 1_000_000_000`.
    pub nsec: u32,
}

/// The published `(tick, sub-tick cycles)` pair [`Clock::gettime_hires`]
/// reads through a seqlock loop.
#[derive(Debug, Clone, Copy, Default)]
struct ClockSample {
    tick: u64,
    cycles: u32,
}

/// An armed one-shot callback with an absolute tick target.
///
/// `callback` is a plain function pointer taking an untyped context word,
/// never a boxed closure: deadlines fire from IRQ context, which must not
/// allocate (spec.md §4.2: "must be O(1) and non-blocking").
#[derive(Clone, Copy)]
struct DeadlineEntry {
    target_tick: u64,
    token: u64,
    callback: fn(usize),
    context: usize,
}

/// A handle returned by [`Clock::deadline`], used to cancel it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineToken(u64);

/// The kernel's monotonic tick clock and deadline queue.
pub struct Clock {
    sample: SeqLock<ClockSample>,
    /// Ticks per (sec, nsec) conversion: ticks-per-second, platform fixed.
    ticks_per_sec: u32,
    cycles_per_tick: u32,
    queue: IrqSpinLock<ArrayVec<DeadlineEntry, MAX_DEADLINES>>,
    next_token: core::sync::atomic::AtomicU64,
}

impl Clock {
    /// Creates a clock ticking at `ticks_per_sec`, with `cycles_per_tick`
    /// sub-tick resolution units per tick (used only to scale
    /// `gettime_hires`'s interpolation term).
    #[must_use]
    pub const fn new(ticks_per_sec: u32, cycles_per_tick: u32) -> Self {
        Self {
            sample: SeqLock::new(ClockSample { tick: 0, cycles: 0 }),
            ticks_per_sec,
            cycles_per_tick,
            queue: IrqSpinLock::new(ArrayVec::new()),
            next_token: core::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the raw tick counter.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.sample.read().tick
    }

    /// Advances the clock by one tick and fires every deadline whose target
    /// has been reached, in sorted-then-insertion order (spec.md §5:
    /// "two deadlines at the same tick fire in insertion order").
    ///
    /// Called from the timer IRQ handler. Masks nothing itself — the caller
    /// is already running with the timer IRQ's interrupt level active.
    pub fn tick(&self) {
        let now = {
            let mut guard = self.sample.write();
            guard.tick += 1;
            guard.cycles = 0;
            guard.tick
        };

        loop {
            let due = {
                let mut queue = self.queue.lock();
                // `remove`, not `swap_remove`: preserves the relative order
                // of the remaining entries, so same-tick deadlines keep
                // firing in insertion order across repeated dequeues below.
                match queue.iter().position(|d| d.target_tick <= now) {
                    Some(idx) => Some(queue.remove(idx)),
                    None => None,
                }
            };
            match due {
                Some(entry) => (entry.callback)(entry.context),
                None => break,
            }
        }
    }

    /// Records the sub-tick cycle count since the last tick boundary, for
    /// [`gettime_hires`](Self::gettime_hires) interpolation. Also IRQ-context,
    /// called as often as the platform's free-running cycle counter allows.
    pub fn record_cycles(&self, cycles: u32) {
        let mut guard = self.sample.write();
        guard.cycles = cycles;
    }

    /// Returns the current `(sec, nsec)` time, accurate to one tick.
    #[must_use]
    pub fn gettime(&self) -> Timespec {
        self.ticks_to_timespec(self.sample.read().tick, 0)
    }

    /// Returns the current `(sec, nsec)` time, interpolating the recorded
    /// sub-tick cycle count into the nanosecond field without ever
    /// observing a tick boundary mid-read (seqlock retry via
    /// [`SeqLock::read`]).
    #[must_use]
    pub fn gettime_hires(&self) -> Timespec {
        let sample = self.sample.read();
        self.ticks_to_timespec(sample.tick, sample.cycles)
    }

    fn ticks_to_timespec(&self, ticks: u64, cycles: u32) -> Timespec {
        let sec = ticks / u64::from(self.ticks_per_sec);
        let tick_in_sec = ticks % u64::from(self.ticks_per_sec);
        let ns_per_tick = 1_000_000_000u64 / u64::from(self.ticks_per_sec);
        let cycle_ns = if self.cycles_per_tick == 0 {
            0
        } else {
            (u64::from(cycles) * ns_per_tick) / u64::from(self.cycles_per_tick)
        };
        let nsec = tick_in_sec * ns_per_tick + cycle_ns.min(ns_per_tick.saturating_sub(1));
        Timespec {
            sec,
            nsec: nsec as u32,
        }
    }

    /// Arms `callback(context)` to run the tick that `target_tick` is
    /// reached (or the next `tick()` call if it has already passed).
    ///
    /// Callable from task or IRQ context; masks no additional state beyond
    /// the queue's own spinlock, matching spec.md §4.2's "mask the relevant
    /// IRQ while mutating the queue" ([`IrqSpinLock`] already does this).
    ///
    /// # Panics
    ///
    /// Panics if the deadline queue is at capacity ([`MAX_DEADLINES`]).
    pub fn deadline(&self, target_tick: u64, callback: fn(usize), context: usize) -> DeadlineToken {
        let token = self
            .next_token
            .fetch_add(1, core::sync::atomic::Ordering::Relaxed);
        let entry = DeadlineEntry {
            target_tick,
            token,
            callback,
            context,
        };
        let mut queue = self.queue.lock();
        assert!(
            queue.len() < MAX_DEADLINES,
            "deadline queue at capacity"
        );
        queue.push(entry);
        DeadlineToken(token)
    }

    /// Cancels a previously armed deadline.
    ///
    /// Returns `true` iff the deadline was still armed (had not already
    /// fired or been cancelled).
    pub fn cancel_deadline(&self, token: DeadlineToken) -> bool {
        let mut queue = self.queue.lock();
        match queue.iter().position(|d| d.token == token.0) {
            Some(idx) => {
                queue.swap_remove(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn tick_advances_counter() {
        let clock = Clock::new(60, 0);
        assert_eq!(clock.ticks(), 0);
        clock.tick();
        clock.tick();
        assert_eq!(clock.ticks(), 2);
    }

    #[test]
    fn gettime_converts_ticks_to_seconds() {
        let clock = Clock::new(60, 0);
        for _ in 0..60 {
            clock.tick();
        }
        let ts = clock.gettime();
        assert_eq!(ts.sec, 1);
        assert_eq!(ts.nsec, 0);
    }

    #[test]
    fn gettime_hires_monotonic_non_decreasing() {
        let clock = Clock::new(60, 1000);
        let mut last = clock.gettime_hires();
        for i in 0..120 {
            clock.record_cycles((i % 1000) as u32);
            let now = clock.gettime_hires();
            let last_total = last.sec * 1_000_000_000 + u64::from(last.nsec);
            let now_total = now.sec * 1_000_000_000 + u64::from(now.nsec);
            assert!(now_total >= last_total);
            last = now;
            if i % 10 == 0 {
                clock.tick();
            }
        }
    }

    static FIRED: AtomicU32 = AtomicU32::new(0);
    fn mark_fired(_ctx: usize) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn deadline_fires_when_reached() {
        FIRED.store(0, Ordering::SeqCst);
        let clock = Clock::new(60, 0);
        clock.deadline(3, mark_fired, 0);
        clock.tick();
        clock.tick();
        assert_eq!(FIRED.load(Ordering::SeqCst), 0);
        clock.tick();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_deadline_before_fire_returns_true() {
        let clock = Clock::new(60, 0);
        let token = clock.deadline(100, mark_fired, 0);
        assert!(clock.cancel_deadline(token));
    }

    #[test]
    fn cancel_deadline_twice_returns_false_second_time() {
        let clock = Clock::new(60, 0);
        let token = clock.deadline(100, mark_fired, 0);
        assert!(clock.cancel_deadline(token));
        assert!(!clock.cancel_deadline(token));
    }

    #[test]
    fn cancel_after_fire_returns_false() {
        FIRED.store(0, Ordering::SeqCst);
        let clock = Clock::new(60, 0);
        let token = clock.deadline(1, mark_fired, 0);
        clock.tick();
        assert_eq!(FIRED.load(Ordering::SeqCst), 1);
        assert!(!clock.cancel_deadline(token));
    }

    #[test]
    fn same_tick_deadlines_fire_in_insertion_order() {
        static ORDER: IrqSpinLock<ArrayVec<u32, 4>> = IrqSpinLock::new(ArrayVec::new());
        fn record_a(_ctx: usize) {
            ORDER.lock().push(1);
        }
        fn record_b(_ctx: usize) {
            ORDER.lock().push(2);
        }
        let clock = Clock::new(60, 0);
        clock.deadline(1, record_a, 0);
        clock.deadline(1, record_b, 0);
        clock.tick();
        let order: std::vec::Vec<u32> = ORDER.lock().iter().copied().collect();
        assert_eq!(order, std::vec![1, 2]);
    }
}
