//! Leveled kernel logging (SPEC_FULL.md ambient stack: "the donor's
//! leveled `kinfo!`/`kdebug!`/`kwarn!`/`kerror!` macro family over a
//! ring-buffered log sink, plus ... `ktrace_subsys!`").
//!
//! Grounded on the donor's `kernel/hadron-core/src/log.rs`: a global
//! function-pointer sink registered via an `AtomicPtr` (so the macros
//! work before any allocator exists) plus leveled convenience macros
//! expanding to a single formatting call. The donor's own sink
//! implementations are UART/framebuffer-specific; Serena has no display
//! driver grounding yet; the one ambient sink shipped here is
//! [`RingBufferSink`], a fixed-capacity in-memory ring any host test or
//! future driver can drain, matching `serena-sched`/`serena-core`'s
//! "no_std, no real hardware assumed" posture.

use core::fmt::{self, Write as _};

use planck_noalloc::ringbuf::RingBuf;
use serena_core::sync::IrqSpinLock;

/// Kernel log severity, most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Unrecoverable; the caller is about to halt.
    Fatal = 0,
    /// Something failed; the system continues.
    Error = 1,
    /// Unexpected but non-fatal condition.
    Warn = 2,
    /// High-level progress message.
    Info = 3,
    /// Detailed diagnostic.
    Debug = 4,
    /// Very verbose, low-level tracing.
    Trace = 5,
}

impl LogLevel {
    /// Fixed-width human-readable name, for aligned output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }
}

/// Usable capacity of [`RingBufferSink`]'s backing store, in records.
pub const RING_CAPACITY: usize = 256;

/// Backing array size for the ring buffer (one more than the usable
/// capacity, per [`RingBuf`]'s head==tail empty/full convention).
const RING_SIZE: usize = RING_CAPACITY + 1;

/// Maximum bytes retained per formatted log line; longer lines are
/// truncated.
pub const RECORD_CAPACITY: usize = 120;

/// One retained log line.
#[derive(Clone, Copy)]
pub struct LogRecord {
    /// Severity the line was logged at.
    pub level: LogLevel,
    len: usize,
    buf: [u8; RECORD_CAPACITY],
}

impl LogRecord {
    /// The formatted message text (valid UTF-8 by construction).
    #[must_use]
    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

struct FixedWriter {
    buf: [u8; RECORD_CAPACITY],
    len: usize,
}

impl fmt::Write for FixedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = RECORD_CAPACITY - self.len;
        let take = remaining.min(s.len());
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// A fixed-capacity in-memory log ring: oldest records are dropped once
/// [`RING_CAPACITY`] is exceeded.
pub struct RingBufferSink {
    records: IrqSpinLock<RingBuf<LogRecord, RING_SIZE>>,
    max_level: LogLevel,
}

impl RingBufferSink {
    /// Creates an empty ring accepting records at or above `max_level`'s
    /// severity (i.e. with `level <= max_level`).
    #[must_use]
    pub const fn new(max_level: LogLevel) -> Self {
        Self {
            records: IrqSpinLock::new(RingBuf::new()),
            max_level,
        }
    }

    /// Appends a formatted record, dropping the oldest if the ring is
    /// full.
    pub fn record(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if level > self.max_level {
            return;
        }
        let mut writer = FixedWriter {
            buf: [0; RECORD_CAPACITY],
            len: 0,
        };
        let _ = writer.write_fmt(args);
        let record = LogRecord {
            level,
            len: writer.len,
            buf: writer.buf,
        };
        let mut records = self.records.lock();
        if records.is_full() {
            records.pop();
        }
        records.push(record);
    }

    /// Copies out up to `out.len()` of the oldest-first retained records.
    pub fn drain_into(&self, out: &mut [LogRecord]) -> usize {
        let mut records = self.records.lock();
        let mut n = 0;
        while n < out.len() {
            match records.pop() {
                Some(r) => {
                    out[n] = r;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    /// Number of records currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// `true` if no records are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static SINK: RingBufferSink = RingBufferSink::new(LogLevel::Trace);

/// The process-wide ring buffer every `klog!`-family macro writes to.
#[must_use]
pub fn global_sink() -> &'static RingBufferSink {
    &SINK
}

/// Implementation detail for the `klog!`-family macros. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    SINK.record(level, args);
}

/// Logs a message at an explicit level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs a fatal-level message.
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message.
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message.
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message.
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs a trace-level message tagged with a subsystem name (spec.md §4's
/// `sched`/`vfs`/`driver`/`sig` subsystems), e.g.
/// `ktrace_subsys!(sched, "spawned {}", pid)`.
#[macro_export]
macro_rules! ktrace_subsys {
    ($subsys:ident, $($arg:tt)*) => {
        $crate::klog!(
            $crate::log::LogLevel::Trace,
            "[{}] {}",
            stringify!($subsys),
            format_args!($($arg)*)
        )
    };
}
