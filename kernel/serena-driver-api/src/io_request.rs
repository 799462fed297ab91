//! IO request pool (spec.md §4.6: "A small fixed-size LRU cache (≤ 8) of
//! zero-initialized request blocks, sized to the next multiple of 16
//! bytes, indexed by size class. Get/Put are mutex-protected; cache miss
//! falls through to kalloc.").
//!
//! SPEC_FULL.md grounds this on `kernel/serena-fs`'s [`serena_fs::DiskCache`]
//! shape: a bounded map behind a mutex, get/put instead of map/unmap,
//! "fall through to allocate on miss" instead of "read from the
//! container on miss". The donor kernel has no direct equivalent.

use alloc::vec::Vec;

use serena_core::sync::Mutex;

/// Maximum number of pooled request blocks (spec.md: "≤ 8").
pub const POOL_CAPACITY: usize = 8;

/// Rounds `size` up to the next multiple of 16 bytes (spec.md: "sized to
/// the next multiple of 16 bytes").
#[must_use]
pub const fn round_up_16(size: usize) -> usize {
    (size + 15) & !15
}

/// A type tag distinguishing request kinds (spec.md: "Each request carries
/// a type tag").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestKind {
    /// Block-device read.
    Read,
    /// Block-device write.
    Write,
    /// Device-specific control operation.
    Ioctl,
}

/// Completion status of an [`IoRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Submitted, not yet complete.
    Pending,
    /// Completed successfully.
    Done,
    /// Completed with a driver-reported failure.
    Failed,
}

/// A pooled, fixed-size descriptor carrying an async driver operation and
/// its completion callback (spec.md glossary: "IORequest").
///
/// `data` is zero-initialized at acquisition (spec.md: "zero-initialized
/// request blocks") and always exactly `round_up_16(requested_size)` long,
/// so the same block can be reused for any request whose requested size
/// falls in the same size class.
pub struct IoRequest {
    pub(crate) capacity: usize,
    /// The request's payload buffer.
    pub data: Vec<u8>,
    /// What kind of operation this request carries.
    pub kind: RequestKind,
    /// Current completion status.
    pub status: RequestStatus,
    /// Optional completion callback, invoked with `context` when `status`
    /// transitions away from `Pending`. A plain function pointer, not a
    /// boxed closure: completions may run from IRQ context (spec.md §4.2's
    /// "O(1) and non-blocking" deadline-callback constraint applies
    /// equally here).
    pub completion: Option<(fn(usize), usize)>,
    /// Untyped context word passed to `completion`.
    pub context: usize,
}

impl IoRequest {
    fn new(capacity: usize, kind: RequestKind) -> Self {
        Self {
            capacity,
            data: alloc::vec![0u8; capacity],
            kind,
            status: RequestStatus::Pending,
            completion: None,
            context: 0,
        }
    }

    fn reset(&mut self, kind: RequestKind) {
        self.data.fill(0);
        self.kind = kind;
        self.status = RequestStatus::Pending;
        self.completion = None;
        self.context = 0;
    }

    /// Runs this request's completion callback, if any, then marks it
    /// complete with `status`.
    pub fn complete(&mut self, status: RequestStatus) {
        self.status = status;
        if let Some((callback, context)) = self.completion {
            callback(context);
        }
    }
}

/// A fixed-capacity, size-class-indexed pool of [`IoRequest`] blocks.
///
/// `get` pops a free block whose capacity matches `size`'s class if one is
/// pooled, else allocates a fresh one (spec.md: "cache miss falls through
/// to kalloc"); `put` returns a block to the pool, evicting the
/// least-recently-returned block first once at [`POOL_CAPACITY`].
pub struct IoRequestPool {
    free: Mutex<Vec<IoRequest>>,
}

impl Default for IoRequestPool {
    fn default() -> Self {
        Self::new()
    }
}

impl IoRequestPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Acquires a zero-initialized request of at least `size` bytes for
    /// `kind`. Reuses a pooled block of the matching size class if one is
    /// free, else allocates a fresh one.
    pub async fn get(&self, size: usize, kind: RequestKind) -> IoRequest {
        let capacity = round_up_16(size);
        let mut free = self.free.lock().await;
        if let Some(idx) = free.iter().position(|r| r.capacity == capacity) {
            let mut req = free.remove(idx);
            req.reset(kind);
            return req;
        }
        IoRequest::new(capacity, kind)
    }

    /// Returns `req` to the pool. If the pool is already at
    /// [`POOL_CAPACITY`], the least-recently-returned block is evicted to
    /// make room (the pool is an LRU cache, not an unbounded free list).
    pub async fn put(&self, req: IoRequest) {
        let mut free = self.free.lock().await;
        if free.len() >= POOL_CAPACITY {
            free.remove(0);
        }
        free.push(req);
    }

    /// Number of blocks currently pooled (test/diagnostic hook).
    pub async fn pooled_count(&self) -> usize {
        self.free.lock().await.len()
    }
}
