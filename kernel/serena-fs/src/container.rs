//! Block-addressable backing stores (spec.md §4.5: "FSContainer ... wraps a
//! disk channel plus a disk cache session").
//!
//! A container never serves bytes directly — filesystems go through the
//! [`crate::cache::DiskCache`]'s `map`/`unmap`, which pin a container's
//! blocks into cache entries. The container itself only does raw
//! sector I/O and reports geometry, grounded on the donor kernel's
//! `BlockDevice` async sector trait (`fs::block_adapter`).

use alloc::boxed::Box;
use core::future::Future;
use core::pin::Pin;

use serena_core::error::SerenaResult;

/// A future returned by a [`FsContainer`] operation.
pub type ContainerFuture<'a, T> = Pin<Box<dyn Future<Output = SerenaResult<T>> + Send + 'a>>;

/// Fixed properties of a container, queried once at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerGeometry {
    /// Bytes per logical block.
    pub block_size: u32,
    /// Total number of addressable logical blocks.
    pub block_count: u64,
    /// `true` if writes are rejected (read-only media or mount option).
    pub read_only: bool,
    /// `true` if the medium can be physically replaced (floppy, CD).
    pub removable: bool,
}

/// A block-addressable backing store a filesystem is mounted on.
pub trait FsContainer: Send + Sync {
    /// Fixed geometry and properties.
    fn geometry(&self) -> ContainerGeometry;

    /// Reads logical block `lba` into `buf`, which must be exactly
    /// [`ContainerGeometry::block_size`] bytes.
    fn read_block<'a>(&'a self, lba: u64, buf: &'a mut [u8]) -> ContainerFuture<'a, ()>;

    /// Writes `buf` (exactly one block) to logical block `lba`.
    ///
    /// # Errors
    ///
    /// Returns [`serena_core::error::SerenaError::ReadOnly`] if
    /// [`ContainerGeometry::read_only`] is set.
    fn write_block<'a>(&'a self, lba: u64, buf: &'a [u8]) -> ContainerFuture<'a, ()>;
}
