//! The base [`Driver`] trait and I/O category enumeration (spec.md §4.6:
//! "Every driver is an object of some subclass of `Driver`. Drivers declare
//! I/O categories.").

use alloc::string::String;

use serena_core::error::SerenaResult;
use serena_fs::inode::InodeFuture;
use serena_fs::OpenFlags;

use crate::lifecycle::DriverState;

/// The small enumerated set of I/O categories a driver may declare.
///
/// Mirrors spec.md's examples (`IODISK_FLOPPY`, `IOHID_MOUSE`, `IOVID_FB`)
/// closed over the device classes this kernel actually ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum IoCategory {
    /// Floppy-style block storage.
    DiskFloppy,
    /// Hard-disk-style block storage.
    DiskHard,
    /// Pointing device (mouse).
    HidMouse,
    /// Keyboard.
    HidKeyboard,
    /// Video/frame-buffer output.
    VideoFb,
    /// Serial/character I/O.
    Serial,
    /// A bus controller (Zorro, PCI, …) that hosts child drivers.
    Bus,
}

/// Stable metadata every driver instance reports, independent of lifecycle
/// state.
#[derive(Debug, Clone)]
pub struct DriverInfo {
    /// The driver's catalog name (the DevFS entry it publishes under).
    pub name: String,
    /// I/O categories this driver declares.
    pub categories: &'static [IoCategory],
    /// Maximum number of child drivers this driver accepts via
    /// `attach_child` (0 for non-bus drivers).
    pub max_child_count: u32,
}

/// The base trait every driver subclass implements (spec.md §4.6).
///
/// Lifecycle and identity only. Device-specific data movement is a
/// separate trait ([`DeviceOps`]) a concrete driver also implements,
/// mirroring the donor's layer-1 `Driver` / layer-3 interface trait split
/// (`SerialPort`, `Framebuffer`, …).
pub trait Driver: Send + Sync {
    /// Stable driver metadata.
    fn info(&self) -> &DriverInfo;

    /// Current lifecycle state.
    fn state(&self) -> DriverState;

    /// Runs the hardware-specific part of startup: probe, publish any bus
    /// directory, and ready the device for I/O. Called by
    /// [`crate::catalog::DriverCatalog::start_driver`] once it has moved the
    /// driver `created -> starting`; a `false` return (or a propagated
    /// error handled by the caller) drives the `fail -> destroyed` edge.
    fn start(&self) -> SerenaResult<()>;

    /// Runs the hardware-specific part of shutdown. Called once the
    /// catalog has confirmed `running_child_count() == 0` and moved the
    /// driver `running -> stopping`.
    fn stop(&self) -> SerenaResult<()>;

    /// Number of children currently in the `running` state. The framework
    /// waits for this to reach zero before a bus driver's own `stop`
    /// completes (spec.md's `running-child-count -> 0` edge).
    fn running_child_count(&self) -> u32 {
        0
    }
}

/// Per-open-instance data movement, delegated to by a DevFS device node's
/// [`serena_fs::Inode`] implementation (spec.md §4.5: "device nodes wrap a
/// driver instance plus an opaque `arg`. Opening a device node constructs
/// an IOChannel by delegating to the driver's open.").
///
/// `arg` is the opaque word the catalog entry was published with (e.g. a
/// minor number or logical unit); most single-unit drivers ignore it.
pub trait DeviceOps: Send + Sync {
    /// Runs before a channel is opened over `arg`. The default accepts
    /// every open.
    fn on_open(&self, arg: u64, flags: OpenFlags) -> InodeFuture<'_, ()> {
        let _ = (arg, flags);
        alloc::boxed::Box::pin(async { Ok(()) })
    }

    /// Reads from unit `arg` at `offset`.
    fn read<'a>(&'a self, arg: u64, offset: usize, buf: &'a mut [u8]) -> InodeFuture<'a, usize>;

    /// Writes to unit `arg` at `offset`.
    fn write<'a>(&'a self, arg: u64, offset: usize, buf: &'a [u8]) -> InodeFuture<'a, usize>;
}
