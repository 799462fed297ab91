//! Linker-section-based driver registration.
//!
//! Ported in shape (not content) from the donor's
//! `hadron-driver-api::{pci_driver_entry!, platform_driver_entry!}`, which
//! place `#[repr(C)]` entries into dedicated linker sections so the kernel
//! can discover drivers at boot with no runtime registry. This crate
//! reuses `serena-linkset`'s `declare_linkset!`/`linkset_entry!` directly
//! (SPEC_FULL.md: "the donor's `hadron-linkset` crate is reused unchanged
//! in shape") instead of re-deriving the unsafe section-bounds arithmetic.

use crate::driver::{Driver, DeviceOps};
use alloc::sync::Arc;

/// A function that constructs and starts a driver, publishing it under
/// the catalog name the entry itself carries.
///
/// Boot-time driver registration places one of these per driver crate in
/// the `.serena_drivers` linker section; the kernel walks the section
/// once at boot and calls every entry's `init` in turn, exactly as the
/// donor's PCI/platform registration does for its own driver families.
#[repr(C)]
pub struct DriverEntry {
    /// Driver name (for logging and catalog publish).
    pub name: &'static str,
    /// Constructs the driver and its device-ops delegate. Returns `None`
    /// if the matching hardware was not present (a no-op entry — distinct
    /// from `start()` failing after the hardware was found).
    pub probe: fn() -> Option<(Arc<dyn Driver>, Arc<dyn DeviceOps>)>,
}

// SAFETY: `DriverEntry` holds only a `&'static str` and a plain function
// pointer, both inherently `Sync`.
unsafe impl Sync for DriverEntry {}

serena_linkset::declare_linkset! {
    /// Returns every statically registered driver entry.
    pub fn driver_entries() -> [DriverEntry],
    section = "serena_drivers"
}

/// Registers a driver entry in the `.serena_drivers` linker section.
///
/// # Examples
///
/// ```ignore
/// serena_driver_api::registration::driver_entry!(UART_DRIVER, DriverEntry {
///     name: "uart0",
///     probe: uart_probe,
/// });
/// ```
#[macro_export]
macro_rules! driver_entry {
    ($name:ident, $entry:expr) => {
        serena_linkset::linkset_entry!("serena_drivers", $name: $crate::registration::DriverEntry = $entry);
    };
}
