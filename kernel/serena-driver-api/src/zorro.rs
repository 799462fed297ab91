//! Zorro autoconfig bus enumeration (spec.md §4.6: "On `start`, the
//! controller walks the autoconfig register ranges, assigns each
//! discovered board to a free I/O or memory window, constructs a
//! board-config record..., and attaches a per-board driver in sequence.
//! Slot IDs are stable within one enumeration.").
//!
//! Grounded on the donor's PCI ECAM config-space-walking shape
//! (`kernel/hadron-pci`), generalized from reading a 4 KiB ECAM config
//! space per BDF to reading Zorro autoconfig registers per board.

use alloc::vec::Vec;

/// A board type read from the autoconfig `Er_Type` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    /// Occupies a slice of the Zorro II memory window.
    Zorro2Mem,
    /// Occupies a slice of the Zorro III memory window.
    Zorro3Mem,
    /// Occupies an I/O-only window (no memory-mapped region).
    IoOnly,
}

/// A free window of address space a board can be assigned into.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    /// Base address of the window.
    pub base: u32,
    /// Size of the window in bytes.
    pub size: u32,
}

/// The raw fields autoconfig read off one board's config registers,
/// before a window has been assigned.
#[derive(Debug, Clone, Copy)]
pub struct RawBoard {
    /// Board type.
    pub kind: BoardKind,
    /// Size this board's config registers request (`Er_Size`).
    pub requested_size: u32,
    /// Manufacturer id (`Er_Manufacturer`).
    pub manufacturer: u16,
    /// Product id (`Er_Product`).
    pub product: u8,
    /// Serial number, if the board provides one (`Er_SerialNumber`).
    pub serial: u32,
}

/// A fully assigned board-config record (spec.md: "constructs a
/// board-config record (type, slot, base, size, manufacturer, etc.)").
#[derive(Debug, Clone, Copy)]
pub struct BoardConfig {
    /// Board type.
    pub kind: BoardKind,
    /// Stable slot id within this enumeration (0-based, discovery order).
    pub slot: u32,
    /// Base address assigned to this board.
    pub base: u32,
    /// Size of the assigned region.
    pub size: u32,
    /// Manufacturer id.
    pub manufacturer: u16,
    /// Product id.
    pub product: u8,
    /// Serial number.
    pub serial: u32,
}

/// Errors autoconfig enumeration can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoconfigError {
    /// No free window large enough remains for a discovered board.
    NoSpace,
}

/// Assigns each board in `boards` (in discovery order) to a free slice of
/// `zorro2_window` / `zorro3_window` / `io_window` matching its
/// [`BoardKind`], bumping the window's base past the assigned slice so
/// later boards land after earlier ones.
///
/// Slot ids are the board's index in `boards`, so they are stable across
/// repeated enumerations of the same physical board order (spec.md:
/// "Slot IDs are stable within one enumeration").
///
/// # Errors
///
/// Returns [`AutoconfigError::NoSpace`] at the first board whose window
/// has insufficient remaining size. Boards already assigned are still
/// returned in `Ok`'s `Vec` up to (not including) the failing board —
/// callers decide whether a partial enumeration is usable.
pub fn enumerate(
    boards: &[RawBoard],
    mut zorro2_window: Window,
    mut zorro3_window: Window,
    mut io_window: Window,
) -> Result<Vec<BoardConfig>, AutoconfigError> {
    let mut configs = Vec::with_capacity(boards.len());
    for (slot, board) in boards.iter().enumerate() {
        let window = match board.kind {
            BoardKind::Zorro2Mem => &mut zorro2_window,
            BoardKind::Zorro3Mem => &mut zorro3_window,
            BoardKind::IoOnly => &mut io_window,
        };
        if board.requested_size > window.size {
            return Err(AutoconfigError::NoSpace);
        }
        let base = window.base;
        window.base += board.requested_size;
        window.size -= board.requested_size;
        configs.push(BoardConfig {
            kind: board.kind,
            slot: slot as u32,
            base,
            size: board.requested_size,
            manufacturer: board.manufacturer,
            product: board.product,
            serial: board.serial,
        });
    }
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(base: u32, size: u32) -> Window {
        Window { base, size }
    }

    #[test]
    fn boards_get_sequential_non_overlapping_windows() {
        let boards = [
            RawBoard {
                kind: BoardKind::Zorro2Mem,
                requested_size: 0x10_0000,
                manufacturer: 1,
                product: 1,
                serial: 0,
            },
            RawBoard {
                kind: BoardKind::Zorro2Mem,
                requested_size: 0x8_0000,
                manufacturer: 2,
                product: 2,
                serial: 0,
            },
        ];
        let configs = enumerate(
            &boards,
            window(0x20_0000, 0x20_0000),
            window(0, 0),
            window(0, 0),
        )
        .unwrap();
        assert_eq!(configs[0].base, 0x20_0000);
        assert_eq!(configs[0].slot, 0);
        assert_eq!(configs[1].base, 0x30_0000);
        assert_eq!(configs[1].slot, 1);
    }

    #[test]
    fn out_of_space_is_reported() {
        let boards = [RawBoard {
            kind: BoardKind::IoOnly,
            requested_size: 0x1000,
            manufacturer: 1,
            product: 1,
            serial: 0,
        }];
        let err = enumerate(&boards, window(0, 0), window(0, 0), window(0, 0x800)).unwrap_err();
        assert_eq!(err, AutoconfigError::NoSpace);
    }

    #[test]
    fn slots_stable_across_repeated_enumeration_of_same_order() {
        let boards = [
            RawBoard {
                kind: BoardKind::Zorro3Mem,
                requested_size: 0x1000,
                manufacturer: 1,
                product: 1,
                serial: 0,
            },
            RawBoard {
                kind: BoardKind::Zorro3Mem,
                requested_size: 0x1000,
                manufacturer: 2,
                product: 2,
                serial: 0,
            },
        ];
        let first = enumerate(&boards, window(0, 0), window(0, 0x1_0000), window(0, 0)).unwrap();
        let second = enumerate(&boards, window(0, 0), window(0, 0x1_0000), window(0, 0)).unwrap();
        assert_eq!(first[0].slot, second[0].slot);
        assert_eq!(first[1].slot, second[1].slot);
    }
}
