//! Frame-buffer driver model: surfaces, screens, and the Copper program
//! cache (spec.md §4.6: "it owns surfaces..., screens..., and the
//! currently displayed screen. Updating the display compiles a GPU
//! instruction list (Copper program)... Retired programs return to a
//! small cache (bounded by count) and are reissued if their instruction
//! capacity matches.").
//!
//! Grounded on the donor's [`crate::driver::Driver`]/framebuffer interface
//! shape (`kernel/hadron-driver-api/src/framebuffer.rs`'s `Framebuffer`
//! trait, `PixelFormat`/`FramebufferInfo`) for the pixel surface, and on
//! `kernel/serena-fs`'s [`serena_fs::DiskCache`] "pool small fixed-size
//! objects, fall through to allocate on miss" shape for the Copper cache,
//! per SPEC_FULL.md.

use alloc::vec::Vec;

use serena_core::sync::Mutex;

/// One of the small set of indexed planar pixel formats a [`Surface`] may
/// use (spec.md: "a small set of indexed planar pixel formats").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexedFormat {
    /// 2 bitplanes, 4 colors.
    Planar2,
    /// 4 bitplanes, 16 colors.
    Planar4,
    /// 8 bitplanes, 256 colors (HAM excluded — a real Amiga mode, but out
    /// of scope here).
    Planar8,
}

impl IndexedFormat {
    /// Number of bitplanes this format uses.
    #[must_use]
    pub const fn planes(self) -> u32 {
        match self {
            Self::Planar2 => 2,
            Self::Planar4 => 4,
            Self::Planar8 => 8,
        }
    }
}

/// An off-screen pixel buffer.
pub struct Surface {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel format.
    pub format: IndexedFormat,
    /// Raw planar pixel data.
    pub planes: Vec<Vec<u8>>,
}

impl Surface {
    /// Allocates a zeroed surface of `width` x `height` pixels in `format`.
    #[must_use]
    pub fn new(width: u32, height: u32, format: IndexedFormat) -> Self {
        let bytes_per_plane = (width as usize * height as usize).div_ceil(8);
        let planes = (0..format.planes())
            .map(|_| alloc::vec![0u8; bytes_per_plane])
            .collect();
        Self {
            width,
            height,
            format,
            planes,
        }
    }
}

/// A hardware sprite slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sprite {
    /// X position.
    pub x: u32,
    /// Y position.
    pub y: u32,
    /// Visible flag.
    pub visible: bool,
}

/// Maximum sprites per screen.
pub const MAX_SPRITES: usize = 8;

/// A color look-up table entry (RGB, one byte per channel).
#[derive(Debug, Clone, Copy, Default)]
pub struct ClutEntry {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

/// A displayable configuration: a surface, its video mode, a CLUT, and up
/// to [`MAX_SPRITES`] sprites (spec.md: "screens (a surface + video mode +
/// CLUT + up to N sprites)").
pub struct Screen {
    /// The surface being displayed.
    pub surface: Surface,
    /// Color look-up table.
    pub clut: Vec<ClutEntry>,
    /// Active sprites.
    pub sprites: [Sprite; MAX_SPRITES],
}

/// A single Copper instruction word (spec.md glossary: "a list of
/// GPU-instruction words describing one video frame").
pub type CopperInstr = u32;

/// A compiled Copper program describing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopperProgram {
    /// The instruction list.
    pub instructions: Vec<CopperInstr>,
}

impl CopperProgram {
    /// Number of instructions (the cache's reuse key).
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }
}

/// Bounded-by-count cache of retired Copper programs (spec.md: "Retired
/// programs return to a small cache (bounded by count) and are reissued
/// if their instruction capacity matches.").
///
/// "Bounded by count" mirrors [`crate::io_request::IoRequestPool`]'s shape:
/// a mutex-protected `Vec`, evict-oldest on overflow, reuse keyed by a
/// matching size (there, byte size class; here, instruction count).
pub struct CopperCache {
    capacity: usize,
    retired: Mutex<Vec<CopperProgram>>,
}

impl CopperCache {
    /// Creates an empty cache holding at most `capacity` retired programs.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Returns a retired program to the cache, evicting the
    /// oldest-retired entry first if already at capacity.
    pub async fn retire(&self, program: CopperProgram) {
        let mut retired = self.retired.lock().await;
        if retired.len() >= self.capacity {
            retired.remove(0);
        }
        retired.push(program);
    }

    /// Reuses a cached program whose instruction count matches
    /// `instruction_count`, removing it from the cache (spec.md: "a
    /// subsequent submission whose instruction count matches a cached
    /// program reuses that slot (no new allocation)").
    pub async fn try_reuse(&self, instruction_count: usize) -> Option<CopperProgram> {
        let mut retired = self.retired.lock().await;
        let idx = retired
            .iter()
            .position(|p| p.instruction_count() == instruction_count)?;
        Some(retired.remove(idx))
    }

    /// Number of programs currently retired (test/diagnostic hook).
    pub async fn len(&self) -> usize {
        self.retired.lock().await.len()
    }

    /// `true` if no programs are currently retired.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_on<F: core::future::Future>(fut: F) -> F::Output {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> core::task::RawWaker {
            core::task::RawWaker::new(p, &VTABLE)
        }
        static VTABLE: core::task::RawWakerVTable =
            core::task::RawWakerVTable::new(clone, noop, noop, noop);
        let raw = core::task::RawWaker::new(core::ptr::null(), &VTABLE);
        let waker = unsafe { core::task::Waker::from_raw(raw) };
        let mut cx = core::task::Context::from_waker(&waker);
        let mut fut = core::pin::pin!(fut);
        loop {
            if let core::task::Poll::Ready(v) = fut.as_mut().poll(&mut cx) {
                return v;
            }
        }
    }

    fn program(len: usize) -> CopperProgram {
        CopperProgram {
            instructions: (0..len as u32).collect(),
        }
    }

    /// S6 — after submitting K>8 distinct screen configurations whose
    /// Copper programs all exceed the cache capacity, the cache holds
    /// exactly 8 retired programs; a subsequent submission whose
    /// instruction count matches a cached program reuses that slot.
    #[test]
    fn s6_copper_program_reuse() {
        block_on(async {
            let cache = CopperCache::new(8);
            for len in 0..12 {
                cache.retire(program(len)).await;
            }
            assert_eq!(cache.len().await, 8);

            // Programs 0..4 were evicted (oldest first); 4..12 remain.
            assert!(cache.try_reuse(0).await.is_none());
            assert!(cache.try_reuse(3).await.is_none());

            let reused = cache.try_reuse(7).await.unwrap();
            assert_eq!(reused.instruction_count(), 7);
            // reusing removes it from the cache
            assert_eq!(cache.len().await, 7);
            assert!(cache.try_reuse(7).await.is_none());
        });
    }

    #[test]
    fn surface_allocates_one_plane_buffer_per_bitplane() {
        let surface = Surface::new(16, 8, IndexedFormat::Planar4);
        assert_eq!(surface.planes.len(), 4);
        assert_eq!(surface.planes[0].len(), (16 * 8usize).div_ceil(8));
    }
}
