//! # Arena acquisition
//!
//! The heap grows by acquiring large contiguous regions ("arenas") from an
//! [`ArenaSource`] — the program-break primitive in production, a slab
//! buffer in tests. Each arena is bracketed by two fencepost headers so
//! that neighbor traversal can never walk off its ends, and so that a later
//! arena that happens to start exactly where the previous one ended can be
//! joined with it.

use crate::header::{BlockState, HEADER_OVERHEAD, Header};
use core::ptr::NonNull;

/// Provider of contiguous heap regions; the OS seam.
///
/// Implementations hand out regions that are at least 8-byte aligned and
/// live for the rest of the process — the heap never gives memory back.
/// Consecutive regions *may* be contiguous; the heap detects that case by
/// address arithmetic and joins the arenas.
pub trait ArenaSource {
    /// Address of the break before any arena was handed out.
    ///
    /// Recorded once at bootstrap and kept for the life of the process.
    fn base(&mut self) -> *mut u8;

    /// Obtains `size` fresh bytes, or `None` if the OS refuses.
    ///
    /// `size` is always a multiple of the configured arena quantum. A
    /// refusal is the only allocation failure the heap can surface.
    fn request_arena(&mut self, size: usize) -> Option<NonNull<u8>>;
}

/// Stamps the boundary fenceposts of a fresh arena and returns them.
///
/// The left fencepost occupies the arena's first [`HEADER_OVERHEAD`] bytes,
/// the right one its last. The right fencepost's `left_size` is set for the
/// interior block that spans everything in between; the caller stamps that
/// block (or dissolves it into a neighbor when joining arenas).
///
/// # Safety
/// `region` must point at `size` writable bytes, 8-byte aligned, with
/// `size` large enough for two fenceposts and a minimal block.
pub(crate) unsafe fn stamp_fenceposts(
    region: *mut u8,
    size: usize,
) -> (*mut Header, *mut Header) {
    let left = region.cast::<Header>();
    // SAFETY: per contract the region holds `size` bytes.
    let right = unsafe { region.add(size - HEADER_OVERHEAD).cast::<Header>() };
    unsafe {
        Header::stamp(left, BlockState::Fencepost, 0, 0);
        Header::stamp(right, BlockState::Fencepost, 0, size - 3 * HEADER_OVERHEAD);
    }
    (left, right)
}
