//! # Program-break arena source
//!
//! Feeds the heap engine from the classic Unix data segment: every arena
//! is the span between the old and new program break after an `sbrk` call.
//! Memory obtained this way stays with the process until it exits, which
//! is exactly the lifetime the engine assumes.

use brkheap_core::ArenaSource;
use core::ptr::NonNull;
use log::trace;

/// Alignment the block layout requires of an arena's first byte.
const ARENA_ALIGN: usize = 8;

/// [`ArenaSource`] over `sbrk`.
///
/// Consecutive successful calls return contiguous regions unless some other
/// part of the process moved the break in between, so arenas usually join.
/// A failed `sbrk` already leaves `ENOMEM` in `errno`.
pub struct BrkSource {
    _private: (),
}

impl BrkSource {
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for BrkSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaSource for BrkSource {
    fn base(&mut self) -> *mut u8 {
        // SAFETY: sbrk(0) only reads the current break.
        unsafe { libc::sbrk(0).cast() }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn request_arena(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size > isize::MAX as usize {
            return None;
        }
        // SAFETY: always called under the allocator's process-wide lock,
        // so the two-step read-then-grow below cannot interleave with our
        // own requests. A foreign break move merely costs contiguity.
        unsafe {
            // Realign the break if a foreign sbrk user left it odd; headers
            // must land on 8-byte boundaries.
            let current = libc::sbrk(0) as usize;
            let slack = current.wrapping_neg() % ARENA_ALIGN;
            if slack != 0 {
                trace!("realigning the break by {slack} bytes");
                if libc::sbrk(slack as isize) as usize == usize::MAX {
                    return None;
                }
            }
            let region = libc::sbrk(size as isize);
            if region as usize == usize::MAX {
                return None;
            }
            NonNull::new(region.cast())
        }
    }
}
