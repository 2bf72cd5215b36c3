//! # Boundary-tag block headers
//!
//! Every block in the heap begins with a [`Header`]. The header packs the
//! block's allocation state into the low three bits of its size word (sizes
//! are multiples of eight, so those bits are always free) and records the
//! payload size of its left neighbor, which makes both neighbors reachable
//! in O(1):
//!
//! ```text
//! +--------+-----------+----------------------------------+
//! | size   | left_size |  next | prev   (when free)       |
//! | +state |           |  payload...    (when allocated)  |
//! +--------+-----------+----------------------------------+
//! ^ header              ^ payload / free-list link overlay
//! ```
//!
//! The free-list link and the first payload bytes share storage, so an
//! allocated block only pays [`HEADER_OVERHEAD`] bytes of bookkeeping — the
//! two size words — while a free block additionally keeps its list links in
//! the bytes the client is no longer using.
//!
//! Fenceposts use the same header but own **only the first two words**: the
//! right fencepost of an arena sits in the arena's last
//! [`HEADER_OVERHEAD`] bytes, and touching its link area would write past
//! the arena. All header access therefore goes through raw-pointer
//! projections; no `&Header` is ever formed.

/// Low bits of `size` holding the [`BlockState`].
const STATE_MASK: usize = 0b111;

/// Bookkeeping bytes preceding an allocated block's payload: the two size
/// words, without the link overlay.
pub const HEADER_OVERHEAD: usize = size_of::<Header>() - size_of::<FreeLink>();

/// Smallest payload a block may carry — a freed block must be able to hold
/// its two list links.
pub const MIN_PAYLOAD: usize = size_of::<FreeLink>();

/// Allocation state of a block, stored in the low bits of its size word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum BlockState {
    /// On the free list, link overlay live.
    Unallocated = 0,
    /// Handed to the client, payload overlay live.
    Allocated = 1,
    /// Arena boundary marker; never allocated, never listed.
    Fencepost = 2,
}

impl BlockState {
    /// Decodes the state bits, or `None` for a bit pattern no block may
    /// carry.
    #[must_use]
    pub const fn from_bits(bits: usize) -> Option<Self> {
        match bits {
            0 => Some(Self::Unallocated),
            1 => Some(Self::Allocated),
            2 => Some(Self::Fencepost),
            _ => None,
        }
    }
}

/// Doubly-linked free-list node, overlaid on the first payload bytes of an
/// unallocated block.
#[repr(C)]
struct FreeLink {
    next: *mut Header,
    prev: *mut Header,
}

/// In-band block metadata; see the module docs for the layout.
///
/// Headers are never constructed as values. They are stamped into arena
/// memory with [`Header::stamp`] and manipulated exclusively through the
/// raw-pointer accessors below, because a header at an arena's right edge
/// is only [`HEADER_OVERHEAD`] bytes long and a reference to the full
/// struct would overhang the arena.
#[repr(C)]
pub struct Header {
    /// Payload byte count with the state in the low three bits.
    size: usize,
    /// Payload byte count of the block immediately to the left; zero when
    /// the left neighbor is the arena's left fencepost.
    left_size: usize,
    /// Free-list links; meaningful only while `Unallocated`.
    link: FreeLink,
}

impl Header {
    /// Writes the two size words of a header, leaving the link area alone.
    ///
    /// # Safety
    /// `h` must point at `HEADER_OVERHEAD` writable bytes.
    pub unsafe fn stamp(h: *mut Self, state: BlockState, true_size: usize, left_size: usize) {
        debug_assert!(true_size & STATE_MASK == 0, "payload size must be 8-aligned");
        unsafe {
            (&raw mut (*h).size).write(true_size | state as usize);
            (&raw mut (*h).left_size).write(left_size);
        }
    }

    /// Payload byte count with the state bits masked off.
    ///
    /// # Safety
    /// `h` must point at a stamped header.
    #[inline]
    pub unsafe fn true_size(h: *const Self) -> usize {
        unsafe { (*h).size & !STATE_MASK }
    }

    /// Decodes the block's state.
    ///
    /// # Safety
    /// `h` must point at a stamped header.
    ///
    /// # Panics
    /// On a bit pattern that is not a valid state; the heap is corrupt and
    /// continuing would spread the damage.
    #[inline]
    pub unsafe fn state(h: *const Self) -> BlockState {
        let bits = unsafe { (*h).size } & STATE_MASK;
        BlockState::from_bits(bits).expect("corrupted block state")
    }

    /// Replaces the state bits, keeping the size.
    ///
    /// # Safety
    /// `h` must point at a stamped header.
    #[inline]
    pub unsafe fn set_state(h: *mut Self, state: BlockState) {
        unsafe {
            (*h).size = Self::true_size(h) | state as usize;
        }
    }

    /// Replaces the payload size, keeping the state bits.
    ///
    /// # Safety
    /// `h` must point at a stamped header.
    #[inline]
    pub unsafe fn set_true_size(h: *mut Self, true_size: usize) {
        debug_assert!(true_size & STATE_MASK == 0, "payload size must be 8-aligned");
        unsafe {
            (*h).size = true_size | ((*h).size & STATE_MASK);
        }
    }

    /// Payload byte count of the left neighbor.
    ///
    /// # Safety
    /// `h` must point at a stamped header.
    #[inline]
    pub unsafe fn left_size(h: *const Self) -> usize {
        unsafe { (*h).left_size }
    }

    /// # Safety
    /// `h` must point at a stamped header.
    #[inline]
    pub unsafe fn set_left_size(h: *mut Self, left_size: usize) {
        unsafe {
            (*h).left_size = left_size;
        }
    }

    /// Header of the block immediately to the left in arena order.
    ///
    /// # Safety
    /// `h` must point at a stamped header that is not an arena's left
    /// fencepost, and its `left_size` must be accurate.
    #[inline]
    pub unsafe fn left_neighbor(h: *mut Self) -> *mut Self {
        unsafe { h.byte_sub(Self::left_size(h) + HEADER_OVERHEAD) }
    }

    /// Header of the block immediately to the right in arena order.
    ///
    /// # Safety
    /// `h` must point at a stamped header that is not an arena's right
    /// fencepost.
    #[inline]
    pub unsafe fn right_neighbor(h: *mut Self) -> *mut Self {
        unsafe { h.byte_add(HEADER_OVERHEAD + Self::true_size(h)) }
    }

    /// First payload byte of the block — the address handed to the client.
    ///
    /// # Safety
    /// `h` must point at a stamped non-fencepost header.
    #[inline]
    pub unsafe fn payload(h: *mut Self) -> *mut u8 {
        unsafe { h.cast::<u8>().add(HEADER_OVERHEAD) }
    }

    /// Recovers the header from a client payload pointer.
    ///
    /// # Safety
    /// `payload` must have been produced by [`Header::payload`].
    #[inline]
    pub unsafe fn from_payload(payload: *mut u8) -> *mut Self {
        unsafe { payload.sub(HEADER_OVERHEAD).cast() }
    }

    /// Next free block in list order; null at the tail.
    ///
    /// # Safety
    /// `h` must point at a stamped `Unallocated` header.
    #[inline]
    pub unsafe fn next(h: *const Self) -> *mut Self {
        unsafe { (*h).link.next }
    }

    /// # Safety
    /// `h` must point at a stamped `Unallocated` header.
    #[inline]
    pub unsafe fn set_next(h: *mut Self, next: *mut Self) {
        unsafe {
            (&raw mut (*h).link.next).write(next);
        }
    }

    /// Previous free block in list order; null at the head.
    ///
    /// # Safety
    /// `h` must point at a stamped `Unallocated` header.
    #[inline]
    pub unsafe fn prev(h: *const Self) -> *mut Self {
        unsafe { (*h).link.prev }
    }

    /// # Safety
    /// `h` must point at a stamped `Unallocated` header.
    #[inline]
    pub unsafe fn set_prev(h: *mut Self, prev: *mut Self) {
        unsafe {
            (&raw mut (*h).link.prev).write(prev);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_is_two_words() {
        assert_eq!(HEADER_OVERHEAD, 2 * size_of::<usize>());
        assert_eq!(MIN_PAYLOAD, 2 * size_of::<*mut Header>());
        assert_eq!(size_of::<Header>(), HEADER_OVERHEAD + MIN_PAYLOAD);
    }

    #[test]
    fn state_bits_round_trip() {
        let mut slot = [0_u8; size_of::<Header>()];
        let h = slot.as_mut_ptr().cast::<Header>();
        unsafe {
            Header::stamp(h, BlockState::Unallocated, 64, 32);
            assert_eq!(Header::state(h), BlockState::Unallocated);
            assert_eq!(Header::true_size(h), 64);
            assert_eq!(Header::left_size(h), 32);

            Header::set_state(h, BlockState::Allocated);
            assert_eq!(Header::state(h), BlockState::Allocated);
            assert_eq!(Header::true_size(h), 64);

            Header::set_true_size(h, 128);
            assert_eq!(Header::state(h), BlockState::Allocated);
            assert_eq!(Header::true_size(h), 128);
        }
    }

    #[test]
    fn invalid_state_bits_are_rejected() {
        assert_eq!(BlockState::from_bits(3), None);
        assert_eq!(BlockState::from_bits(7), None);
    }

    #[test]
    fn neighbors_and_payload_round_trip() {
        // Two adjacent blocks with 32- and 48-byte payloads.
        #[repr(align(16))]
        struct Image([u8; 256]);
        let mut image = Image([0; 256]);
        let base = image.0.as_mut_ptr();

        let first = base.cast::<Header>();
        unsafe {
            Header::stamp(first, BlockState::Allocated, 32, 0);
            let second = Header::right_neighbor(first);
            Header::stamp(second, BlockState::Unallocated, 48, 32);

            assert_eq!(second.cast::<u8>(), base.add(HEADER_OVERHEAD + 32));
            assert_eq!(Header::left_neighbor(second), first);

            let p = Header::payload(first);
            assert_eq!(p, first.cast::<u8>().add(HEADER_OVERHEAD));
            assert_eq!(Header::from_payload(p), first);
        }
    }
}
