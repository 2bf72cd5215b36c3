//! # Heap engine
//!
//! Ties the header algebra, the free list, the fit policies and the arena
//! source together into the allocator proper. One [`Heap`] value owns the
//! entire block universe; the surface crate wraps it in a process-wide
//! mutex and never touches blocks outside that lock.

use crate::arena::{ArenaSource, stamp_fenceposts};
use crate::config::HeapConfig;
use crate::free_list::FreeList;
use crate::header::{BlockState, HEADER_OVERHEAD, Header, MIN_PAYLOAD};
use core::ptr::{NonNull, null_mut};
use log::{debug, warn};

/// Failures a heap operation can report to its caller.
///
/// Client mistakes — double frees, foreign pointers, unknown fit selectors
/// — are not errors but panics: the heap cannot trust its own bookkeeping
/// after one, so the process must not continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The OS refused to grow the heap. Recoverable by the caller.
    #[error("the operating system refused to grow the heap")]
    OutOfMemory,
    /// Zero-byte requests are answered with null, not a block.
    #[error("zero-size allocation request")]
    ZeroRequest,
    /// A boot-time tunable violates the block-layout constraints.
    #[error("invalid heap configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Point-in-time counters for inspection and tooling.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks currently on the free list.
    pub free_blocks: usize,
    /// Total payload bytes of the listed blocks.
    pub free_bytes: usize,
    /// Arena requests answered by the source so far.
    pub arenas_acquired: usize,
    /// Bytes obtained from the source so far.
    pub bytes_acquired: usize,
}

/// The allocator state: free list, arena bookkeeping and the next-fit
/// cursor, generic over where its memory comes from.
///
/// All block manipulation happens through raw pointers into arena memory;
/// the safe API boundary is the surface crate's mutex. `Heap` is therefore
/// `Send` (to live inside that mutex) but deliberately not `Sync`.
pub struct Heap<S> {
    source: S,
    pub(crate) config: HeapConfig,
    pub(crate) free_list: FreeList,
    /// Rightmost fencepost of the most recently acquired arena; detects
    /// contiguous follow-up arenas.
    last_fencepost: *mut Header,
    /// Next-fit cursor; null or a listed block.
    pub(crate) next_allocate: *mut Header,
    /// The break as it was at bootstrap; constant afterwards.
    base: *mut u8,
    bootstrapped: bool,
    arenas_acquired: usize,
    bytes_acquired: usize,
}

// Safety: the heap's raw pointers are only dereferenced through `&mut self`,
// which the surface crate serializes behind one process-wide mutex.
unsafe impl<S: Send> Send for Heap<S> {}

impl<S> Heap<S> {
    /// Creates a dormant heap over `source`.
    ///
    /// `const` so the surface crate can hold the heap in a `static`;
    /// nothing touches the source until [`bootstrap`](Self::bootstrap).
    pub const fn new(source: S) -> Self {
        Self {
            source,
            config: HeapConfig::DEFAULT,
            free_list: FreeList::new(),
            last_fencepost: null_mut(),
            next_allocate: null_mut(),
            base: null_mut(),
            bootstrapped: false,
            arenas_acquired: 0,
            bytes_acquired: 0,
        }
    }

    #[must_use]
    pub const fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// The break recorded at bootstrap.
    #[must_use]
    pub const fn base(&self) -> *mut u8 {
        self.base
    }

    /// The active tunables.
    #[must_use]
    pub const fn config(&self) -> HeapConfig {
        self.config
    }

    /// Counts the current free list and acquisition totals.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            arenas_acquired: self.arenas_acquired,
            bytes_acquired: self.bytes_acquired,
            ..HeapStats::default()
        };
        for h in self.free_list.iter() {
            stats.free_blocks += 1;
            // Safety: listed nodes are stamped headers in live arenas.
            stats.free_bytes += unsafe { Header::true_size(h) };
        }
        stats
    }

    /// Payload sizes of the free blocks, in list order.
    pub fn free_sizes(&self) -> impl Iterator<Item = usize> {
        // Safety: listed nodes are stamped headers in live arenas.
        self.free_list.iter().map(|h| unsafe { Header::true_size(h) })
    }

    /// Cross-checks the free list against the block invariants.
    ///
    /// Intended for tests and debug builds after every public operation.
    ///
    /// # Panics
    /// On any violation: a listed block that is not unallocated, adjacent
    /// free blocks that escaped coalescing, a stale boundary tag, broken
    /// list links, or a dangling next-fit cursor.
    pub fn audit(&self) {
        let mut expected_prev = null_mut();
        let mut cursor_seen = self.next_allocate.is_null();
        for h in self.free_list.iter() {
            // Safety: listed nodes are stamped headers in live arenas.
            unsafe {
                assert!(
                    Header::state(h) == BlockState::Unallocated,
                    "listed block is not unallocated"
                );
                let t = Header::true_size(h);
                assert!(
                    t % 8 == 0 && t >= MIN_PAYLOAD,
                    "free block has a malformed payload size"
                );
                assert_eq!(Header::prev(h), expected_prev, "free-list back link is inconsistent");

                let right = Header::right_neighbor(h);
                assert_eq!(Header::left_size(right), t, "right neighbor's boundary tag is stale");
                assert!(
                    Header::state(right) != BlockState::Unallocated,
                    "adjacent free blocks escaped coalescing"
                );

                let left = Header::left_neighbor(h);
                assert_eq!(
                    Header::right_neighbor(left),
                    h,
                    "left neighbor's size does not lead back"
                );
                assert!(
                    Header::state(left) != BlockState::Unallocated,
                    "adjacent free blocks escaped coalescing"
                );

                if self.next_allocate == h {
                    cursor_seen = true;
                }
            }
            expected_prev = h;
        }
        assert!(cursor_seen, "next-fit cursor does not reference a listed block");
    }
}

impl<S: ArenaSource> Heap<S> {
    /// Validates `config`, records the break and arms the heap.
    ///
    /// Idempotent: a second call is a no-op, so every public entry point
    /// can run it under the surface mutex.
    ///
    /// # Errors
    /// [`HeapError::InvalidConfig`] when the tunables are unusable; the
    /// heap stays dormant.
    pub fn bootstrap(&mut self, config: HeapConfig) -> Result<(), HeapError> {
        if self.bootstrapped {
            return Ok(());
        }
        config.validate()?;
        self.config = config;
        self.base = self.source.base();
        self.bootstrapped = true;
        debug!("heap armed: base={:p}, fit={:?}", self.base, self.config.fit);
        Ok(())
    }

    /// Allocates a block of at least `requested` bytes and returns its
    /// payload.
    ///
    /// The request is rounded up to the configured granularity and to the
    /// smallest payload a block may carry, then satisfied from the free
    /// list, growing the heap by whole arenas when the list has nothing
    /// suitable.
    ///
    /// # Errors
    /// [`HeapError::ZeroRequest`] for `requested == 0`;
    /// [`HeapError::OutOfMemory`] when the source refuses to grow.
    ///
    /// # Safety
    /// All prior payloads handed out by this heap must still be within
    /// their blocks; the heap trusts its in-band bookkeeping.
    ///
    /// # Panics
    /// If called before [`bootstrap`](Self::bootstrap), or on internal
    /// invariant violations.
    pub unsafe fn alloc(&mut self, requested: usize) -> Result<NonNull<u8>, HeapError> {
        assert!(self.bootstrapped, "heap used before bootstrap");
        if requested == 0 {
            return Err(HeapError::ZeroRequest);
        }
        let size = self.normalize(requested)?;
        let need = size.checked_add(3 * HEADER_OVERHEAD).ok_or(HeapError::OutOfMemory)?;

        if self.free_list.is_empty() {
            self.grow(need)?;
        }
        let mut block = self.find_block(size);
        if block.is_null() {
            self.grow(need)?;
            block = self.find_block(size);
        }
        assert!(!block.is_null(), "fit policy found nothing after arena growth");
        // SAFETY: `block` is a listed free block large enough for `size`.
        Ok(unsafe { self.carve(block, size) })
    }

    /// Returns a payload to the heap, merging it with free neighbors.
    ///
    /// A block whose left or right neighbor is free dissolves into it so
    /// that no two adjacent blocks are ever both free; otherwise it is
    /// pushed onto the free list as-is.
    ///
    /// # Safety
    /// `payload` must have come from [`alloc`](Self::alloc) on this heap
    /// and must not have been freed since.
    ///
    /// # Panics
    /// When the derived header is not an allocated block — a double free
    /// or a foreign pointer, either of which poisons the heap.
    pub unsafe fn free(&mut self, payload: NonNull<u8>) {
        assert!(self.bootstrapped, "heap used before bootstrap");
        // SAFETY: the caller vouches that the pointer came from `alloc`.
        unsafe {
            let h = Header::from_payload(payload.as_ptr());
            assert!(
                Header::state(h) == BlockState::Allocated,
                "freeing a block that is not allocated (double free or foreign pointer)"
            );
            Header::set_state(h, BlockState::Unallocated);

            let left = Header::left_neighbor(h);
            let right = Header::right_neighbor(h);
            let left_free = Header::state(left) == BlockState::Unallocated;
            let right_free = Header::state(right) == BlockState::Unallocated;

            match (left_free, right_free) {
                (true, true) => {
                    // Both neighbors fold into the left block, which keeps
                    // its list position; the right block leaves the list.
                    let merged = Header::true_size(left)
                        + Header::true_size(h)
                        + Header::true_size(right)
                        + 2 * HEADER_OVERHEAD;
                    self.free_list.remove(right);
                    if self.next_allocate == right {
                        self.next_allocate = left;
                    }
                    Header::set_true_size(left, merged);
                    Header::set_left_size(Header::right_neighbor(left), merged);
                }
                (true, false) => {
                    let merged =
                        Header::true_size(left) + Header::true_size(h) + HEADER_OVERHEAD;
                    Header::set_true_size(left, merged);
                    Header::set_left_size(right, merged);
                }
                (false, true) => {
                    // The freed block inherits its right neighbor's list
                    // position and cursor claim.
                    if self.next_allocate == right {
                        self.next_allocate = h;
                    }
                    self.free_list.replace(right, h);
                    let merged =
                        Header::true_size(h) + HEADER_OVERHEAD + Header::true_size(right);
                    Header::set_true_size(h, merged);
                    Header::set_left_size(Header::right_neighbor(h), merged);
                }
                (false, false) => self.free_list.push_front(h),
            }
        }
    }

    /// Rounds a request up to the granularity and the minimum payload.
    fn normalize(&self, requested: usize) -> Result<usize, HeapError> {
        let gran = self.config.min_allocation;
        let rounded =
            requested.checked_add(gran - 1).ok_or(HeapError::OutOfMemory)? & !(gran - 1);
        Ok(if rounded < MIN_PAYLOAD { MIN_PAYLOAD } else { rounded })
    }

    /// Acquires one or more arenas covering `need` bytes and makes the new
    /// space reachable from the free list.
    ///
    /// When the incoming arena starts exactly where the previous one ended
    /// the fenceposts between them dissolve: a free rightmost block
    /// swallows the entire arena in place, while an allocated one donates
    /// the old fencepost as the header of a fresh listed block.
    fn grow(&mut self, need: usize) -> Result<(), HeapError> {
        let quantum = self.config.arena_size;
        let size = need
            .div_ceil(quantum)
            .checked_mul(quantum)
            .ok_or(HeapError::OutOfMemory)?;
        let Some(region) = self.source.request_arena(size) else {
            warn!("operating system refused a {size}-byte arena");
            return Err(HeapError::OutOfMemory);
        };
        let region = region.as_ptr();
        debug!("acquired a {size}-byte arena at {region:p}");
        self.arenas_acquired += 1;
        self.bytes_acquired += size;

        // SAFETY: the source handed us `size` exclusive, aligned bytes.
        let (left_fence, right_fence) = unsafe { stamp_fenceposts(region, size) };

        let contiguous = !self.last_fencepost.is_null()
            && unsafe { self.last_fencepost.byte_add(HEADER_OVERHEAD) } == left_fence;
        if contiguous {
            let old_fence = self.last_fencepost;
            // SAFETY: `old_fence` borders the previous arena's rightmost
            // block, and the join region is writable.
            unsafe {
                let neighbor = Header::left_neighbor(old_fence);
                if Header::state(neighbor) == BlockState::Unallocated {
                    let merged = Header::true_size(neighbor) + size;
                    Header::set_true_size(neighbor, merged);
                    Header::set_left_size(right_fence, merged);
                } else {
                    let payload = size - HEADER_OVERHEAD;
                    Header::stamp(
                        old_fence,
                        BlockState::Unallocated,
                        payload,
                        Header::true_size(neighbor),
                    );
                    Header::set_left_size(right_fence, payload);
                    self.free_list.push_front(old_fence);
                }
            }
        } else {
            // SAFETY: the interior header lies between the two fenceposts.
            unsafe {
                let interior = left_fence.byte_add(HEADER_OVERHEAD);
                Header::stamp(interior, BlockState::Unallocated, size - 3 * HEADER_OVERHEAD, 0);
                self.free_list.push_front(interior);
            }
        }
        self.last_fencepost = right_fence;
        Ok(())
    }

    /// Takes `size` bytes out of the front of the free block `h`, marks
    /// them allocated and returns the payload.
    ///
    /// The tail of the block returns to the free list as its own block
    /// unless it is too small to ever be handed out again, in which case
    /// the client keeps the slack.
    ///
    /// # Safety
    /// `h` must be a listed free block with `true_size >= size`.
    unsafe fn carve(&mut self, h: *mut Header, size: usize) -> NonNull<u8> {
        unsafe {
            let t = Header::true_size(h);
            debug_assert!(t >= size, "fit policy returned an undersized block");
            let successor = Header::next(h);

            if t - size <= 2 * HEADER_OVERHEAD + MIN_PAYLOAD {
                // The residue could not carry a free block; no split.
                self.free_list.remove(h);
            } else {
                let residue = t - size - HEADER_OVERHEAD;
                let tail = h.byte_add(HEADER_OVERHEAD + size);
                Header::stamp(tail, BlockState::Unallocated, residue, size);
                Header::set_left_size(Header::right_neighbor(tail), residue);
                Header::set_true_size(h, size);
                self.free_list.remove(h);
                self.free_list.push_front(tail);
            }

            // The cursor moves to the block that followed the chosen one,
            // so a next-fit scan resumes where this allocation left off.
            self.next_allocate = successor;
            Header::set_state(h, BlockState::Allocated);
            NonNull::new_unchecked(Header::payload(h))
        }
    }
}

/// Payload byte count of a live allocation.
///
/// The stored size is an upper bound on what the client asked for (requests
/// are rounded up); `realloc` uses it to bound its copy.
///
/// # Safety
/// `payload` must have come from [`Heap::alloc`] and not have been freed.
///
/// # Panics
/// When the derived header is not an allocated block.
#[must_use]
pub unsafe fn usable_size(payload: NonNull<u8>) -> usize {
    // SAFETY: the caller vouches that the pointer came from `alloc`.
    unsafe {
        let h = Header::from_payload(payload.as_ptr());
        assert!(
            Header::state(h) == BlockState::Allocated,
            "sizing a block that is not allocated"
        );
        Header::true_size(h)
    }
}
