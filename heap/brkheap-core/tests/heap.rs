//! End-to-end scenarios for the heap engine over a deterministic slab:
//! arena sizing, split thresholds, coalescing and the arena-join paths.

mod common;

use brkheap_core::{
    FitPolicy, Header, Heap, HeapConfig, HeapError, usable_size,
};
use common::{SlabSource, heap, heap_with};
use core::ptr::NonNull;

/// Block overhead on 64-bit targets: two bookkeeping words per block.
const H: usize = 16;
/// Interior payload of a fresh 4096-byte arena: three headers come off.
const FIRST_ARENA_PAYLOAD: usize = 4096 - 3 * H;

unsafe fn alloc(heap: &mut Heap<SlabSource>, n: usize) -> NonNull<u8> {
    unsafe { heap.alloc(n) }.expect("allocation should succeed")
}

fn free_sizes(heap: &Heap<SlabSource>) -> Vec<usize> {
    heap.free_sizes().collect()
}

#[test]
fn first_allocation_grows_one_arena() {
    let mut heap = heap();
    let p = unsafe { alloc(&mut heap, 8) };

    let stats = heap.stats();
    assert_eq!(stats.arenas_acquired, 1);
    assert_eq!(stats.bytes_acquired, 4096);

    // an 8-byte request is raised to the smallest payload a block can hold
    assert_eq!(unsafe { usable_size(p) }, 16);
    assert_eq!(free_sizes(&heap), [FIRST_ARENA_PAYLOAD - 16 - H]);
    heap.audit();
}

#[test]
fn zero_request_returns_nothing_and_changes_nothing() {
    let mut heap = heap();
    assert_eq!(unsafe { heap.alloc(0) }, Err(HeapError::ZeroRequest));
    assert_eq!(heap.stats().arenas_acquired, 0);
    assert!(free_sizes(&heap).is_empty());
}

#[test]
fn requests_round_up_to_granularity() {
    let mut heap = heap();
    let p = unsafe { alloc(&mut heap, 1) };
    assert_eq!(unsafe { usable_size(p) }, 16);

    let q = unsafe { alloc(&mut heap, 9) };
    assert_eq!(unsafe { usable_size(q) }, 16);

    let r = unsafe { alloc(&mut heap, 17) };
    assert_eq!(unsafe { usable_size(r) }, 24);
    heap.audit();
}

#[test]
fn coarser_granularity_is_respected() {
    let source = SlabSource::new();
    let mut heap = Heap::new(source);
    heap.bootstrap(HeapConfig {
        min_allocation: 16,
        ..HeapConfig::DEFAULT
    })
    .unwrap();

    let p = unsafe { heap.alloc(17) }.unwrap();
    assert_eq!(unsafe { usable_size(p) }, 32);
    heap.audit();
}

#[test]
fn undersized_residue_is_handed_to_the_client() {
    let mut heap = heap();

    // carve the arena down to a single 40-byte free block
    let big = unsafe { alloc(&mut heap, FIRST_ARENA_PAYLOAD - 40 - H) };
    assert_eq!(free_sizes(&heap), [40]);

    // a 16-byte request would leave a residue too small to relink; the
    // whole block is handed over instead
    let p = unsafe { alloc(&mut heap, 16) };
    assert_eq!(unsafe { usable_size(p) }, 40);
    assert!(free_sizes(&heap).is_empty());
    heap.audit();

    unsafe {
        heap.free(p);
        heap.free(big);
    }
    heap.audit();
}

#[test]
fn threshold_residue_is_not_split_off() {
    let mut heap = heap();

    let a = unsafe { alloc(&mut heap, 64) };
    let _guard = unsafe { alloc(&mut heap, 16) };
    unsafe { heap.free(a) };
    heap.audit();

    // 64 - 16 leaves exactly the threshold residue: no split
    let b = unsafe { alloc(&mut heap, 16) };
    assert_eq!(unsafe { usable_size(b) }, 64);

    // an exact fit re-uses the block byte for byte
    unsafe { heap.free(b) };
    let c = unsafe { alloc(&mut heap, 64) };
    assert_eq!(c, b);
    assert_eq!(unsafe { usable_size(c) }, 64);
    heap.audit();
}

#[test]
fn freed_neighbors_coalesce_across_both_sides() {
    let mut heap = heap();

    let a = unsafe { alloc(&mut heap, 16) };
    let b = unsafe { alloc(&mut heap, 16) };
    let c = unsafe { alloc(&mut heap, 16) };
    let _guard = unsafe { alloc(&mut heap, 16) };
    let tail = FIRST_ARENA_PAYLOAD - 4 * (16 + H);

    unsafe { heap.free(a) };
    heap.audit();
    unsafe { heap.free(c) };
    heap.audit();

    // freeing the middle block merges all three into one
    unsafe { heap.free(b) };
    assert_eq!(free_sizes(&heap), [3 * 16 + 2 * H, tail]);
    heap.audit();
}

#[test]
fn freed_block_merges_into_the_tail() {
    let mut heap = heap();

    let p = unsafe { alloc(&mut heap, 104) };
    unsafe { heap.free(p) };

    // the freed block dissolves into the free tail it was carved from
    assert_eq!(free_sizes(&heap), [FIRST_ARENA_PAYLOAD]);
    heap.audit();

    let q = unsafe { alloc(&mut heap, 104) };
    assert_eq!(q, p);
    heap.audit();
}

#[test]
fn alloc_free_round_trip_restores_free_bytes() {
    let mut heap = heap();

    let a = unsafe { alloc(&mut heap, 48) };
    let _b = unsafe { alloc(&mut heap, 24) };
    unsafe { heap.free(a) };
    heap.audit();

    let before = heap.stats();
    let p = unsafe { alloc(&mut heap, 32) };
    unsafe { heap.free(p) };
    let after = heap.stats();

    assert_eq!(before.free_bytes, after.free_bytes);
    assert_eq!(before.arenas_acquired, after.arenas_acquired);
    heap.audit();
}

#[test]
fn contiguous_arena_extends_the_free_tail() {
    let (mut heap, _handle) = heap_with(FitPolicy::FirstFit);

    let p = unsafe { alloc(&mut heap, 3000) };
    assert_eq!(free_sizes(&heap), [FIRST_ARENA_PAYLOAD - 3000 - H]);

    // nothing on the list satisfies this; the next arena is contiguous and
    // dissolves into the free tail, which then serves the request in place
    let q = unsafe { alloc(&mut heap, 6000) };
    assert_eq!(q.as_ptr(), unsafe { p.as_ptr().add(3000 + H) });

    let stats = heap.stats();
    assert_eq!(stats.arenas_acquired, 2);
    assert_eq!(stats.bytes_acquired, 4096 + 8192);
    assert_eq!(free_sizes(&heap), [1032 + 8192 - 6000 - H]);
    heap.audit();
}

#[test]
fn contiguous_arena_behind_an_allocated_tail_reuses_the_fencepost() {
    let mut heap = heap();

    // consume the first arena exactly; the free list goes empty
    let p = unsafe { alloc(&mut heap, FIRST_ARENA_PAYLOAD) };
    assert!(free_sizes(&heap).is_empty());

    // the join dissolves the two inner fenceposts; the old right fencepost
    // becomes the new block's header, so its payload starts exactly at the
    // first arena's former end
    let q = unsafe { alloc(&mut heap, 8) };
    assert_eq!(q.as_ptr(), unsafe { p.as_ptr().add(FIRST_ARENA_PAYLOAD + H) });

    assert_eq!(heap.stats().arenas_acquired, 2);
    assert_eq!(free_sizes(&heap), [4096 - H - 16 - H]);
    heap.audit();
}

#[test]
fn holes_between_arenas_prevent_joining() {
    let (mut heap, handle) = heap_with(FitPolicy::FirstFit);

    let p = unsafe { alloc(&mut heap, FIRST_ARENA_PAYLOAD) };
    handle.skip(16);

    let q = unsafe { alloc(&mut heap, 8) };
    // a fresh arena: left fencepost, then the interior block
    assert_eq!(q.as_ptr(), unsafe { p.as_ptr().add(FIRST_ARENA_PAYLOAD + H + 16 + 2 * H) });
    let q_header = unsafe { Header::from_payload(q.as_ptr()) };
    assert_eq!(unsafe { Header::left_size(q_header) }, 0);

    assert_eq!(free_sizes(&heap), [FIRST_ARENA_PAYLOAD - 16 - H]);
    heap.audit();
}

#[test]
fn refused_arena_surfaces_out_of_memory_and_is_recoverable() {
    let (mut heap, handle) = heap_with(FitPolicy::FirstFit);
    handle.set_limit(4096);

    let _p = unsafe { alloc(&mut heap, 8) };
    let before = free_sizes(&heap);

    assert_eq!(unsafe { heap.alloc(8192) }, Err(HeapError::OutOfMemory));
    assert_eq!(heap.stats().arenas_acquired, 1);
    assert_eq!(free_sizes(&heap), before);
    heap.audit();

    // the failure is the caller's problem, not the heap's
    let r = unsafe { alloc(&mut heap, 16) };
    assert_eq!(unsafe { usable_size(r) }, 16);
    heap.audit();
}

#[test]
fn bootstrap_rejects_degenerate_tunables_and_stays_dormant() {
    let source = SlabSource::new();
    let mut heap = Heap::new(source);

    let bad = HeapConfig {
        min_allocation: 12,
        ..HeapConfig::DEFAULT
    };
    assert!(matches!(heap.bootstrap(bad), Err(HeapError::InvalidConfig(_))));
    assert!(!heap.is_bootstrapped());

    heap.bootstrap(HeapConfig::DEFAULT).unwrap();
    assert!(heap.is_bootstrapped());

    // a second bootstrap is a no-op, not a reconfiguration
    let other = HeapConfig {
        fit: FitPolicy::WorstFit,
        ..HeapConfig::DEFAULT
    };
    heap.bootstrap(other).unwrap();
    assert_eq!(heap.config().fit, FitPolicy::FirstFit);
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_fatal() {
    let mut heap = heap();
    let p = unsafe { alloc(&mut heap, 32) };
    unsafe {
        heap.free(p);
        heap.free(p);
    }
}

#[test]
#[should_panic(expected = "before bootstrap")]
fn dormant_heap_refuses_to_allocate() {
    let mut heap: Heap<SlabSource> = Heap::new(SlabSource::new());
    let _ = unsafe { heap.alloc(8) };
}
