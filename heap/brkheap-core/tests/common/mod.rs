//! Shared test fixtures: a slab-backed arena source with deterministic
//! contiguity, plus heap constructors for each fit policy.

use brkheap_core::{ArenaSource, FitPolicy, Heap, HeapConfig};
use core::ptr::NonNull;
use std::cell::RefCell;
use std::rc::Rc;

pub const SLAB_CAPACITY: usize = 64 * 1024;

#[repr(align(4096))]
struct Slab([u8; SLAB_CAPACITY]);

struct SlabState {
    base: *mut u8,
    offset: usize,
    limit: usize,
}

/// Hands out consecutive chunks of one leaked, page-aligned slab.
///
/// Consecutive requests are contiguous by construction, which makes the
/// arena-join paths reproducible; [`skip`](SlabSource::skip) punches a hole
/// to force the discontiguous path, and [`set_limit`](SlabSource::set_limit)
/// makes the source start refusing. Cloning yields a handle to the same
/// slab so a test can keep steering the source after the heap takes it.
#[derive(Clone)]
pub struct SlabSource {
    state: Rc<RefCell<SlabState>>,
}

#[allow(dead_code)]
impl SlabSource {
    pub fn new() -> Self {
        // Leaked on purpose: arena memory must outlive every test assertion,
        // and the allocator never returns memory anyway.
        let base = Box::leak(Box::new(Slab([0; SLAB_CAPACITY]))).0.as_mut_ptr();
        Self {
            state: Rc::new(RefCell::new(SlabState {
                base,
                offset: 0,
                limit: SLAB_CAPACITY,
            })),
        }
    }

    /// Leaves a hole so the next arena is not contiguous with the last.
    pub fn skip(&self, bytes: usize) {
        self.state.borrow_mut().offset += bytes;
    }

    /// Caps the bytes the source will hand out in total.
    pub fn set_limit(&self, bytes: usize) {
        self.state.borrow_mut().limit = bytes;
    }
}

impl ArenaSource for SlabSource {
    fn base(&mut self) -> *mut u8 {
        let state = self.state.borrow();
        // SAFETY: offset stays within the leaked slab.
        unsafe { state.base.add(state.offset) }
    }

    fn request_arena(&mut self, size: usize) -> Option<NonNull<u8>> {
        let mut state = self.state.borrow_mut();
        let end = state.offset.checked_add(size)?;
        if end > state.limit {
            return None;
        }
        // SAFETY: the checked range lies within the leaked slab.
        let p = unsafe { state.base.add(state.offset) };
        state.offset = end;
        NonNull::new(p)
    }
}

/// A bootstrapped heap over a fresh slab, with a handle to steer the slab.
#[allow(dead_code)]
pub fn heap_with(fit: FitPolicy) -> (Heap<SlabSource>, SlabSource) {
    let source = SlabSource::new();
    let handle = source.clone();
    let mut heap = Heap::new(source);
    heap.bootstrap(HeapConfig {
        fit,
        ..HeapConfig::DEFAULT
    })
    .expect("default-derived config must validate");
    (heap, handle)
}

/// A bootstrapped first-fit heap over a fresh slab.
#[allow(dead_code)]
pub fn heap() -> Heap<SlabSource> {
    heap_with(FitPolicy::FirstFit).0
}
