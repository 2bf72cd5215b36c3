//! # brkheap — a boundary-tag heap allocator over the program break
//!
//! The classic `malloc` shape: variable-sized blocks carved out of
//! `sbrk`-obtained arenas, an intrusive free list with four selectable fit
//! policies, splitting on allocation and coalescing on free. This crate is
//! the process-facing surface; the block algebra lives in `brkheap-core`
//! and the locking in `brkheap-sync`.
//!
//! ## Surface
//!
//! [`malloc`], [`free`], [`calloc`] and [`realloc`] mirror their POSIX
//! namesakes over one process-wide heap. Every call is serialized by a
//! single allocation-free spin lock; operations appear in lock-acquisition
//! order. With the `abi` cargo feature the same four functions are also
//! exported unmangled for `LD_PRELOAD` use.
//!
//! ## Boot-time configuration
//!
//! The heap initializes itself on first use. Three environment variables
//! are consulted once, read with `getenv` so that initialization never
//! allocates:
//!
//! | variable                 | meaning                          | default |
//! |--------------------------|----------------------------------|---------|
//! | `BRKHEAP_FIT_ALGORITHM`  | 1 first, 2 next, 3 best, 4 worst | 1       |
//! | `BRKHEAP_ARENA_SIZE`     | OS growth quantum in bytes       | 4096    |
//! | `BRKHEAP_MIN_ALLOCATION` | payload granularity in bytes     | 8       |
//!
//! An unknown fit selector or an unusable size is a fatal error: the heap
//! would otherwise run with bookkeeping it cannot trust.
//!
//! ## Reentrancy
//!
//! Nothing in here calls back into the heap while the lock is held, and
//! diagnostic output goes through `log` only. A program hosting this
//! allocator as its real `malloc` must not install a logger that
//! allocates through it.

mod brk;

#[cfg(feature = "abi")]
mod abi;

pub use brk::BrkSource;
pub use brkheap_core::{FitPolicy, HeapConfig, HeapStats};

use brkheap_core::{Heap, HeapError, usable_size};
use brkheap_sync::HeapLock;
use core::ffi::CStr;
use core::ptr::{self, NonNull, null_mut};
use core::sync::atomic::{AtomicBool, Ordering};

/// The process-wide heap. All block state lives behind this lock.
static HEAP: HeapLock<Heap<BrkSource>> = HeapLock::new(Heap::new(BrkSource::new()));

/// Fast-path flag so initialized calls skip the bootstrap branch.
static DID_INIT: AtomicBool = AtomicBool::new(false);

/// Bootstraps the heap exactly once, before the first operation touches it.
///
/// Explicit lazy init rather than a pre-main constructor: every public
/// entry point runs it, and the bootstrap itself is idempotent under the
/// lock, so races on the flag are harmless.
fn ensure_init() {
    if !DID_INIT.load(Ordering::Acquire) {
        let config = config_from_env();
        HEAP.with_lock(|heap| {
            if !heap.is_bootstrapped() {
                heap.bootstrap(config)
                    .expect("invalid boot-time heap configuration");
            }
            DID_INIT.store(true, Ordering::Release);
        });
    }
}

/// Assembles the boot-time configuration from the environment.
///
/// # Panics
/// On an unknown fit selector or a non-numeric value; running with a
/// misread configuration would be worse than not starting.
fn config_from_env() -> HeapConfig {
    let mut config = HeapConfig::default();
    if let Some(raw) = env_usize(c"BRKHEAP_FIT_ALGORITHM") {
        config.fit = FitPolicy::from_selector(raw)
            .expect("BRKHEAP_FIT_ALGORITHM must be 1 (first), 2 (next), 3 (best) or 4 (worst)");
    }
    if let Some(raw) = env_usize(c"BRKHEAP_ARENA_SIZE") {
        config.arena_size = raw;
    }
    if let Some(raw) = env_usize(c"BRKHEAP_MIN_ALLOCATION") {
        config.min_allocation = raw;
    }
    config
}

/// Reads a decimal environment value without allocating.
///
/// `getenv` rather than `std::env`, which builds owned strings through the
/// process allocator — a hazard when this crate *is* that allocator.
fn env_usize(name: &CStr) -> Option<usize> {
    // SAFETY: `name` is NUL-terminated and getenv returns null or a C string.
    let raw = unsafe { libc::getenv(name.as_ptr()) };
    if raw.is_null() {
        return None;
    }
    // SAFETY: a non-null getenv result is a valid NUL-terminated string.
    let bytes = unsafe { CStr::from_ptr(raw) }.to_bytes();
    assert!(!bytes.is_empty(), "empty value in heap configuration variable");
    let mut value = 0_usize;
    for &b in bytes {
        let digit = b.checked_sub(b'0').filter(|d| *d < 10);
        let digit = digit.expect("non-numeric value in heap configuration variable");
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(usize::from(digit)))
            .expect("oversized value in heap configuration variable");
    }
    Some(value)
}

/// Stores the out-of-memory indicator for the calling thread.
fn set_oom_errno() {
    #[cfg(target_os = "linux")]
    // SAFETY: __errno_location returns the calling thread's errno slot.
    unsafe {
        *libc::__errno_location() = libc::ENOMEM;
    }
}

/// Allocates `size` bytes and returns the payload pointer.
///
/// Returns null for a zero-size request, and null with `errno` set to
/// `ENOMEM` when the OS refuses to grow the heap.
///
/// # Safety
/// The returned pointer must be released through [`free`] (or [`realloc`])
/// of this crate, exactly once.
pub unsafe fn malloc(size: usize) -> *mut u8 {
    ensure_init();
    // SAFETY: the lock serializes the heap; payloads stay untouched here.
    match HEAP.with_lock(|heap| unsafe { heap.alloc(size) }) {
        Ok(payload) => payload.as_ptr(),
        Err(HeapError::OutOfMemory) => {
            set_oom_errno();
            null_mut()
        }
        Err(_) => null_mut(),
    }
}

/// Releases a payload previously returned by [`malloc`], [`calloc`] or
/// [`realloc`]. A null pointer is a no-op.
///
/// # Safety
/// `ptr` must be null or a live payload from this allocator; freeing it
/// twice or freeing a foreign pointer aborts the process.
pub unsafe fn free(ptr: *mut u8) {
    let Some(payload) = NonNull::new(ptr) else {
        return;
    };
    ensure_init();
    // SAFETY: the lock serializes the heap; the caller vouches for `ptr`.
    HEAP.with_lock(|heap| unsafe { heap.free(payload) });
}

/// Allocates zero-filled storage for `count` elements of `size` bytes.
///
/// Returns null when the element count overflows or allocation fails;
/// zeroing happens only on success.
///
/// # Safety
/// As [`malloc`].
pub unsafe fn calloc(count: usize, size: usize) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
        set_oom_errno();
        return null_mut();
    };
    let payload = unsafe { malloc(total) };
    if !payload.is_null() {
        // SAFETY: a non-null payload spans at least `total` bytes.
        unsafe { ptr::write_bytes(payload, 0, total) };
    }
    payload
}

/// Moves a payload to a block of `size` bytes, copying the overlapping
/// prefix. Null `ptr` behaves as [`malloc`]; on failure the old block is
/// left untouched and null is returned.
///
/// # Safety
/// As [`free`] for `ptr` and [`malloc`] for the result. On success the old
/// pointer is gone and must not be used again.
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    if ptr.is_null() {
        return unsafe { malloc(size) };
    }
    let new = unsafe { malloc(size) };
    if new.is_null() {
        return null_mut();
    }
    // The stored block size bounds the copy: the original request can only
    // have been smaller. Reading it unlocked is fine — an allocated block's
    // size word is never written while its owner holds the payload.
    // SAFETY: the caller vouches that `ptr` is a live payload.
    let old_size = unsafe { usable_size(NonNull::new_unchecked(ptr)) };
    // SAFETY: both blocks are live and at least `min(size, old_size)` long.
    unsafe {
        ptr::copy_nonoverlapping(ptr, new, size.min(old_size));
        free(ptr);
    }
    new
}

/// Snapshot of the process heap's free list and acquisition counters.
#[must_use]
pub fn stats() -> HeapStats {
    ensure_init();
    HEAP.with_lock(|heap| heap.stats())
}
