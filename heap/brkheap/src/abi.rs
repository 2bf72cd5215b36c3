//! # Unmangled C entry points
//!
//! Exports the four allocation functions under their POSIX names so the
//! cdylib can replace a process's allocator via `LD_PRELOAD`. Gated behind
//! the `abi` feature and off by default: a test binary exporting `malloc`
//! would shadow the system allocator for its own harness, and every
//! allocation the harness makes would recurse into the code under test.
//!
//! Panics raised below (double free, fatal misconfiguration) abort at the
//! `extern "C"` boundary, which is the contract for client invariant
//! violations.

use core::ffi::c_void;

/// POSIX `malloc`.
///
/// # Safety
/// The C `malloc` contract: the result must be freed exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: usize) -> *mut c_void {
    unsafe { crate::malloc(size).cast() }
}

/// POSIX `free`.
///
/// # Safety
/// The C `free` contract: null or a live pointer from this allocator.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut c_void) {
    unsafe { crate::free(ptr.cast()) }
}

/// POSIX `calloc`.
///
/// # Safety
/// The C `calloc` contract: the result must be freed exactly once.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(count: usize, size: usize) -> *mut c_void {
    unsafe { crate::calloc(count, size).cast() }
}

/// POSIX `realloc`.
///
/// # Safety
/// The C `realloc` contract: `ptr` is null or live, and is invalid after a
/// successful call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    unsafe { crate::realloc(ptr.cast(), size).cast() }
}
