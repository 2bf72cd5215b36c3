//! # Allocator serialization
//!
//! A heap allocator cannot serialize itself through a lock that allocates:
//! the standard library's mutex may take the very allocator it is supposed
//! to protect, and a parked-thread mutex builds its wait queues on the
//! heap. This crate provides the one primitive the allocator needs
//! instead: [`HeapLock`], a closure-scoped spin lock.
//!
//! Every heap operation has the same shape — acquire, one critical
//! section, release — so the closure *is* the API. There are no guards to
//! store or leak, no poisoning, and nothing to configure: contended
//! waiters back off in growing bursts, and unwinding out of a critical
//! section releases the lock on the way through.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering};

/// Lock word states.
const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// Longest backoff burst between acquisition attempts, in spin hints.
const SPIN_LIMIT: u32 = 64;

/// A closure-scoped spin lock for the process-wide heap state.
///
/// The critical section is the closure passed to
/// [`with_lock`](Self::with_lock); exclusive access cannot outlive it.
/// Construction is `const`, so the guarded heap can live in a plain
/// `static`.
///
/// The lock is **not reentrant**: taking it again from inside a critical
/// section deadlocks. The allocator never calls itself while holding the
/// lock, and [`try_with_lock`](Self::try_with_lock) lets diagnostics probe
/// for exactly that mistake.
///
/// # Examples
///
/// ```
/// use brkheap_sync::HeapLock;
///
/// static BYTES_HANDED_OUT: HeapLock<usize> = HeapLock::new(0);
///
/// let total = BYTES_HANDED_OUT.with_lock(|total| {
///     *total += 4096;
///     *total
/// });
/// assert_eq!(total, 4096);
/// ```
pub struct HeapLock<T> {
    /// [`UNLOCKED`] or [`LOCKED`].
    word: AtomicU32,
    /// The guarded state.
    value: UnsafeCell<T>,
}

// Safety: the lock word enforces exclusive access to the value; sharing the
// lock across threads is sound whenever the value itself may move between
// them.
unsafe impl<T: Send> Sync for HeapLock<T> {}

impl<T> HeapLock<T> {
    /// Creates the lock, released, around `value`.
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self {
            word: AtomicU32::new(UNLOCKED),
            value: UnsafeCell::new(value),
        }
    }

    /// Runs `f` with exclusive access to the guarded value.
    ///
    /// Spins until the lock is won; keep critical sections short. A panic
    /// in `f` releases the lock while unwinding, so a poisoned heap does
    /// not also wedge every other thread on the word.
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        self.acquire();
        let _release = Release(&self.word);
        // SAFETY: the lock word was won above; no other access can exist
        // until `_release` drops.
        f(unsafe { &mut *self.value.get() })
    }

    /// Runs `f` only if the lock can be taken without waiting.
    ///
    /// Returns `None` while the lock is held — including by the calling
    /// thread, which is how a reentrant call shows up.
    pub fn try_with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> Option<U> {
        if self
            .word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        let _release = Release(&self.word);
        // SAFETY: the exchange above won the lock word; no other access can
        // exist until `_release` drops.
        Some(f(unsafe { &mut *self.value.get() }))
    }

    /// Wins the lock word, backing off harder the longer it stays taken.
    ///
    /// Waiters re-read the word with plain loads between attempts and only
    /// retry the exchange once it reads free, keeping the cache line quiet
    /// while the owner works.
    fn acquire(&self) {
        let mut backoff = 1_u32;
        loop {
            if self
                .word
                .compare_exchange_weak(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            while self.word.load(Ordering::Relaxed) == LOCKED {
                for _ in 0..backoff {
                    spin_loop();
                }
                if backoff < SPIN_LIMIT {
                    backoff <<= 1;
                }
            }
        }
    }
}

/// Clears the lock word on drop, so every exit from a critical section —
/// return or unwind — releases the lock.
struct Release<'a>(&'a AtomicU32);

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.0.store(UNLOCKED, Ordering::Release);
    }
}
