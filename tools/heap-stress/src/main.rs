//! # Allocator workload driver
//!
//! Hammers the process-wide heap with a deterministic xorshift-driven mix
//! of `malloc`/`free`/`realloc`, verifying payload integrity on every
//! release, then prints the heap counters.
//!
//! ```text
//! heap-stress [ops]
//! ```
//!
//! Combine with `BRKHEAP_FIT_ALGORITHM=1..4` to compare how the fit
//! policies fragment under the same workload.

use brkheap::{free, malloc, realloc, stats};
use std::slice;

const SLOTS: usize = 256;
const MAX_SIZE: usize = 512;

struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

fn verify(p: *mut u8, size: usize, tag: u8) {
    // SAFETY: `p` is a live allocation of at least `size` bytes.
    let bytes = unsafe { slice::from_raw_parts(p, size) };
    assert!(bytes.iter().all(|&b| b == tag), "payload corrupted");
}

#[allow(clippy::cast_possible_truncation)]
fn main() {
    let ops: usize = std::env::args()
        .nth(1)
        .map_or(50_000, |arg| arg.parse().expect("op count must be a number"));

    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
    let mut slots: Vec<Option<(*mut u8, usize, u8)>> = vec![None; SLOTS];
    let mut allocations = 0_usize;
    let mut live = 0_usize;
    let mut peak_live = 0_usize;

    for _ in 0..ops {
        let roll = rng.next();
        let slot = (roll as usize >> 8) % SLOTS;
        match slots[slot].take() {
            None => {
                let size = 1 + (roll as usize % MAX_SIZE);
                let tag = (roll >> 32) as u8;
                let p = unsafe { malloc(size) };
                assert!(!p.is_null(), "allocation failed under stress");
                // SAFETY: `p` spans at least `size` bytes.
                unsafe { p.write_bytes(tag, size) };
                slots[slot] = Some((p, size, tag));
                allocations += 1;
                live += 1;
                peak_live = peak_live.max(live);
            }
            Some((p, size, tag)) => {
                verify(p, size, tag);
                if roll & 1 == 0 {
                    // SAFETY: `p` is live and verified.
                    unsafe { free(p) };
                    live -= 1;
                } else {
                    let new_size = 1 + ((roll >> 16) as usize % MAX_SIZE);
                    // SAFETY: `p` is live; `realloc` consumes it on success.
                    let q = unsafe { realloc(p, new_size) };
                    assert!(!q.is_null(), "reallocation failed under stress");
                    verify(q, size.min(new_size), tag);
                    // SAFETY: `q` spans at least `new_size` bytes.
                    unsafe { q.write_bytes(tag, new_size) };
                    slots[slot] = Some((q, new_size, tag));
                }
            }
        }
    }

    for slot in &mut slots {
        if let Some((p, size, tag)) = slot.take() {
            verify(p, size, tag);
            // SAFETY: `p` is live and verified.
            unsafe { free(p) };
        }
    }

    let snapshot = stats();
    println!("ops:             {ops}");
    println!("allocations:     {allocations}");
    println!("peak live:       {peak_live}");
    println!("arenas acquired: {}", snapshot.arenas_acquired);
    println!("bytes acquired:  {}", snapshot.bytes_acquired);
    println!("free blocks:     {}", snapshot.free_blocks);
    println!("free bytes:      {}", snapshot.free_bytes);
}
