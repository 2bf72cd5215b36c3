//! # Block-selection policies
//!
//! Four strategies for picking a free block, selected once at boot. They
//! differ only in how they walk the free list; none of them mutates it.
//! The next-fit cursor is advanced by the allocation itself and patched by
//! coalescing, so the scan here treats it as read-only state.

use crate::config::FitPolicy;
use crate::header::Header;
use crate::heap::Heap;
use core::ptr::null_mut;

impl<S> Heap<S> {
    /// Picks a free block with `true_size >= size` under the configured
    /// policy, or null when the list holds nothing suitable.
    pub(crate) fn find_block(&self, size: usize) -> *mut Header {
        if self.free_list.is_empty() {
            return null_mut();
        }
        match self.config.fit {
            FitPolicy::FirstFit => self.first_fit(size),
            FitPolicy::NextFit => self.next_fit(size),
            FitPolicy::BestFit => self.best_fit(size),
            FitPolicy::WorstFit => self.worst_fit(size),
        }
    }

    /// First satisfying block from the head.
    fn first_fit(&self, size: usize) -> *mut Header {
        for h in self.free_list.iter() {
            // Safety: listed nodes are stamped headers in live arenas.
            if unsafe { Header::true_size(h) } >= size {
                return h;
            }
        }
        null_mut()
    }

    /// First satisfying block from the cursor, wrapping past the tail at
    /// most once; null when the scan comes back around empty-handed.
    fn next_fit(&self, size: usize) -> *mut Header {
        let start = if self.next_allocate.is_null() {
            self.free_list.head()
        } else {
            self.next_allocate
        };
        let mut cur = start;
        loop {
            // Safety: the cursor and the list both reference live nodes.
            unsafe {
                if Header::true_size(cur) >= size {
                    return cur;
                }
                let mut next = Header::next(cur);
                if next.is_null() {
                    next = self.free_list.head();
                }
                if next == start {
                    return null_mut();
                }
                cur = next;
            }
        }
    }

    /// Smallest satisfying block; the first encountered wins ties.
    fn best_fit(&self, size: usize) -> *mut Header {
        let mut best = null_mut();
        let mut best_size = usize::MAX;
        for h in self.free_list.iter() {
            // Safety: listed nodes are stamped headers in live arenas.
            let t = unsafe { Header::true_size(h) };
            if t >= size && t < best_size {
                best = h;
                best_size = t;
            }
        }
        best
    }

    /// Largest satisfying block; the last encountered wins ties.
    fn worst_fit(&self, size: usize) -> *mut Header {
        let mut worst: *mut Header = null_mut();
        let mut worst_size = 0;
        for h in self.free_list.iter() {
            // Safety: listed nodes are stamped headers in live arenas.
            let t = unsafe { Header::true_size(h) };
            if t >= size && (worst.is_null() || t >= worst_size) {
                worst = h;
                worst_size = t;
            }
        }
        worst
    }
}
