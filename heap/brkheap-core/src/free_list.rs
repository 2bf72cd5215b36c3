//! # Intrusive free list
//!
//! The process-wide list of unallocated blocks, threaded through the link
//! overlay of their headers. Insertion is at the head, removal is O(1)
//! given a node, and no ordering relation is maintained — the fit policies
//! decide which node to take, not the list.

use crate::header::Header;
use core::ptr::null_mut;

/// Doubly-linked list of `Unallocated` headers.
///
/// The list does not own the blocks; it only threads through headers that
/// live in arena memory. Callers must only hand it headers whose state is
/// `Unallocated` and must not remove a header that is not on the list.
pub struct FreeList {
    head: *mut Header,
}

impl FreeList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { head: null_mut() }
    }

    /// Head of the list, or null when no free space is cached.
    #[inline]
    #[must_use]
    pub const fn head(&self) -> *mut Header {
        self.head
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Prepends `h`.
    ///
    /// # Safety
    /// `h` must be a stamped `Unallocated` header that is not already on
    /// the list.
    pub unsafe fn push_front(&mut self, h: *mut Header) {
        unsafe {
            Header::set_prev(h, null_mut());
            Header::set_next(h, self.head);
            if !self.head.is_null() {
                Header::set_prev(self.head, h);
            }
        }
        self.head = h;
    }

    /// Unlinks `h`.
    ///
    /// # Safety
    /// `h` must currently be on the list.
    pub unsafe fn remove(&mut self, h: *mut Header) {
        unsafe {
            let next = Header::next(h);
            let prev = Header::prev(h);
            if prev.is_null() {
                debug_assert_eq!(self.head, h, "unlinking a node that is not listed");
                self.head = next;
            } else {
                Header::set_next(prev, next);
            }
            if !next.is_null() {
                Header::set_prev(next, prev);
            }
        }
    }

    /// Hands `old`'s list position to `new` without touching list order.
    ///
    /// Used when a freed block swallows its right neighbor: the merged
    /// block keeps the neighbor's place in the list.
    ///
    /// # Safety
    /// `old` must be on the list; `new` must be a stamped header that is
    /// not.
    pub unsafe fn replace(&mut self, old: *mut Header, new: *mut Header) {
        unsafe {
            let next = Header::next(old);
            let prev = Header::prev(old);
            Header::set_next(new, next);
            Header::set_prev(new, prev);
            if prev.is_null() {
                debug_assert_eq!(self.head, old, "replacing a node that is not listed");
                self.head = new;
            } else {
                Header::set_next(prev, new);
            }
            if !next.is_null() {
                Header::set_prev(next, new);
            }
        }
    }

    /// Walks the list front to back.
    pub fn iter(&self) -> Iter {
        Iter { cur: self.head }
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw iterator over list nodes.
pub struct Iter {
    cur: *mut Header,
}

impl Iterator for Iter {
    type Item = *mut Header;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        let h = self.cur;
        // Safety: `h` is a listed node, so its link overlay is live.
        self.cur = unsafe { Header::next(h) };
        Some(h)
    }
}
