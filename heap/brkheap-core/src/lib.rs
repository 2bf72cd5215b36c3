//! # Boundary-Tag Heap Engine
//!
//! This crate implements the block layout and free-list algebra of a
//! general-purpose heap allocator: variably sized blocks carved out of a
//! few large OS-obtained arenas, threaded through an intrusive doubly
//! linked free list, split on allocation and coalesced on free.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Heap Engine                      │
//! │    • request normalization and arena growth         │
//! │    • split-on-allocate / coalesce-on-free           │
//! │    • next-fit cursor discipline                     │
//! └───────┬─────────────────┬───────────────────┬───────┘
//!         │                 │                   │
//! ┌───────▼───────┐ ┌───────▼────────┐ ┌────────▼───────┐
//! │  Fit Policies │ │   Free List    │ │  Arena Source  │
//! │  first/next/  │ │  intrusive,    │ │  OS seam with  │
//! │  best/worst   │ │  head-inserted │ │  fencepost     │
//! │               │ │                │ │  bracketing    │
//! └───────────────┘ └───────┬────────┘ └────────────────┘
//!                           │
//!                   ┌───────▼────────┐
//!                   │ Block Headers  │
//!                   │ boundary tags, │
//!                   │ state bits,    │
//!                   │ link overlay   │
//!                   └────────────────┘
//! ```
//!
//! Every block begins with an in-band [`header::Header`] that encodes its
//! size, its allocation state and its left neighbor's size, making both
//! neighbors reachable in constant time. An arena is bracketed by two
//! fencepost headers; a follow-up arena that begins exactly where the last
//! one ended is joined to it by dissolving the fenceposts in between.
//!
//! ## Concurrency
//!
//! The engine itself is single-threaded by construction: every method
//! takes `&mut self`, and the owning crate is expected to serialize calls
//! behind one process-wide mutex. [`Heap`] is `Send` so it can live inside
//! that mutex as a `static`.
//!
//! ## Logging
//!
//! Arena growth and out-of-memory are reported through `log` at `debug!`
//! and `warn!` level. A program hosting this allocator as its malloc must
//! only install a logger that does not allocate through it, or the logging
//! call would re-enter the heap.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod arena;
pub mod config;
pub mod free_list;
pub mod header;
pub mod heap;
mod policy;

pub use arena::ArenaSource;
pub use config::{DEFAULT_ARENA_SIZE, DEFAULT_MIN_ALLOCATION, FitPolicy, HeapConfig};
pub use header::{BlockState, HEADER_OVERHEAD, Header, MIN_PAYLOAD};
pub use heap::{Heap, HeapError, HeapStats, usable_size};
