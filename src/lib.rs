//! # segheap - A Segregated Free-List Memory Allocator
//!
//! This crate provides a **segregated free-list allocator** with boundary-tag
//! coalescing: a small step up from a bump allocator that actually reuses
//! freed memory, trading a little bookkeeping overhead for real deallocation.
//!
//! ## Overview
//!
//! Every live byte managed by a [`Heap`] belongs to exactly one block, tagged
//! on both ends:
//!
//! ```text
//!   Block Layout:
//!
//!   ┌────────┬──────────────────────────────────────────┬────────┐
//!   │ header │             payload / links              │ footer │
//!   │  4 B   │                                           │  4 B   │
//!   └────────┴──────────────────────────────────────────┴────────┘
//!            ▲
//!            └── user pointer (what allocate() returns)
//!
//!   header: total block size (header + payload + footer)
//!   footer: "free tag" - positive (== size) when free, -1 when allocated
//! ```
//!
//! Free blocks are indexed by size class into 27 bins (bin *k* holds
//! `[2^k, 2^(k+1))`), each an intrusive doubly-linked LIFO chain living
//! inside the free block's own payload:
//!
//! ```text
//!   Free-List Set:
//!
//!   bin 0   [1,2)     -> (empty)
//!   bin 5   [32,64)   -> [block] <-> [block] <-> [block]
//!   bin 12  [4096,8192) -> [block]
//!   ...
//!   bin 26  [2^26,2^27) -> (empty)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segheap
//!   ├── align      - Alignment helpers (align!, align_up)
//!   ├── block      - Block layout primitives (internal, unsafe core)
//!   ├── bins       - Size-class index and segregated free-list set
//!   ├── region     - Monotone, sbrk-like backing byte store
//!   ├── error      - Typed errors at the safe API boundary
//!   ├── heap       - The Heap type: construction, consistency_check
//!   ├── placement  - Heap::allocate (best-fit + region growth)
//!   └── reclaim    - Heap::release, Heap::reallocate, coalescing
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use segheap::Heap;
//!
//! let mut heap = Heap::new(1 << 20);
//! let p = heap.allocate(64).expect("region has room");
//! unsafe {
//!     *p.as_ptr() = 42;
//! }
//! heap.release(p);
//! assert!(heap.consistency_check().is_ok());
//! ```
//!
//! ## How It Works
//!
//! [`Heap::allocate`] looks for a same-or-larger free block by best-fit
//! within a single bin before ever growing the backing region; [`Heap::release`]
//! folds a freed block into whichever free neighbor borders it, so adjacent
//! free space never fragments into two separate bin entries. A `last`
//! pointer tracks the rightmost managed block, which lets both operations
//! take a fast path that extends the tail in place instead of carving out a
//! brand new block.
//!
//! ## Features
//!
//! - **Real deallocation**: freed blocks are reused, not just abandoned
//! - **Boundary-tag coalescing**: adjacent free blocks merge in O(1)
//! - **Segregated best-fit**: bounded scan cost, not a full best-fit search
//! - **Independent heaps**: each [`Heap`] owns its own region; no process-wide
//!   singleton, so more than one can run side by side
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Fixed region capacity**: a [`Heap`] never grows past what it was
//!   constructed with
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! The unsafe core is concentrated in [`block`] and [`bins`]; [`Heap`]'s
//! public methods are safe to call and return typed [`error::HeapError`]s
//! instead of sentinel values.

pub mod align;
mod bins;
mod block;
pub mod error;
mod heap;
mod placement;
mod reclaim;
mod region;

pub use error::{ConsistencyError, HeapError};
pub use heap::Heap;
