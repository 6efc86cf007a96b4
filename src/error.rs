//! Typed errors surfaced at the safe `Heap` API boundary.
//!
//! The unsafe core underneath (`placement`, `reclaim`) still speaks in the
//! sentinel values the algorithm was designed around — null pointers,
//! footer `-1` — but `Heap`'s public methods translate those into ordinary
//! `Result`s, the way `kernel-alloc::vmm::VmmError` does for this pack's
//! other allocator crate.

use thiserror::Error;

/// Failure mode for [`crate::Heap::allocate`] and [`crate::Heap::reallocate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeapError {
  /// The backing region could not grow enough to satisfy the request.
  #[error("region exhausted: requested {requested} more bytes, only {available} left of {capacity} reserved")]
  RegionExhausted { requested: usize, available: usize, capacity: usize },
}

/// Failure mode for [`crate::Heap::consistency_check`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
  /// Walking the region via header sizes did not land exactly on
  /// `region_hi + 1`.
  #[error("heap walk stopped at offset {stopped_at}, expected to land on {expected}")]
  WalkMismatch { stopped_at: usize, expected: usize },
}
