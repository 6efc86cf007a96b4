//! The placement engine: `Heap::allocate`.
//!
//! ```text
//!   best_fit(aligned)
//!     found  -> maybe split -> Ok(user ptr)
//!     miss, aligned <= PERFECT_SIZE -> batch-extend region, retry once
//!     miss, last block free        -> extend the trailing block in place
//!     miss, otherwise               -> extend a fresh block at the tail
//! ```

use std::ptr::NonNull;

use crate::bins;
use crate::block;
use crate::error::HeapError;
use crate::heap::{Heap, PERFECT_SIZE};

impl Heap {
  /// Reserves `request` bytes and returns a user pointer to them.
  ///
  /// Tries a same-or-larger free block first (best-fit within the lowest
  /// non-empty bin that can hold the request); splits it when the leftover
  /// is at least [`block::MIN_BLOCK`]. On a miss, grows the region — in
  /// [`PERFECT_SIZE`]-byte batches for requests that size or smaller, in
  /// place when the rightmost block happens to be free, or by exactly the
  /// rounded request size otherwise.
  ///
  /// # Errors
  /// Returns [`HeapError::RegionExhausted`] if the region cannot grow enough
  /// to satisfy the request; no bin or region state is changed on failure.
  pub fn allocate(&mut self, request: usize) -> Result<NonNull<u8>, HeapError> {
    let aligned = Heap::rounded_block_size(request);
    self.allocate_aligned(aligned)
  }

  fn allocate_aligned(&mut self, aligned: usize) -> Result<NonNull<u8>, HeapError> {
    if let Some((b, old_size)) = self.best_fit(aligned) {
      unsafe { self.bins.remove(b, old_size) };
      let delta = old_size - aligned;
      if delta >= block::MIN_BLOCK {
        unsafe { block::init_allocated(b, aligned) };
        let trailing = unsafe { NonNull::new_unchecked((b.as_ptr() as usize + aligned) as *mut u8) };
        unsafe { block::write_size(trailing, delta) };
        self.free_block(trailing);
        log::debug!(
          "placement: served {aligned} bytes from {old_size}-byte block at {:p}, split off {delta} trailing bytes",
          b.as_ptr()
        );
      } else {
        log::debug!("placement: served {aligned} bytes from {old_size}-byte block at {:p} (no split)", b.as_ptr());
      }
      return Ok(b);
    }

    if aligned <= PERFECT_SIZE {
      return self.extend_by_perfect_and_retry(aligned);
    }

    if let Some(last) = self.last {
      let last_size = unsafe { block::size_of_block(last) };
      if unsafe { block::is_free(last, last_size) } {
        return self.extend_trailing_block(last, last_size, aligned);
      }
    }

    self.extend_fresh_block(aligned)
  }

  /// Scans bins from `bin_index(aligned)` upward for the smallest free block
  /// that still fits, stopping a bin's scan early once a block of exactly
  /// `2^k` is found (the theoretical minimum size for that bin, so nothing
  /// smaller can turn up later in the same chain).
  ///
  /// This is best-fit *within a bin*, not across the whole free-list set: a
  /// higher bin's smallest block is never compared against a lower bin's
  /// largest, trading a perfect best-fit for an O(bin population) scan.
  fn best_fit(&self, aligned: usize) -> Option<(NonNull<u8>, usize)> {
    let start = bins::bin_index(aligned);
    for k in start..bins::NUM_BINS {
      if self.bins.head(k).is_none() {
        continue;
      }
      let mut best: Option<(NonNull<u8>, usize)> = None;
      // Safety: every block in bin k is a resident, intact free block.
      for node in unsafe { self.bins.iter_bin(k) } {
        let sz = unsafe { block::size_of_block(node) };
        if sz < aligned {
          continue;
        }
        let is_smaller = match best {
          Some((_, best_sz)) => sz < best_sz,
          None => true,
        };
        if is_smaller {
          best = Some((node, sz));
        }
        if sz == (1usize << k) {
          break;
        }
      }
      if best.is_some() {
        return best;
      }
    }
    None
  }

  fn extend_by_perfect_and_retry(&mut self, aligned: usize) -> Result<NonNull<u8>, HeapError> {
    match self.region.region_extend(PERFECT_SIZE) {
      None => Err(self.region_exhausted_error(PERFECT_SIZE)),
      Some(block_start) => {
        let user = unsafe { NonNull::new_unchecked(block_start.as_ptr().add(block::HEADER_SIZE)) };
        unsafe { block::write_size(user, PERFECT_SIZE) };
        log::debug!("placement: batch-extended region by {PERFECT_SIZE} bytes at {:p}", user.as_ptr());
        self.free_block(user);
        self.allocate_aligned(aligned)
      }
    }
  }

  fn extend_trailing_block(&mut self, last: NonNull<u8>, last_size: usize, aligned: usize) -> Result<NonNull<u8>, HeapError> {
    let shortfall = aligned - last_size;
    unsafe { self.bins.remove(last, last_size) };
    match self.region.region_extend(shortfall) {
      None => {
        unsafe { self.bins.insert(last, last_size) };
        Err(self.region_exhausted_error(shortfall))
      }
      Some(_) => {
        unsafe { block::init_allocated(last, aligned) };
        log::debug!("placement: grew trailing block at {:p} from {last_size} to {aligned} bytes", last.as_ptr());
        Ok(last)
      }
    }
  }

  fn extend_fresh_block(&mut self, aligned: usize) -> Result<NonNull<u8>, HeapError> {
    match self.region.region_extend(aligned) {
      None => Err(self.region_exhausted_error(aligned)),
      Some(block_start) => {
        let user = unsafe { NonNull::new_unchecked(block_start.as_ptr().add(block::HEADER_SIZE)) };
        unsafe { block::init_allocated(user, aligned) };
        self.last = Some(user);
        log::debug!("placement: extended a fresh {aligned}-byte block at {:p}", user.as_ptr());
        Ok(user)
      }
    }
  }

  pub(crate) fn region_exhausted_error(&self, requested: usize) -> HeapError {
    HeapError::RegionExhausted {
      requested,
      available: self.region.capacity() - self.region.region_size(),
      capacity: self.region.capacity(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn allocate_returns_distinct_non_overlapping_pointers() {
    let mut heap = Heap::new(1 << 16);
    let a = heap.allocate(16).unwrap();
    let b = heap.allocate(16).unwrap();
    assert_ne!(a, b);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn allocate_reuses_freed_block_of_exact_size() {
    let mut heap = Heap::new(1 << 16);
    let a = heap.allocate(40).unwrap();
    heap.release(a);
    let b = heap.allocate(40).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn allocate_splits_oversized_free_block() {
    let mut heap = Heap::new(1 << 16);
    let big = heap.allocate(500).unwrap();
    heap.release(big);
    let small = heap.allocate(16).unwrap();
    assert_eq!(small, big);
    // The split trailing remainder should still be usable.
    let rest = heap.allocate(400).unwrap();
    assert_ne!(rest, small);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn allocate_grows_region_past_capacity_returns_error() {
    let mut heap = Heap::new(128);
    let err = heap.allocate(1 << 20).unwrap_err();
    matches!(err, HeapError::RegionExhausted { .. });
  }
}
