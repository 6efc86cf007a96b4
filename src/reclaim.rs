//! The reclamation engine: `Heap::release` and `Heap::reallocate`.
//!
//! Both public entry points eventually hand a block to [`Heap::free_block`],
//! the shared coalescing core also used internally by the placement engine
//! (a split's trailing remainder, a batch region extension) to fold a new
//! free block in next to whatever free neighbor already borders it.

use std::ptr::NonNull;

use crate::block;
use crate::error::HeapError;
use crate::heap::Heap;

impl Heap {
  /// Releases a block previously returned by [`Heap::allocate`] or
  /// [`Heap::reallocate`], coalescing it with any free neighbor on either
  /// side before filing it back into the bins.
  ///
  /// `Option<NonNull<u8>>` input is a C convention this crate doesn't carry
  /// over: a `NonNull<u8>` can't be null, so there's nothing for a
  /// null-tolerant `free(NULL)` to guard against here.
  pub fn release(&mut self, p: NonNull<u8>) {
    // `last` is `None` only for a heap that has never served an allocation,
    // in which case there is no prior block `p` could be "past" — nothing
    // to flag. Once any allocation has gone through, `last` is always
    // `Some` (every allocation path sets it, directly or via `free_block`),
    // so the real anomaly check only applies then.
    debug_assert!(
      self.last.is_none_or(|last| p.as_ptr() as usize <= last.as_ptr() as usize),
      "release() called with a pointer past the heap's last known block"
    );
    self.free_block(p);
  }

  /// Resizes a previously allocated block, preferring in-place growth
  /// (absorbing a free right neighbor, or extending the region when `p` is
  /// the rightmost block) before falling back to allocate-copy-free.
  ///
  /// # Errors
  /// Returns [`HeapError::RegionExhausted`] if growth requires extending the
  /// region and the region cannot grow enough; `p` is left valid and
  /// unchanged in that case.
  pub fn reallocate(&mut self, p: NonNull<u8>, request: usize) -> Result<NonNull<u8>, HeapError> {
    let old = unsafe { block::size_of_block(p) };
    let new = Heap::rounded_block_size(request);

    if old >= new {
      return Ok(self.shrink_in_place(p, old, new));
    }

    if self.last == Some(p) {
      return self.grow_last_block(p, old, new);
    }

    let region_end = self.region_end_exclusive();
    let neighbor_addr = p.as_ptr() as usize + old;
    if neighbor_addr < region_end {
      let q = unsafe { NonNull::new_unchecked(neighbor_addr as *mut u8) };
      let q_size = unsafe { block::size_of_block(q) };
      if unsafe { block::is_free(q, q_size) } {
        if old + q_size >= new {
          return Ok(self.grow_into_neighbor(p, old, q, q_size, new));
        }
        if self.last == Some(q) {
          return self.grow_last_neighbor(p, old, q, q_size, new);
        }
      }
    }

    self.grow_by_copy(p, old, new, request)
  }

  fn shrink_in_place(&mut self, p: NonNull<u8>, old: usize, new: usize) -> NonNull<u8> {
    let delta = old - new;
    if delta < block::MIN_BLOCK {
      return p;
    }
    unsafe { block::init_allocated(p, new) };
    let trailing = unsafe { NonNull::new_unchecked((p.as_ptr() as usize + new) as *mut u8) };
    unsafe { block::write_size(trailing, delta) };
    self.free_block(trailing);
    log::debug!("reclaim: shrank block at {:p} from {old} to {new} bytes", p.as_ptr());
    p
  }

  fn grow_last_block(&mut self, p: NonNull<u8>, old: usize, new: usize) -> Result<NonNull<u8>, HeapError> {
    let shortfall = new - old;
    match self.region.region_extend(shortfall) {
      None => Err(self.region_exhausted_error(shortfall)),
      Some(_) => {
        unsafe { block::init_allocated(p, new) };
        log::debug!("reclaim: grew trailing block at {:p} from {old} to {new} bytes in place", p.as_ptr());
        Ok(p)
      }
    }
  }

  fn grow_into_neighbor(&mut self, p: NonNull<u8>, old: usize, q: NonNull<u8>, q_size: usize, new: usize) -> NonNull<u8> {
    unsafe { self.bins.remove(q, q_size) };
    let was_last = self.last == Some(q);
    let combined = old + q_size;
    let leftover = combined - new;
    if leftover >= block::MIN_BLOCK {
      unsafe { block::init_allocated(p, new) };
      let tail = unsafe { NonNull::new_unchecked((p.as_ptr() as usize + new) as *mut u8) };
      unsafe { self.bins.insert(tail, leftover) };
      if was_last {
        self.last = Some(tail);
      }
    } else {
      unsafe { block::init_allocated(p, combined) };
      if was_last {
        self.last = Some(p);
      }
    }
    log::debug!("reclaim: grew block at {:p} from {old} to {new} bytes by absorbing its right neighbor", p.as_ptr());
    p
  }

  fn grow_last_neighbor(&mut self, p: NonNull<u8>, old: usize, q: NonNull<u8>, q_size: usize, new: usize) -> Result<NonNull<u8>, HeapError> {
    let shortfall = new - (old + q_size);
    unsafe { self.bins.remove(q, q_size) };
    match self.region.region_extend(shortfall) {
      None => {
        unsafe { self.bins.insert(q, q_size) };
        Err(self.region_exhausted_error(shortfall))
      }
      Some(_) => {
        unsafe { block::init_allocated(p, new) };
        self.last = Some(p);
        log::debug!("reclaim: grew block at {:p} by absorbing its free trailing neighbor and extending the region", p.as_ptr());
        Ok(p)
      }
    }
  }

  fn grow_by_copy(&mut self, p: NonNull<u8>, old: usize, new: usize, request: usize) -> Result<NonNull<u8>, HeapError> {
    let fresh = self.allocate(request)?;
    let payload = std::cmp::min(old, new) - block::HEADER_SIZE - block::FOOTER_SIZE;
    // Safety: both `p` and `fresh` are live blocks with at least `payload`
    // usable bytes past their user pointer, and `allocate` never returns a
    // pointer that aliases a still-live block.
    unsafe { std::ptr::copy_nonoverlapping(p.as_ptr(), fresh.as_ptr(), payload) };
    self.free_block(p);
    log::debug!("reclaim: grew block at {:p} to {new} bytes by relocating to {:p}", p.as_ptr(), fresh.as_ptr());
    Ok(fresh)
  }

  /// Coalesces `p` with any free neighbor on either side, updates `last`
  /// when the merged block is now the rightmost one, and files the result
  /// back into the bins. Shared by `release` and the placement engine's
  /// internal frees (a split's trailing remainder, a batch region
  /// extension) — neither of those goes through `release`'s anomaly check,
  /// since they are never client-supplied pointers.
  pub(crate) fn free_block(&mut self, mut p: NonNull<u8>) {
    let mut total = unsafe { block::size_of_block(p) };
    let region_end = self.region_end_exclusive();

    let forward_addr = p.as_ptr() as usize + total;
    if forward_addr < region_end {
      let q = unsafe { NonNull::new_unchecked(forward_addr as *mut u8) };
      let q_size = unsafe { block::size_of_block(q) };
      if unsafe { block::is_free(q, q_size) } {
        unsafe { self.bins.remove(q, q_size) };
        total += q_size;
        log::trace!("reclaim: forward-coalesced {q_size} bytes at {:p}", q.as_ptr());
      }
    }

    if p.as_ptr() as usize > self.first_block_user_ptr() {
      let prev_tag = unsafe { block::footer_before(p) };
      if prev_tag > 0 {
        let prev_size = prev_tag as usize;
        let q = unsafe { NonNull::new_unchecked((p.as_ptr() as usize - prev_size) as *mut u8) };
        unsafe { self.bins.remove(q, prev_size) };
        total += prev_size;
        log::trace!("reclaim: backward-coalesced {prev_size} bytes at {:p}", q.as_ptr());
        p = q;
      }
    }

    // `last` names whichever block's header sits at the greatest address.
    // After coalescing, that's `p` exactly when the merged block now
    // reaches the region's current end (I5) — which also covers the
    // reference allocator's defensive "p > last" update on an anomalous
    // free, since a block reaching the region end can't be smaller-addressed
    // than whatever `last` held before.
    //
    // `p + total` is the user pointer a block immediately past `p` would
    // have (user-pointer space), so it lands `HEADER_SIZE` bytes past
    // `region_end` (block-start space) exactly when `p` is now the
    // trailing block.
    if p.as_ptr() as usize + total == region_end + block::HEADER_SIZE {
      self.last = Some(p);
    }

    unsafe { self.bins.insert(p, total) };
    log::debug!("reclaim: freed block at {:p}, combined size {total}", p.as_ptr());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn release_then_consistency_check_holds() {
    let mut heap = Heap::new(1 << 16);
    let a = heap.allocate(64).unwrap();
    heap.release(a);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn release_coalesces_adjacent_free_blocks() {
    let mut heap = Heap::new(1 << 16);
    let a = heap.allocate(64).unwrap();
    let b = heap.allocate(64).unwrap();
    let c = heap.allocate(64).unwrap();
    heap.release(a);
    heap.release(c);
    heap.release(b);
    // All three neighbors are free now; a single allocate for their
    // combined size should succeed without growing the region further.
    let reused = heap.allocate(150).unwrap();
    assert_eq!(reused, a);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn reallocate_shrink_keeps_pointer() {
    let mut heap = Heap::new(1 << 16);
    let p = heap.allocate(400).unwrap();
    let q = heap.reallocate(p, 16).unwrap();
    assert_eq!(p, q);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn reallocate_grow_last_block_extends_in_place() {
    let mut heap = Heap::new(1 << 16);
    let p = heap.allocate(16).unwrap();
    let q = heap.reallocate(p, 4000).unwrap();
    assert_eq!(p, q);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn reallocate_grow_into_free_neighbor() {
    let mut heap = Heap::new(1 << 16);
    let p = heap.allocate(16).unwrap();
    let mid = heap.allocate(200).unwrap();
    let _tail = heap.allocate(16).unwrap();
    heap.release(mid);
    let grown = heap.reallocate(p, 150).unwrap();
    assert_eq!(grown, p);
    assert!(heap.consistency_check().is_ok());
  }

  #[test]
  fn reallocate_falls_back_to_copy_when_neighbor_allocated() {
    let mut heap = Heap::new(1 << 16);
    let p = heap.allocate(16).unwrap();
    let _neighbor = heap.allocate(16).unwrap();
    unsafe {
      *p.as_ptr() = 0xAB;
    }
    let grown = heap.reallocate(p, 400).unwrap();
    assert_ne!(grown, p);
    assert_eq!(unsafe { *grown.as_ptr() }, 0xAB);
    assert!(heap.consistency_check().is_ok());
  }
}
