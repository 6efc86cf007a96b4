//! The region primitive: a monotone, `sbrk`-like byte store.
//!
//! The heap (`placement`/`reclaim`) is the *only* consumer of a [`Region`];
//! it never shrinks, and every address it hands out stays valid until the
//! `Region` itself is dropped. This mirrors the reference implementation's
//! simulated memory system, which backs its "heap" with one upfront
//! allocation rather than the process's real program break — doing so lets
//! every [`crate::Heap`] own an independent region instead of fighting over
//! one process-wide `sbrk` cursor, which is what makes it possible to run
//! more than one heap (as the test suite does) in the same process.

use std::ptr::NonNull;

/// A fixed-capacity, monotonically growing byte store.
///
/// `Region` reserves `capacity` bytes once, up front, and zeroes them (so
/// that reading never observes uninitialized memory even before the heap
/// has written a header there). [`Region::region_extend`] then hands out
/// prefixes of that reservation one `sbrk`-style call at a time; the
/// reservation itself is never moved or resized, so every address handed
/// out remains valid for the region's whole lifetime.
pub struct Region {
  storage: Box<[u8]>,
  /// Offset of the first byte *after* the current end of the region. `0`
  /// means the region is still empty.
  brk: usize,
}

impl Region {
  /// Reserves `capacity` bytes of backing storage for a region that starts
  /// out empty (`region_size() == 0`).
  pub fn new(capacity: usize) -> Self {
    Self { storage: vec![0u8; capacity].into_boxed_slice(), brk: 0 }
  }

  /// Grows the region by exactly `n` bytes and returns the address of the
  /// *old* end (where the newly available bytes begin), or `None` if the
  /// reservation is exhausted. Never shrinks.
  pub fn region_extend(&mut self, n: usize) -> Option<NonNull<u8>> {
    let new_brk = self.brk.checked_add(n)?;
    if new_brk > self.storage.len() {
      log::warn!(
        "region exhausted: requested {n} more bytes, {} in use of {} reserved",
        self.brk,
        self.storage.len()
      );
      return None;
    }
    // Safety: `self.brk` is within bounds by the check above, and the
    // storage is never reallocated after construction.
    let old_end = unsafe { NonNull::new_unchecked(self.storage.as_mut_ptr().add(self.brk)) };
    self.brk = new_brk;
    log::trace!("region extended by {n} bytes, new region_hi offset {}", self.brk);
    Some(old_end)
  }

  /// Address of the first byte of the region.
  pub fn region_lo(&self) -> NonNull<u8> {
    // Safety: `storage` is a non-empty `Box<[u8]>` allocation (capacity is
    // always > 0 in practice; even a zero-capacity box has a well-defined,
    // non-null dangling pointer).
    unsafe { NonNull::new_unchecked(self.storage.as_ptr() as *mut u8) }
  }

  /// Address of the last occupied byte of the region (inclusive), or
  /// `None` if nothing has been extended into it yet.
  pub fn region_hi(&self) -> Option<NonNull<u8>> {
    if self.brk == 0 {
      return None;
    }
    // Safety: `self.brk - 1` is within bounds because `self.brk <= storage.len()`.
    Some(unsafe { NonNull::new_unchecked(self.storage.as_ptr().add(self.brk - 1) as *mut u8) })
  }

  /// Number of bytes currently in use (`region_hi - region_lo + 1`, or 0
  /// when empty).
  pub fn region_size(&self) -> usize {
    self.brk
  }

  /// Total reserved capacity; `region_extend` fails once `region_size` would
  /// exceed this.
  pub fn capacity(&self) -> usize {
    self.storage.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fresh_region_is_empty() {
    let region = Region::new(4096);
    assert_eq!(region.region_size(), 0);
    assert!(region.region_hi().is_none());
  }

  #[test]
  fn extend_grows_monotonically() {
    let mut region = Region::new(4096);
    let first = region.region_extend(64).unwrap();
    assert_eq!(region.region_size(), 64);
    assert_eq!(first, region.region_lo());

    let second = region.region_extend(32).unwrap();
    assert_eq!(region.region_size(), 96);
    // second is 64 bytes past the region start.
    assert_eq!(second.as_ptr() as usize - region.region_lo().as_ptr() as usize, 64);
  }

  #[test]
  fn extend_past_capacity_fails_without_side_effects() {
    let mut region = Region::new(128);
    assert!(region.region_extend(64).is_some());
    assert!(region.region_extend(128).is_none());
    // The failed extension must not have moved the cursor.
    assert_eq!(region.region_size(), 64);
  }
}
