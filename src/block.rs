//! Block layout primitives.
//!
//! Every live byte in the region belongs to exactly one block:
//!
//! ```text
//!  offset  field           size    meaning
//!   0      header          4 B     total block size in bytes (header+footer included)
//!   4      payload / links …       if allocated: user bytes; if free: {next, prev}
//!   size-4 footer          4 B     "free tag": >0 when free (stores size), -1 when allocated
//! ```
//!
//! The address handed to callers (the "user pointer") always points at
//! offset 4, just past the header. Every unsafe read/write of a header or
//! footer word is concentrated here; the rest of the crate only ever moves
//! typed `NonNull<u8>` user pointers around.

use std::ptr::NonNull;

/// Size in bytes of the header word.
pub const HEADER_SIZE: usize = 4;

/// Size in bytes of the footer word.
pub const FOOTER_SIZE: usize = 4;

/// Smallest block the heap will ever hand out or keep on a free list: header
/// + two free-list link pointers + footer on a 64-bit target.
pub const MIN_BLOCK: usize = 32;

/// Footer value written into an allocated block. Any positive footer value
/// is a free block whose size equals that value.
pub const ALLOCATED_TAG: i32 = -1;

/// Returns the address of the header word for the block whose user pointer
/// is `user`.
///
/// # Safety
/// `user` must point 4 bytes past the start of a block that is still
/// resident in the region.
#[inline]
unsafe fn header_ptr(user: NonNull<u8>) -> *mut i32 {
  unsafe { user.as_ptr().sub(HEADER_SIZE) as *mut i32 }
}

/// Returns the address of the footer word for a block of size `size` whose
/// user pointer is `user`.
///
/// # Safety
/// `[user - 4, user - 4 + size)` must lie within the region.
#[inline]
unsafe fn footer_ptr(user: NonNull<u8>, size: usize) -> *mut i32 {
  unsafe { user.as_ptr().add(size).sub(HEADER_SIZE + FOOTER_SIZE) as *mut i32 }
}

/// Reads the block's total size (header+payload+footer) from its header.
///
/// # Safety
/// `user` must be a valid block user pointer currently resident in the region.
#[inline]
pub unsafe fn size_of_block(user: NonNull<u8>) -> usize {
  unsafe { (*header_ptr(user)) as usize }
}

/// Writes `size` into the block's header.
///
/// # Safety
/// `user` must be a valid block user pointer currently resident in the region.
#[inline]
pub unsafe fn write_size(user: NonNull<u8>, size: usize) {
  debug_assert_eq!(size % 8, 0, "block sizes must be 8-byte multiples");
  debug_assert!(size >= MIN_BLOCK, "block smaller than MIN_BLOCK");
  unsafe {
    *header_ptr(user) = size as i32;
  }
}

/// Reads the raw footer value ("free tag"): positive and equal to `size`
/// when the block is free, `-1` when allocated.
///
/// # Safety
/// `user` must be a valid block user pointer of size `size` currently
/// resident in the region.
#[inline]
pub unsafe fn free_tag(user: NonNull<u8>, size: usize) -> i32 {
  unsafe { *footer_ptr(user, size) }
}

/// Writes the footer's free tag.
///
/// # Safety
/// `user` must be a valid block user pointer of size `size` currently
/// resident in the region.
#[inline]
pub unsafe fn write_free_tag(user: NonNull<u8>, size: usize, tag: i32) {
  unsafe {
    *footer_ptr(user, size) = tag;
  }
}

/// Marks a block of size `size` at `user` as free: footer is set to `size`.
/// Does not touch the header — callers that are changing size must call
/// [`write_size`] first.
///
/// # Safety
/// Same as [`write_free_tag`].
#[inline]
pub unsafe fn mark_free(user: NonNull<u8>, size: usize) {
  unsafe { write_free_tag(user, size, size as i32) }
}

/// Marks a block of size `size` at `user` as allocated: footer is set to
/// `-1`.
///
/// # Safety
/// Same as [`write_free_tag`].
#[inline]
pub unsafe fn mark_allocated(user: NonNull<u8>, size: usize) {
  unsafe { write_free_tag(user, size, ALLOCATED_TAG) }
}

/// Returns whether the footer tag for a block of size `size` at `user`
/// indicates a free block.
///
/// # Safety
/// Same as [`free_tag`].
#[inline]
pub unsafe fn is_free(user: NonNull<u8>, size: usize) -> bool {
  unsafe { free_tag(user, size) > 0 }
}

/// Reads the raw 4-byte word located 8 bytes before `user` — the footer of
/// whatever block ends immediately before `user`'s block begins, if any.
///
/// # Safety
/// `user` must not be the user pointer of the leftmost managed block in its
/// region (otherwise `user - 8` falls outside the region).
#[inline]
pub unsafe fn footer_before(user: NonNull<u8>) -> i32 {
  unsafe { *(user.as_ptr().sub(HEADER_SIZE + FOOTER_SIZE) as *const i32) }
}

/// Initializes a fresh block's header and footer as allocated.
///
/// # Safety
/// `[user - 4, user - 4 + size)` must lie within the region and not overlap
/// any other live block.
#[inline]
pub unsafe fn init_allocated(user: NonNull<u8>, size: usize) {
  unsafe {
    write_size(user, size);
    mark_allocated(user, size);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn user_ptr(buf: &mut [u8], offset: usize) -> NonNull<u8> {
    NonNull::new(unsafe { buf.as_mut_ptr().add(offset) }).unwrap()
  }

  #[test]
  fn header_and_footer_round_trip() {
    let mut buf = [0u8; 64];
    let p = user_ptr(&mut buf, 4);
    unsafe {
      write_size(p, 32);
      mark_free(p, 32);
      assert_eq!(size_of_block(p), 32);
      assert!(is_free(p, 32));
      assert_eq!(free_tag(p, 32), 32);

      mark_allocated(p, 32);
      assert!(!is_free(p, 32));
      assert_eq!(free_tag(p, 32), ALLOCATED_TAG);
    }
  }

  #[test]
  fn init_allocated_writes_both_words() {
    let mut buf = [0u8; 64];
    let p = user_ptr(&mut buf, 4);
    unsafe {
      init_allocated(p, 40);
      assert_eq!(size_of_block(p), 40);
      assert_eq!(free_tag(p, 40), ALLOCATED_TAG);
    }
  }
}
