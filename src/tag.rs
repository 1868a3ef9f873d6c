//! Block layout and boundary-tag arithmetic.
//!
//! Every block in the heap is bracketed by a header word and a footer word
//! that are always byte-for-byte identical (the boundary-tag invariant).
//! Both words pack a size (a multiple of [`crate::align::ALIGNMENT`], so its
//! low bits are free) together with a one-bit allocated flag in bit 0.
//!
//! All functions here take a *payload pointer*, the address returned to
//! the user, one word past the header, and derive header/footer/neighbour
//! addresses from it. None of them validate that `p` actually addresses a
//! live block; that is the caller's responsibility, same as in `mm.c`.

use crate::align::WORD;

const ALLOC_BIT: usize = 0x1;
const SIZE_MASK: usize = !0x7;

/// Packs a block `size` (already a multiple of 8) with an allocated flag
/// into a single boundary-tag word.
pub fn pack(size: usize, allocated: bool) -> usize {
  debug_assert_eq!(size & 0x7, 0, "block size must be a multiple of 8");
  size | (allocated as usize)
}

/// Extracts the size field from a boundary-tag word, masking off the flag
/// bits.
pub fn size_field(tag: usize) -> usize {
  tag & SIZE_MASK
}

/// Extracts the allocated flag from a boundary-tag word.
pub fn alloc_field(tag: usize) -> bool {
  tag & ALLOC_BIT != 0
}

/// Reads the raw word stored at `addr`.
///
/// # Safety
/// `addr` must be valid for reads of one word.
pub unsafe fn read_word(addr: *mut u8) -> usize {
  unsafe { (addr as *const usize).read() }
}

/// Writes a raw word at `addr`.
///
/// # Safety
/// `addr` must be valid for writes of one word.
pub unsafe fn write_word(addr: *mut u8, value: usize) {
  unsafe { (addr as *mut usize).write(value) };
}

/// Address of `p`'s header: one word before the payload.
///
/// # Safety
/// `p` must point one word past a valid header.
pub unsafe fn header_of(p: *mut u8) -> *mut u8 {
  unsafe { p.sub(WORD) }
}

/// Address of `p`'s footer, derived from the size stored in its header.
///
/// # Safety
/// `p`'s header must already hold a valid packed size.
pub unsafe fn footer_of(p: *mut u8) -> *mut u8 {
  let size = unsafe { size_field(read_word(header_of(p))) };
  unsafe { p.add(size).sub(2 * WORD) }
}

/// Payload address of the block immediately after `p`, derived from `p`'s
/// header size.
///
/// # Safety
/// `p`'s header must hold a valid packed size, and the next block must
/// exist (the epilogue always satisfies this).
pub unsafe fn next_payload(p: *mut u8) -> *mut u8 {
  let size = unsafe { size_field(read_word(header_of(p))) };
  unsafe { p.add(size) }
}

/// Payload address of the block immediately before `p`, derived from the
/// size stored in the word immediately preceding `p`'s header (which is
/// the previous block's footer).
///
/// # Safety
/// The word before `p`'s header must be a valid footer. The prologue
/// guarantees this for the first real block in the heap.
pub unsafe fn prev_payload(p: *mut u8) -> *mut u8 {
  let prev_footer = unsafe { p.sub(2 * WORD) };
  let size = unsafe { size_field(read_word(prev_footer)) };
  unsafe { p.sub(size) }
}

/// Reads the allocated bit out of `p`'s header.
///
/// # Safety
/// `p`'s header must be initialized.
pub unsafe fn is_allocated(p: *mut u8) -> bool {
  unsafe { alloc_field(read_word(header_of(p))) }
}

/// Reads the total block size (header + payload + footer) out of `p`'s
/// header.
///
/// # Safety
/// `p`'s header must be initialized.
pub unsafe fn block_size(p: *mut u8) -> usize {
  unsafe { size_field(read_word(header_of(p))) }
}

/// Writes matching header and footer tags for the block at `p`.
///
/// # Safety
/// `p` must address a block of exactly `size` bytes, and both the header
/// and footer words must be valid to write.
pub unsafe fn write_tags(p: *mut u8, size: usize, allocated: bool) {
  let tag = pack(size, allocated);
  unsafe {
    write_word(header_of(p), tag);
    write_word(footer_of_sized(p, size), tag);
  }
}

/// Like [`footer_of`] but takes the size explicitly, for use while writing
/// a header whose stored size does not yet match `size`.
fn footer_of_sized(p: *mut u8, size: usize) -> *mut u8 {
  unsafe { p.add(size).sub(2 * WORD) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_pack_unpack() {
    let tag = pack(64, true);
    assert_eq!(size_field(tag), 64);
    assert!(alloc_field(tag));

    let tag = pack(128, false);
    assert_eq!(size_field(tag), 128);
    assert!(!alloc_field(tag));
  }

  #[test]
  fn test_roundtrip_on_buffer() {
    let mut buf = [0u8; 64];
    let p = unsafe { buf.as_mut_ptr().add(WORD) };

    unsafe {
      write_tags(p, 64, true);
      assert_eq!(block_size(p), 64);
      assert!(is_allocated(p));
      assert_eq!(read_word(header_of(p)), read_word(footer_of(p)));
    }
  }
}
