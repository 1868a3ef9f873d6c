//! First-fit placement and block splitting.

use crate::align::MIN_BLOCK_SIZE;
use crate::freelist;
use crate::heap::Heap;
use crate::tag;

/// Scans the free list from its head, returning the first block whose size
/// is at least `request`, or `None` if no block qualifies.
pub fn first_fit(heap: &Heap, request: usize) -> Option<*mut u8> {
  let root = heap.free_list_root();
  for node in freelist::iter(root) {
    let p = node as *mut u8;
    if unsafe { tag::block_size(p) } >= request {
      return Some(p);
    }
  }
  None
}

/// Places a `request`-byte allocation at the free block `p` (which must
/// currently be linked in the free list with size ≥ `request`), splitting
/// off a free remainder when the leftover can host a legal minimum-size
/// free block. Returns `p`, now tagged allocated.
///
/// # Safety
/// `p` must address a free block currently linked in `heap`'s free list,
/// with block size ≥ `request`.
pub unsafe fn allocate_block(heap: &mut Heap, p: *mut u8, request: usize) -> *mut u8 {
  let available = unsafe { tag::block_size(p) };
  let root = heap.free_list_root();

  if available - request >= MIN_BLOCK_SIZE {
    unsafe {
      freelist::unlink(p as *mut freelist::FreeNode);
      tag::write_tags(p, request, true);
      let remainder = tag::next_payload(p);
      tag::write_tags(remainder, available - request, false);
      freelist::insert(root, remainder as *mut freelist::FreeNode);
    }
    log::trace!(
      "allocate_block: split {:p} into {} (alloc) + {} (free)",
      p,
      request,
      available - request
    );
  } else {
    unsafe {
      freelist::unlink(p as *mut freelist::FreeNode);
      tag::write_tags(p, available, true);
    }
    log::trace!("allocate_block: placed {:p} without splitting ({} bytes)", p, available);
  }
  p
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_fit_finds_the_single_free_block_on_a_fresh_heap() {
    let heap = Heap::init().expect("init");
    // A fresh heap is one large free block, so any reasonable request must
    // be satisfied by it.
    let found = first_fit(&heap, 64);
    assert!(found.is_some());
    assert!(unsafe { tag::block_size(found.unwrap()) } >= 64);
  }

  #[test]
  fn first_fit_skips_too_small_blocks_ahead_of_a_fit() {
    let mut heap = Heap::init().expect("init");
    let a = heap.allocate(16); // 32-byte block
    let bracket = heap.allocate(16); // keeps `a` from coalescing forward once freed
    unsafe { heap.free(a) };
    // `a` is now the head of the free list (LIFO) but is too small to
    // satisfy a large request, so first_fit must fall through to the
    // remaining big free block.
    let big_request = 4096;
    let found = first_fit(&heap, big_request).expect("a large free block exists");
    assert_ne!(found, a);
    assert!(unsafe { tag::block_size(found) } >= big_request);
    assert!(unsafe { tag::is_allocated(bracket) });
  }

  #[test]
  fn allocate_block_splits_when_remainder_is_large_enough() {
    let mut heap = Heap::init().expect("init");
    let p = first_fit(&heap, 64).expect("initial free block");
    let available = unsafe { tag::block_size(p) };
    let request = 64;
    assert!(available - request >= MIN_BLOCK_SIZE);

    let allocated = unsafe { allocate_block(&mut heap, p, request) };
    assert_eq!(allocated, p);
    assert_eq!(unsafe { tag::block_size(allocated) }, request);
    assert!(unsafe { tag::is_allocated(allocated) });

    let remainder = unsafe { tag::next_payload(allocated) };
    let remainder_allocated = unsafe { tag::is_allocated(remainder) };
    assert_eq!(unsafe { tag::block_size(remainder) }, available - request);
    assert!(!remainder_allocated);
    assert!(freelist::iter(heap.free_list_root()).any(|node| node as *mut u8 == remainder));
  }

  #[test]
  fn allocate_block_consumes_whole_block_below_split_threshold() {
    let mut heap = Heap::init().expect("init");
    // Bracket a 48-byte block between two allocated neighbours so that
    // freeing it cannot coalesce forward or backward into the surrounding
    // free space; only then does it stay an isolated 48-byte free block.
    let before = heap.allocate(32);
    let seed = heap.allocate(32);
    let after = heap.allocate(32);
    unsafe { heap.free(seed) };

    let p = first_fit(&heap, 32).expect("seeded free block");
    assert_eq!(p, seed);
    let available = unsafe { tag::block_size(p) };
    assert_eq!(available, 48);

    let request = 32; // 48 - 32 = 16 < MIN_BLOCK_SIZE (32): no split
    let allocated = unsafe { allocate_block(&mut heap, p, request) };
    assert_eq!(allocated, p);
    assert_eq!(unsafe { tag::block_size(allocated) }, available);
    assert!(unsafe { tag::is_allocated(allocated) });
    assert!(unsafe { tag::is_allocated(before) });
    assert!(unsafe { tag::is_allocated(after) });
  }
}
