//! Immediate bidirectional coalescing.
//!
//! Invoked on two paths: after `free` marks a block free, and after
//! [`crate::heap::Heap::extend_heap`] stamps a newly acquired region as
//! free. The block at `p` must already be tagged free but must not yet be
//! linked into the free list (coalescing decides where, and whether, it
//! ends up in the list).

use crate::freelist;
use crate::heap::Heap;
use crate::tag;

/// Merges the free block at `p` with any immediately adjacent free
/// neighbours, inserting the (possibly merged) result into `heap`'s free
/// list, and returns the payload pointer of the resulting block.
///
/// # Safety
/// `p` must address a block currently tagged free (header and footer both
/// carry `allocated = false`) that is not already linked into the free
/// list. `heap`'s boundary tags must otherwise be well-formed.
pub unsafe fn coalesce(heap: &mut Heap, p: *mut u8) -> *mut u8 {
  let prev = unsafe { tag::prev_payload(p) };
  let next = unsafe { tag::next_payload(p) };

  // Belt-and-braces bounds check per the allocator's design notes: the
  // prologue/epilogue sentinels already force these allocated bits to 1,
  // so this is not relied upon for correctness, only as a defensive check
  // against a corrupt heap.
  let prev_alloc = if (prev as usize) >= heap.heap_low() as usize {
    unsafe { tag::is_allocated(prev) }
  } else {
    true
  };
  let next_alloc = if (next as usize) <= heap.heap_high() as usize {
    unsafe { tag::is_allocated(next) }
  } else {
    true
  };

  let size = unsafe { tag::block_size(p) };
  let root = heap.free_list_root();

  match (prev_alloc, next_alloc) {
    (true, true) => {
      unsafe { freelist::insert(root, p as *mut freelist::FreeNode) };
      log::trace!("coalesce: no neighbours free, inserted {:p} ({} bytes)", p, size);
      p
    }
    (true, false) => {
      unsafe {
        freelist::unlink(next as *mut freelist::FreeNode);
        let merged = size + tag::block_size(next);
        tag::write_tags(p, merged, false);
        freelist::insert(root, p as *mut freelist::FreeNode);
      }
      log::trace!("coalesce: merged {:p} with next", p);
      p
    }
    (false, true) => {
      unsafe {
        let merged = size + tag::block_size(prev);
        tag::write_tags(prev, merged, false);
      }
      log::trace!("coalesce: merged {:p} into prev {:p}", p, prev);
      prev
    }
    (false, false) => {
      unsafe {
        freelist::unlink(next as *mut freelist::FreeNode);
        let merged = size + tag::block_size(prev) + tag::block_size(next);
        tag::write_tags(prev, merged, false);
      }
      log::trace!("coalesce: merged {:p} with both neighbours into prev {:p}", p, prev);
      prev
    }
  }
}
