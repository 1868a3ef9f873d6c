//! Structural integrity checker.
//!
//! Mirrors `mm.c`'s `mm_checkheap`, gated on `cfg!(debug_assertions)` the way
//! the source gates it behind `#ifdef DEBUG`. Walks every real block from
//! the prologue to the epilogue, checking alignment, heap bounds,
//! header/footer agreement, and non-overlap with the next block.

use crate::align;
use crate::error::IntegrityError;
use crate::heap::Heap;
use crate::tag;

/// Runs the checker over `heap`, logging every violation found via
/// `log::error!` tagged with the caller-supplied `lineno` (matching the
/// source's `mm_checkheap(int lineno)` convention of reporting where the
/// check was invoked from). Returns `true` iff no violation was found.
///
/// In release builds (`debug_assertions` off) this always returns `true`
/// without touching the heap, the same as the source's checker compiling
/// away to nothing outside `DEBUG` builds.
pub fn check_heap(heap: &Heap, lineno: u32) -> bool {
  if !cfg!(debug_assertions) {
    return true;
  }

  let mut ok = true;
  let mut report = |err: IntegrityError| {
    log::error!("check_heap@{lineno}: {err}");
    ok = false;
  };

  // The prologue is a zero-payload block, so its footer address coincides
  // with its own payload pointer (`footer = p + size - 2 words` with
  // `size == 2 words`). Its header sits one word before that, as usual.
  let prologue_header_addr = unsafe { tag::header_of(heap.base()) };
  let prologue_footer_addr = heap.base();
  let prologue_header = unsafe { tag::read_word(prologue_header_addr) };
  let prologue_footer = unsafe { tag::read_word(prologue_footer_addr) };
  if tag::size_field(prologue_header) != 2 * align::WORD || !tag::alloc_field(prologue_header) {
    report(IntegrityError::BadPrologue);
  }
  if prologue_header != prologue_footer {
    report(IntegrityError::HeaderFooterMismatch {
      addr: heap.base() as usize,
      header: prologue_header,
      footer: prologue_footer,
    });
  }

  let mut p = unsafe { tag::next_payload(heap.base()) };
  loop {
    let size = unsafe { tag::block_size(p) };
    if size == 0 {
      break;
    }

    let addr = p as usize;
    if !align::is_aligned(addr) {
      report(IntegrityError::Misaligned { addr });
    }
    if addr < heap.heap_low() as usize || addr > heap.heap_high() as usize {
      report(IntegrityError::OutOfBounds {
        addr,
        low: heap.heap_low() as usize,
        high: heap.heap_high() as usize,
      });
    }

    let header = unsafe { tag::read_word(tag::header_of(p)) };
    let footer = unsafe { tag::read_word(tag::footer_of(p)) };
    if header != footer {
      report(IntegrityError::HeaderFooterMismatch { addr, header, footer });
    }

    let next = unsafe { tag::next_payload(p) };
    let this_footer_end = unsafe { tag::footer_of(p) as usize } + align::WORD;
    let next_header_start = unsafe { tag::header_of(next) as usize };
    if this_footer_end > next_header_start {
      report(IntegrityError::Overlap { addr, next: next as usize });
    }

    p = next;
  }

  let epilogue_tag = unsafe { tag::read_word(tag::header_of(p)) };
  if tag::size_field(epilogue_tag) != 0 || !tag::alloc_field(epilogue_tag) {
    report(IntegrityError::BadEpilogue);
  }

  ok
}
