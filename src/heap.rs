//! The heap extender and the explicit allocator context.
//!
//! [`Heap`] packages the process-wide state that the original allocator
//! design kept as bare global variables (the base pointer and the free-list
//! sentinel) into a single context object, per the allocator's own design
//! notes: "A clean re-architecture packages them inside an allocator
//! context passed explicitly to every operation." The crate root keeps a
//! single default `Heap` instance for API compatibility (see `lib.rs`).

use std::fmt;

use crate::align::{self, WORD};
use crate::check;
use crate::coalesce;
use crate::error::GrowError;
use crate::freelist::{self, FreeNode};
use crate::placement;
use crate::tag;

/// The chunk size requested from the host when placement fails and the
/// heap must grow, matching both the allocator spec and the source's
/// `CHUCKSIZE = 1 << 12`.
pub const HEAP_EXTENSION_CHUNK: usize = 4096;

/// Host collaborators: the `sbrk`-like growth primitive and the byte-copy
/// / byte-fill primitives. This crate is a userspace library, so these are
/// backed by the real `sbrk(2)` syscall via `libc`, the same primitive the
/// teacher crate builds on.
pub mod host {
  use super::GrowError;
  use crate::align::ALIGNMENT;
  use libc::{c_void, intptr_t, sbrk};
  use std::ptr;

  /// Atomically extends the heap by `bytes` (the caller guarantees a
  /// 16-byte multiple), returning a pointer to the first new byte.
  pub fn heap_grow(bytes: usize) -> Result<*mut u8, GrowError> {
    if bytes % ALIGNMENT != 0 {
      return Err(GrowError::Misaligned { requested: bytes, alignment: ALIGNMENT });
    }
    // `sbrk` takes a signed increment; a request wider than `isize::MAX`
    // would wrap into a negative `intptr_t` and actually shrink the break
    // instead of failing. Reject it as an ordinary growth failure.
    if bytes > isize::MAX as usize {
      return Err(GrowError::HostRefused { requested: bytes });
    }
    let raw = unsafe { sbrk(bytes as intptr_t) };
    if raw == usize::MAX as *mut c_void {
      return Err(GrowError::HostRefused { requested: bytes });
    }
    Ok(raw as *mut u8)
  }

  /// Copies `n` bytes from `src` to `dst`. The regions must not overlap.
  ///
  /// # Safety
  /// `src`/`dst` must be valid for reads/writes of `n` bytes and must not
  /// overlap.
  pub unsafe fn byte_copy(dst: *mut u8, src: *const u8, n: usize) {
    unsafe { ptr::copy_nonoverlapping(src, dst, n) };
  }

  /// Fills `n` bytes starting at `dst` with `value`.
  ///
  /// # Safety
  /// `dst` must be valid for writes of `n` bytes.
  pub unsafe fn byte_fill(dst: *mut u8, value: u8, n: usize) {
    unsafe { ptr::write_bytes(dst, value, n) };
  }
}

/// The allocator's explicit context: the base pointer (the prologue's
/// payload position) and the free-list sentinel, plus the bounds of the
/// heap region this instance owns.
///
/// Not `Sync` (it holds raw pointers with no internal synchronization);
/// see [`crate::DefaultHeap`] for the process-wide single-threaded default
/// instance used by the free-function API.
pub struct Heap {
  base: *mut u8,
  free_list: Box<FreeNode>,
  heap_lo: *mut u8,
  heap_hi: *mut u8,
}

impl Heap {
  /// Creates a fresh heap: lays down the prologue/epilogue sentinels and
  /// performs the first extension (one [`HEAP_EXTENSION_CHUNK`]).
  ///
  /// Returns `None` if the host refuses to grant even the initial 4 words.
  pub fn init() -> Option<Heap> {
    let mut sentinel = Box::new(FreeNode::detached());
    freelist::init(sentinel.as_mut());

    let raw = host::heap_grow(4 * WORD).ok()?;
    debug_assert!(
      align::is_aligned(raw as usize),
      "host sbrk base {:p} is not 16-byte aligned; target ABI needs extra padding",
      raw
    );

    unsafe {
      tag::write_word(raw, 0); // alignment padding
      tag::write_word(raw.add(WORD), tag::pack(2 * WORD, true)); // prologue header
      tag::write_word(raw.add(2 * WORD), tag::pack(2 * WORD, true)); // prologue footer
      tag::write_word(raw.add(3 * WORD), tag::pack(0, true)); // epilogue header
    }
    let base = unsafe { raw.add(2 * WORD) };

    let mut heap = Heap {
      base,
      free_list: sentinel,
      heap_lo: raw,
      heap_hi: unsafe { raw.add(4 * WORD - 1) },
    };

    heap.extend_heap(HEAP_EXTENSION_CHUNK)?;
    Some(heap)
  }

  /// Requests `bytes` (already 16-aligned) more memory from the host,
  /// stamps it as a single free block, re-stamps the epilogue at the new
  /// high-water mark, and coalesces with whatever free block (if any)
  /// preceded it. Returns the payload pointer of the resulting free block.
  pub fn extend_heap(&mut self, bytes: usize) -> Option<*mut u8> {
    let bytes = align::align(bytes);
    let p = match host::heap_grow(bytes) {
      Ok(p) => p,
      Err(err) => {
        log::warn!("heap extension failed: {err}");
        return None;
      }
    };

    unsafe {
      tag::write_tags(p, bytes, false);
      let next = tag::next_payload(p);
      tag::write_word(tag::header_of(next), tag::pack(0, true));
    }
    self.heap_hi = unsafe { p.add(bytes - 1) };
    log::debug!("heap extended by {bytes} bytes, new high water mark {:p}", self.heap_hi);

    Some(unsafe { coalesce::coalesce(self, p) })
  }

  /// Allocates `size` bytes, returning a 16-aligned payload pointer, or
  /// null if `size` is zero or the host refuses to grow the heap.
  pub fn allocate(&mut self, size: usize) -> *mut u8 {
    if size == 0 {
      return std::ptr::null_mut();
    }

    let Some(request) = (if size <= 2 * WORD {
      Some(4 * WORD)
    } else {
      align::checked_align(size).and_then(|r| r.checked_add(2 * WORD))
    }) else {
      log::warn!("allocate: requested size {size} overflows the block-size computation");
      return std::ptr::null_mut();
    };

    if let Some(p) = placement::first_fit(self, request) {
      return unsafe { placement::allocate_block(self, p, request) };
    }

    match self.extend_heap(request.max(HEAP_EXTENSION_CHUNK)) {
      Some(p) => unsafe { placement::allocate_block(self, p, request) },
      None => std::ptr::null_mut(),
    }
  }

  /// Frees a block previously returned by [`Heap::allocate`]. A no-op on a
  /// null pointer. Passing a pointer not returned by this heap's
  /// `allocate`, or a pointer already freed, is undefined behavior.
  ///
  /// # Safety
  /// `p` must be null or a live payload pointer previously returned by
  /// this `Heap`'s `allocate`/`reallocate`, not already freed.
  pub unsafe fn free(&mut self, p: *mut u8) {
    if p.is_null() {
      return;
    }
    let size = unsafe { tag::block_size(p) };
    unsafe { tag::write_tags(p, size, false) };
    unsafe { coalesce::coalesce(self, p) };
  }

  /// Resizes the allocation at `p` to `size` bytes. Null `p` behaves as
  /// `allocate(size)`; `size == 0` behaves as `free(p)` and returns null.
  /// Shrinking (or an equal-size request) is a no-op that returns `p`
  /// unchanged (no in-place expansion into a free successor is ever
  /// attempted).
  ///
  /// # Safety
  /// `p` must be null or a live payload pointer previously returned by
  /// this `Heap`.
  pub unsafe fn reallocate(&mut self, p: *mut u8, size: usize) -> *mut u8 {
    if p.is_null() {
      return self.allocate(size);
    }
    if size == 0 {
      unsafe { self.free(p) };
      return std::ptr::null_mut();
    }

    let old_payload_size = unsafe { tag::block_size(p) } - 2 * WORD;
    if size <= old_payload_size {
      return p;
    }

    let new_p = self.allocate(size);
    if new_p.is_null() {
      return std::ptr::null_mut();
    }

    let copy_size = size.min(old_payload_size);
    unsafe { host::byte_copy(new_p, p as *const u8, copy_size) };
    unsafe { self.free(p) };
    new_p
  }

  /// Allocates `n * size` bytes, zero-filled. Returns null if either `n`
  /// or `size` is zero, if `n * size` overflows, or if allocation fails.
  pub fn zero_allocate(&mut self, n: usize, size: usize) -> *mut u8 {
    if n == 0 || size == 0 {
      return std::ptr::null_mut();
    }
    let Some(total) = n.checked_mul(size) else {
      log::warn!("zero_allocate: {n} * {size} overflows usize");
      return std::ptr::null_mut();
    };

    let p = self.allocate(total);
    if !p.is_null() {
      unsafe { host::byte_fill(p, 0, total) };
    }
    p
  }

  /// Runs the structural integrity checker over this heap. A no-op that
  /// always returns `true` in release builds; see [`crate::check`].
  pub fn check_heap(&self, lineno: u32) -> bool {
    check::check_heap(self, lineno)
  }

  /// The payload position of the prologue: the fixed starting point every
  /// forward scan of the heap begins from.
  pub(crate) fn base(&self) -> *mut u8 {
    self.base
  }

  /// The sentinel root of the free list.
  pub(crate) fn free_list_root(&self) -> *mut FreeNode {
    self.free_list.as_ref() as *const FreeNode as *mut FreeNode
  }

  /// Lowest address ever granted to this heap by the host (inclusive).
  pub fn heap_low(&self) -> *mut u8 {
    self.heap_lo
  }

  /// Highest valid address currently in this heap (inclusive).
  pub fn heap_high(&self) -> *mut u8 {
    self.heap_hi
  }
}

impl fmt::Debug for Heap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Heap")
      .field("base", &self.base)
      .field("heap_low", &self.heap_lo)
      .field("heap_high", &self.heap_hi)
      .field("free", &!freelist::is_empty(self.free_list_root()))
      .finish()
  }
}

// Heap embeds raw pointers that only ever refer to memory this instance
// owns exclusively (see spec.md §5): it is safe to move between threads as
// long as it is only ever touched by one thread at a time, which is the
// allocator's standing single-threaded invariant.
unsafe impl Send for Heap {}
