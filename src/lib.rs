//! # freeheap, a first-fit, boundary-tag heap allocator over `sbrk`
//!
//! A general-purpose dynamic memory allocator managing a single contiguous,
//! monotonically extensible heap region supplied by the host (`sbrk`).
//! Classical interface: `allocate`, `free`, `reallocate`, `zero_allocate`,
//! plus an internal structural integrity checker.
//!
//! ## Design
//!
//! Blocks carry matching header/footer boundary tags (size + allocated
//! bit), which makes coalescing with either neighbour an O(1) operation.
//! Free blocks are threaded onto an explicit circular doubly-linked list;
//! allocation is first-fit over that list, splitting off a free remainder
//! when one large enough to host a minimal block is left over. When no
//! free block fits, the heap is extended by a chunk from the host and the
//! new block is coalesced with whatever free block (if any) preceded it.
//!
//! ## Crate Structure
//!
//! ```text
//!   freeheap
//!   ├── align      - alignment constants and the align! macro
//!   ├── tag        - block layout & boundary-tag arithmetic
//!   ├── freelist   - the circular doubly-linked free list
//!   ├── coalesce   - immediate bidirectional coalescing
//!   ├── placement  - first-fit scan and block splitting
//!   ├── heap       - the host sbrk bridge and the Heap context
//!   ├── check      - the structural integrity checker
//!   └── error      - internal diagnostics (never crosses the public API)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use freeheap::Heap;
//!
//! let mut heap = Heap::init().expect("host refused initial heap");
//! let p = heap.allocate(64);
//! unsafe { heap.free(p) };
//! ```
//!
//! ## Concurrency
//!
//! `Heap` is single-threaded: it holds raw pointers with no internal
//! synchronization. The free-function API below operates on a single
//! process-wide default instance guarded by a mutex, so it is safe to call
//! from any one thread at a time but does not parallelize allocation.
//!
//! ## Limitations
//!
//! - Single-threaded core (`Heap` itself is `!Sync`).
//! - No size classes or segregated free lists: a single first-fit list.
//! - No in-place `reallocate` growth into a free successor.
//! - Unix-only: built on `libc::sbrk`.
//!
//! Run the test suite single-threaded: `cargo test -- --test-threads=1`.
//! Each test constructs its own private `Heap`, so this is a precaution
//! against `sbrk` itself being a process-wide OS resource, not a
//! requirement of the allocator's own state.

pub mod align;
pub mod check;
pub mod coalesce;
pub mod error;
pub mod freelist;
pub mod heap;
pub mod placement;
pub mod tag;

pub use error::{GrowError, IntegrityError};
pub use heap::Heap;

use std::alloc::{GlobalAlloc, Layout};
use std::sync::Mutex;
use std::sync::OnceLock;

/// The process-wide default [`Heap`], lazily initialized on first use by
/// the free-function API. Guarded by a `Mutex` since `Heap` itself carries
/// no synchronization, matching the retrieval pack's convention of
/// wrapping a single-threaded allocator core in `unsafe impl Sync` only
/// once real mutual exclusion backs it.
struct DefaultHeap(Mutex<Heap>);

unsafe impl Sync for DefaultHeap {}

static DEFAULT_HEAP: OnceLock<DefaultHeap> = OnceLock::new();

fn with_default_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
  let cell = DEFAULT_HEAP.get_or_init(|| {
    let heap = Heap::init().expect("host refused to grant the initial heap region");
    DefaultHeap(Mutex::new(heap))
  });
  let mut guard = cell.0.lock().expect("default heap mutex poisoned");
  f(&mut guard)
}

/// Allocates `size` bytes from the process-wide default heap. See
/// [`Heap::allocate`].
pub fn allocate(size: usize) -> *mut u8 {
  with_default_heap(|heap| heap.allocate(size))
}

/// Frees a block previously returned by [`allocate`]/[`reallocate`]/
/// [`zero_allocate`] on the process-wide default heap. See [`Heap::free`].
///
/// # Safety
/// `p` must be null or a live payload pointer previously returned by one of
/// this module's allocation functions, not already freed.
pub unsafe fn free(p: *mut u8) {
  with_default_heap(|heap| unsafe { heap.free(p) });
}

/// Resizes a block previously returned by [`allocate`] on the process-wide
/// default heap. See [`Heap::reallocate`].
///
/// # Safety
/// `p` must be null or a live payload pointer previously returned by one of
/// this module's allocation functions.
pub unsafe fn reallocate(p: *mut u8, size: usize) -> *mut u8 {
  with_default_heap(|heap| unsafe { heap.reallocate(p, size) })
}

/// Allocates `n * size` zero-filled bytes from the process-wide default
/// heap. See [`Heap::zero_allocate`].
pub fn zero_allocate(n: usize, size: usize) -> *mut u8 {
  with_default_heap(|heap| heap.zero_allocate(n, size))
}

/// Runs the structural integrity checker over the process-wide default
/// heap. See [`Heap::check_heap`].
pub fn check_heap(lineno: u32) -> bool {
  with_default_heap(|heap| heap.check_heap(lineno))
}

/// A [`GlobalAlloc`] adapter over the process-wide default heap, so this
/// allocator can be wired in as `#[global_allocator]` the way every other
/// from-scratch allocator in the retrieval pack is designed to be used.
///
/// `GlobalAlloc`'s contract hands over a `Layout`, not a bare size; this
/// adapter only supports alignments up to [`align::ALIGNMENT`] (every block
/// this allocator ever hands out is 16-byte aligned) directly. Larger
/// alignments fall back to over-allocating and hand-aligning within the
/// block, stashing the true block pointer in the word immediately before
/// the address handed to the caller so [`SystemHeap::dealloc`]/
/// [`SystemHeap::realloc`] can recover it; the caller only ever sees and
/// passes back the aligned address, never the underlying block pointer.
pub struct SystemHeap;

impl SystemHeap {
  /// Recovers the true block pointer stashed one word before `aligned` by
  /// [`SystemHeap::alloc`]'s over-alignment path.
  ///
  /// # Safety
  /// `aligned` must have been returned by that path.
  unsafe fn stashed_block(aligned: *mut u8) -> *mut u8 {
    unsafe { (aligned.sub(align::WORD) as *const *mut u8).read() }
  }
}

unsafe impl GlobalAlloc for SystemHeap {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() <= align::ALIGNMENT {
      return allocate(layout.size());
    }

    // Room for the over-alignment shift plus the stashed back-pointer word.
    let padded = layout.size() + layout.align() + align::WORD;
    let raw = allocate(padded);
    if raw.is_null() {
      return raw;
    }
    let min_aligned = unsafe { raw.add(align::WORD) } as usize;
    let misalignment = min_aligned % layout.align();
    let offset = if misalignment == 0 { 0 } else { layout.align() - misalignment };
    let aligned = unsafe { raw.add(align::WORD + offset) };
    unsafe { (aligned.sub(align::WORD) as *mut *mut u8).write(raw) };
    aligned
  }

  unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
    if layout.align() <= align::ALIGNMENT {
      unsafe { free(ptr) };
    } else {
      unsafe { free(Self::stashed_block(ptr)) };
    }
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    if layout.align() <= align::ALIGNMENT {
      return unsafe { reallocate(ptr, new_size) };
    }
    let new_layout = Layout::from_size_align(new_size, layout.align())
      .expect("invalid layout passed to SystemHeap::realloc");
    let new_ptr = unsafe { self.alloc(new_layout) };
    if !new_ptr.is_null() {
      let copy_size = layout.size().min(new_size);
      unsafe { std::ptr::copy_nonoverlapping(ptr, new_ptr, copy_size) };
      unsafe { self.dealloc(ptr, layout) };
    }
    new_ptr
  }
}
