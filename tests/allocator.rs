//! Integration tests covering the allocator's invariants, laws, and the
//! numbered scenarios from its design notes.
//!
//! Each test builds its own private `Heap::init()`, a fresh `sbrk`-backed
//! arena, rather than sharing the crate's process-wide default instance,
//! so tests stay independent of each other's allocation history.

use freeheap::Heap;
use freeheap::align::WORD;

unsafe fn payload_size(p: *mut u8) -> usize {
  unsafe { freeheap::tag::block_size(p) - 2 * WORD }
}

#[test]
fn scenario_first_allocation() {
  let mut heap = Heap::init().expect("init");
  let p = heap.allocate(40);
  assert!(!p.is_null());
  assert_eq!(p as usize % 16, 0);
  assert!((p as usize) >= heap.heap_low() as usize);
  assert!((p as usize) <= heap.heap_high() as usize);
  assert_eq!(unsafe { freeheap::tag::block_size(p) }, 64);
}

#[test]
fn scenario_split_leaves_remainder() {
  let mut heap = Heap::init().expect("init");
  let p = heap.allocate(16);
  assert!(!p.is_null());
  // align(16) + 2*WORD = 16 + 16 = 32 bytes consumed for the allocated block.
  assert_eq!(unsafe { freeheap::tag::block_size(p) }, 32);
  assert!(heap.check_heap(line!()));
}

#[test]
fn scenario_coalesce_both_sides() {
  let mut heap = Heap::init().expect("init");
  let a = heap.allocate(32);
  let b = heap.allocate(32);
  let c = heap.allocate(32);
  assert!(!a.is_null() && !b.is_null() && !c.is_null());

  let a_size = unsafe { freeheap::tag::block_size(a) };
  let b_size = unsafe { freeheap::tag::block_size(b) };
  let c_size = unsafe { freeheap::tag::block_size(c) };

  unsafe {
    heap.free(a);
    heap.free(c);
    heap.free(b);
  }

  // After freeing B last, A, B, and C must have merged into one free block.
  let merged = unsafe { freeheap::tag::block_size(a) };
  assert_eq!(merged, a_size + b_size + c_size);
  assert!(heap.check_heap(line!()));
}

#[test]
fn scenario_no_split_below_minimum_residue() {
  let mut heap = Heap::init().expect("init");
  // Bracket a 48-byte block between two allocated neighbours so freeing it
  // cannot coalesce into the surrounding free space, then free it to get
  // an isolated 48-byte free block (request = align(32) + 16 = 48).
  let before = heap.allocate(32);
  let seed = heap.allocate(32);
  let after = heap.allocate(32);
  assert_eq!(unsafe { freeheap::tag::block_size(seed) }, 48);
  unsafe { heap.free(seed) };

  // Requesting a 16-byte payload needs 32 bytes; 48 - 32 = 16 < MIN_BLOCK_SIZE
  // (32), so the whole 48-byte block is handed out unsplit.
  let p = heap.allocate(16);
  assert_eq!(p, seed);
  assert_eq!(unsafe { freeheap::tag::block_size(p) }, 48);
  assert!(unsafe { freeheap::tag::is_allocated(before) });
  assert!(unsafe { freeheap::tag::is_allocated(after) });
}

#[test]
fn scenario_reallocate_grow_copies_contents() {
  let mut heap = Heap::init().expect("init");
  unsafe {
    let p = heap.allocate(16);
    assert!(!p.is_null());
    std::ptr::copy_nonoverlapping(b"HELLO".as_ptr(), p, 5);

    let q = heap.reallocate(p, 100);
    assert!(!q.is_null());
    let mut buf = [0u8; 5];
    std::ptr::copy_nonoverlapping(q, buf.as_mut_ptr(), 5);
    assert_eq!(&buf, b"HELLO");
  }
}

#[test]
fn scenario_oom_recovery_uses_existing_free_blocks() {
  let mut heap = Heap::init().expect("init");
  let p = heap.allocate(64);
  unsafe { heap.free(p) };

  // A request so large the host cannot possibly satisfy it should fail
  // cleanly, and a subsequent small allocation must still succeed from
  // the free block seeded above.
  let huge = heap.allocate(usize::MAX / 2);
  assert!(huge.is_null());

  let q = heap.allocate(16);
  assert!(!q.is_null());
  assert!(heap.check_heap(line!()));
}

#[test]
fn law_free_then_allocate_identity() {
  let mut heap = Heap::init().expect("init");
  let p = heap.allocate(40);
  let size = unsafe { payload_size(p) };
  unsafe { heap.free(p) };
  let q = heap.allocate(size);
  assert_eq!(p, q);
}

#[test]
fn law_reallocate_shrink_is_noop() {
  let mut heap = Heap::init().expect("init");
  unsafe {
    let p = heap.allocate(64);
    std::ptr::write_bytes(p, 0x42, 64);
    let q = heap.reallocate(p, 16);
    assert_eq!(p, q);
    assert_eq!(*p, 0x42);
  }
}

#[test]
fn law_zero_allocate_zeroes_memory() {
  let mut heap = Heap::init().expect("init");
  let p = heap.zero_allocate(16, 4);
  assert!(!p.is_null());
  let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
  assert!(bytes.iter().all(|&b| b == 0));
}

#[test]
fn law_round_trip_preserves_invariants() {
  let mut heap = Heap::init().expect("init");
  for _ in 0..32 {
    let p = heap.allocate(24);
    unsafe { heap.free(p) };
  }
  assert!(heap.check_heap(line!()));
}

#[test]
fn allocate_zero_returns_null() {
  let mut heap = Heap::init().expect("init");
  assert!(heap.allocate(0).is_null());
}

#[test]
fn zero_allocate_overflow_returns_null() {
  let mut heap = Heap::init().expect("init");
  assert!(heap.zero_allocate(usize::MAX, 2).is_null());
}

#[test]
fn free_null_is_noop() {
  let mut heap = Heap::init().expect("init");
  unsafe { heap.free(std::ptr::null_mut()) };
  assert!(heap.check_heap(line!()));
}

#[test]
fn reallocate_null_behaves_as_allocate() {
  let mut heap = Heap::init().expect("init");
  let p = unsafe { heap.reallocate(std::ptr::null_mut(), 32) };
  assert!(!p.is_null());
}

#[test]
fn reallocate_zero_frees_and_returns_null() {
  let mut heap = Heap::init().expect("init");
  let p = heap.allocate(32);
  let q = unsafe { heap.reallocate(p, 0) };
  assert!(q.is_null());
}

#[test]
fn many_interleaved_allocations_stay_sane() {
  let mut heap = Heap::init().expect("init");
  let mut live = Vec::new();
  for i in 0..200 {
    let size = 8 + (i % 37) * 8;
    let p = heap.allocate(size);
    assert!(!p.is_null());
    live.push(p);
    if i % 3 == 0 {
      if let Some(old) = live.pop() {
        unsafe { heap.free(old) };
      }
    }
  }
  for p in live {
    unsafe { heap.free(p) };
  }
  assert!(heap.check_heap(line!()));
}
