use std::io::Read;

use freeheap::Heap;
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the program
/// break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  env_logger::init();

  // `Heap::init()` requests the first chunk from the host immediately, so
  // the program break has already moved once this returns.
  let mut heap = Heap::init().expect("host refused the initial heap region");

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 48 bytes and write through the pointer.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(48);
    println!("\n[1] Allocate 48 bytes -> {:?}", first_block);
    (first_block as *mut u32).write(0xDEADBEEF);
    println!("[1] Value written = {:#X}", (first_block as *mut u32).read());
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate a second, smaller block to show first-fit placement
    //    continuing to bump forward through untouched heap.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes -> {:?}", second_block);
    std::ptr::write_bytes(second_block, 0xAB, 12);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the first block, then immediately allocate a similarly
    //    sized block: unlike a bump allocator, this one reuses the hole.
    // --------------------------------------------------------------------
    heap.free(first_block);
    println!("\n[3] Freed first_block at {:?}", first_block);

    let third_block = heap.allocate(40);
    println!(
      "[3] Allocated 40 bytes -> {:?} (reused freed block? {})",
      third_block,
      third_block == first_block
    );
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow an allocation past its current block with reallocate,
    //    which copies into a fresh block when growth cannot happen in
    //    place.
    // --------------------------------------------------------------------
    let grown = heap.reallocate(second_block, 256);
    println!("\n[4] Reallocated 12 -> 256 bytes: {:?} -> {:?}", second_block, grown);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Allocate something large enough to force a fresh heap extension,
    //    observing the program break move again.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big_block = heap.allocate(64 * 1024);
    println!("\n[5] Allocate a large 64 KiB block -> {:?}", big_block);
    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Run the structural integrity checker before exiting.
    // --------------------------------------------------------------------
    let sane = heap.check_heap(line!());
    println!("\n[6] check_heap -> {sane}");

    heap.free(grown);
    heap.free(third_block);
    heap.free(big_block);

    println!("\n[7] End of demo. Process will exit and the OS will reclaim all memory.");
  }
}
