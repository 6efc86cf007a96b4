use std::io::Read;

use segheap::Heap;

/// Waits until the user presses ENTER.
/// Useful when you want to step through the walkthrough one allocation at a
/// time instead of reading a flat log.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_region(label: &str, heap: &Heap) {
  println!("[{label}] consistency_check = {:?}", heap.consistency_check());
}

fn main() {
  // RUST_LOG=segheap=trace cargo run --example heap_demo shows every bin
  // insert/remove and region extension as it happens.
  env_logger::init();

  // A heap is just an owned reservation; unlike a process-wide allocator
  // there's no global state to initialize first.
  let mut heap = Heap::new(1 << 16);
  print_region("start", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate a handful of small blocks.
  // --------------------------------------------------------------------
  println!("\n[1] Allocate three 64-byte blocks");
  let a = heap.allocate(64).expect("region has room");
  let b = heap.allocate(64).expect("region has room");
  let c = heap.allocate(64).expect("region has room");
  unsafe {
    *(a.as_ptr() as *mut u32) = 0xDEADBEEF;
  }
  println!("[1] a = {a:p}, b = {b:p}, c = {c:p}");
  print_region("1", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release the middle block and watch it go back into a bin.
  // --------------------------------------------------------------------
  println!("\n[2] Release the middle block (b)");
  heap.release(b);
  print_region("2", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Allocate a same-size block again - it should reuse b's address.
  // --------------------------------------------------------------------
  println!("\n[3] Allocate another 64-byte block");
  let d = heap.allocate(64).expect("region has room");
  println!("[3] d = {d:p} (b was {b:p}, reused: {})", d == b);
  print_region("3", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Release a and d, then release c - forward/backward coalescing
  //    should merge all three into one free run.
  // --------------------------------------------------------------------
  println!("\n[4] Release a, d, then c; allocate their combined size back");
  heap.release(a);
  heap.release(d);
  heap.release(c);
  let whole = heap.allocate(64 * 3 - 24).expect("coalesced run has room");
  println!("[4] whole = {whole:p} (a was {a:p}, reused via coalescing: {})", whole == a);
  print_region("4", &heap);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Grow the last block in place.
  // --------------------------------------------------------------------
  println!("\n[5] Reallocate the last block to 4x its size");
  let grown = heap.reallocate(whole, (64 * 3 - 24) * 4).expect("region has room to grow");
  println!("[5] grown = {grown:p} (in place: {})", grown == whole);
  print_region("5", &heap);

  heap.release(grown);
  print_region("end", &heap);
}
