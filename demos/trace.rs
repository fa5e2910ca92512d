//! Replays a small allocation trace over the real program break.
//!
//! Run with `cargo run --example trace`; set `RUST_LOG=trace` to watch
//! the heap extensions as they happen.

use libc::sbrk;
use tagalloc::{ListAllocator, SbrkRegion};

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
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

  // The driver tuple format: a = allocate, r = reallocate, f = release.
  // Ids index the slot table below.
  let trace: &[(char, usize, usize)] = &[
    ('a', 0, 24),
    ('a', 1, 512),
    ('a', 2, 128),
    ('f', 1, 0),
    ('a', 3, 300),
    ('r', 0, 1000),
    ('f', 2, 0),
    ('a', 4, 8000),
    ('f', 3, 0),
    ('f', 0, 0),
    ('f', 4, 0),
  ];

  unsafe { print_program_break("start") };

  let mut heap = match ListAllocator::init(SbrkRegion::new()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("heap initialization failed: {err}");
      std::process::exit(1);
    }
  };

  unsafe { print_program_break("after init") };

  let mut slots = vec![std::ptr::null_mut::<u8>(); trace.len()];

  for &(op, id, size) in trace {
    match op {
      'a' => {
        slots[id] = heap.allocate(size);
        println!("allocate({size:5}) -> id {id} at {:?}", slots[id]);
      }
      'r' => {
        slots[id] = unsafe { heap.reallocate(slots[id], size) };
        println!("reallocate(id {id}, {size:5}) -> {:?}", slots[id]);
      }
      'f' => {
        unsafe { heap.release(slots[id]) };
        println!("release(id {id})");
        slots[id] = std::ptr::null_mut();
      }
      _ => unreachable!(),
    }
  }

  unsafe { print_program_break("after replay") };

  println!(
    "heap checker: {}",
    if heap.check() { "all invariants hold" } else { "CORRUPT" },
  );
}
