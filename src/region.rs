//! # Region Providers
//!
//! The allocator does not talk to the operating system itself; it is
//! parameterized over a [`Region`], a contiguous byte span that can only
//! grow. Two providers are included:
//!
//! - [`SbrkRegion`] extends the program's data segment with `sbrk(2)`,
//!   the classic way a malloc obtains memory:
//!
//! ```text
//!   Virtual Memory Layout
//!   ┌─────────────────────┐ High addresses
//!   │       Stack         │ ↓ grows down
//!   │         │           │
//!   │         ▼           │
//!   │                     │
//!   │         ▲           │
//!   │         │           │
//!   │       Heap          │ ↑ grows up (via sbrk)
//!   ├─────────────────────┤ ← Program break (brk)
//!   │   BSS / Data / Text │
//!   └─────────────────────┘ Low addresses
//! ```
//!
//! - [`ArenaRegion`] simulates the same contract inside a fixed-capacity
//!   buffer obtained from the global allocator. Tests and benches use it:
//!   it keeps the program break alone, and running it out of capacity is
//!   the way to exercise the out-of-memory paths deterministically.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::error::AllocError;
use crate::{align, align_to, ALIGNMENT};

/// A contiguous, monotonically-growable memory region.
///
/// The allocator assumes exclusive ownership: between `init` and drop,
/// nobody else may grow the same region.
pub trait Region {
  /// Grows the region by exactly `bytes` (always a positive multiple of
  /// the word size) and returns the address of the first newly mapped
  /// byte, or null if the provider refuses.
  fn extend(&mut self, bytes: usize) -> *mut u8;

  /// Lowest address of the region.
  fn heap_lo(&self) -> *mut u8;

  /// Last mapped byte of the region (equals `heap_lo` while empty).
  fn heap_hi(&self) -> *mut u8;
}

/// Region provider backed by the real program break.
///
/// The break observed at construction time becomes `heap_lo`, padded up
/// to the payload alignment first. Growth is contiguous as long as no
/// other code in the process moves the break; `extend` refuses (returns
/// null) if it observes that somebody else did.
pub struct SbrkRegion {
  lo: *mut u8,
  brk: *mut u8,
}

impl SbrkRegion {
  pub fn new() -> Self {
    unsafe {
      let mut brk = sbrk(0) as *mut u8;

      // Burn the slack below the next 8-byte boundary so that payloads
      // come out aligned.
      let aligned = align_to!(brk as usize, ALIGNMENT);
      if aligned != brk as usize
        && sbrk((aligned - brk as usize) as intptr_t) != usize::MAX as *mut c_void
      {
        brk = aligned as *mut u8;
      }

      Self { lo: brk, brk }
    }
  }
}

impl Default for SbrkRegion {
  fn default() -> Self {
    Self::new()
  }
}

impl Region for SbrkRegion {
  fn extend(&mut self, bytes: usize) -> *mut u8 {
    let old = unsafe { sbrk(bytes as intptr_t) };
    if old == usize::MAX as *mut c_void {
      // sbrk returns (void*)-1 on failure
      return ptr::null_mut();
    }

    let old = old as *mut u8;
    if old != self.brk {
      // Another sbrk user moved the break; the region is no longer
      // contiguous and must not grow into foreign memory.
      return ptr::null_mut();
    }

    self.brk = unsafe { old.add(bytes) };
    old
  }

  fn heap_lo(&self) -> *mut u8 {
    self.lo
  }

  fn heap_hi(&self) -> *mut u8 {
    if self.brk == self.lo {
      self.lo
    } else {
      unsafe { self.brk.sub(1) }
    }
  }
}

/// Region provider backed by one fixed-capacity buffer.
///
/// `extend` bumps a software break inside the buffer and fails once the
/// capacity is spent, which makes OOM reproducible in tests.
pub struct ArenaRegion {
  buf: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

impl ArenaRegion {
  /// Reserves a region of (at least) `capacity` bytes, rounded up to the
  /// payload alignment.
  pub fn new(capacity: usize) -> Result<Self, AllocError> {
    let layout = Layout::from_size_align(align!(capacity.max(ALIGNMENT)), ALIGNMENT)
      .map_err(|_| AllocError::Oom)?;

    let ptr = unsafe { alloc(layout) };
    match NonNull::new(ptr) {
      Some(buf) => Ok(Self { buf, layout, brk: 0 }),
      None => Err(AllocError::Oom),
    }
  }

  /// Total capacity in bytes.
  pub fn capacity(&self) -> usize {
    self.layout.size()
  }
}

impl Region for ArenaRegion {
  fn extend(&mut self, bytes: usize) -> *mut u8 {
    if bytes > self.layout.size() - self.brk {
      return ptr::null_mut();
    }

    let p = unsafe { self.buf.as_ptr().add(self.brk) };
    self.brk += bytes;
    p
  }

  fn heap_lo(&self) -> *mut u8 {
    self.buf.as_ptr()
  }

  fn heap_hi(&self) -> *mut u8 {
    if self.brk == 0 {
      self.buf.as_ptr()
    } else {
      unsafe { self.buf.as_ptr().add(self.brk - 1) }
    }
  }
}

impl Drop for ArenaRegion {
  fn drop(&mut self) {
    unsafe { dealloc(self.buf.as_ptr(), self.layout) }
  }
}
