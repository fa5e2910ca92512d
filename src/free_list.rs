//! # Explicit Free List
//!
//! A doubly-linked list threaded through the payloads of free blocks.
//! The first two payload words of a free block hold its neighbors:
//!
//! ```text
//!     bp - 4      bp          bp + 4      bp + 8
//!       ┌───────────┬───────────┬───────────┬─────────┬───────────┐
//!       │  HEADER   │ prev_free │ next_free │  ...    │  FOOTER   │
//!       └───────────┴───────────┴───────────┴─────────┴───────────┘
//! ```
//!
//! Links are stored as 32-bit byte offsets from the region base rather
//! than as raw addresses, so the layout is identical on 32- and 64-bit
//! targets and the 16-byte minimum block still fits header, both links
//! and footer. The region is therefore limited to 4 GiB.
//!
//! The offset `NIL` (0) means "no neighbor". Offset 0 is the permanent
//! alignment-padding word at the base of the region and can never be a
//! payload, so the sentinel cannot collide with a real link.
//!
//! Insertion is LIFO at the head; removal is O(1) given the block.

use std::ptr;

use crate::tags::{block_size, load, store, WSIZE};

/// "No neighbor" link value, a reserved offset.
pub(crate) const NIL: u32 = 0;

/// Head of the explicit free list.
///
/// The list does not own any memory; it only threads links through free
/// payloads that live inside the region owned by the allocator.
pub(crate) struct FreeList {
  head: u32,
}

#[inline]
fn offset_of(
  base: *mut u8,
  bp: *mut u8,
) -> u32 {
  let off = bp as usize - base as usize;
  debug_assert!(off > 0 && off <= u32::MAX as usize);
  off as u32
}

#[inline]
unsafe fn at(
  base: *mut u8,
  off: u32,
) -> *mut u8 {
  unsafe { base.add(off as usize) }
}

impl FreeList {
  pub(crate) const fn new() -> Self {
    Self { head: NIL }
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.head == NIL
  }

  /// Payload pointer of the head block, or null for an empty list.
  pub(crate) unsafe fn head_ptr(&self, base: *mut u8) -> *mut u8 {
    if self.head == NIL {
      ptr::null_mut()
    } else {
      unsafe { at(base, self.head) }
    }
  }

  /// `prev_free` link of the free block at `bp`.
  #[inline]
  pub(crate) unsafe fn prev_of(bp: *mut u8) -> u32 {
    unsafe { load(bp) }
  }

  /// `next_free` link of the free block at `bp`.
  #[inline]
  pub(crate) unsafe fn next_of(bp: *mut u8) -> u32 {
    unsafe { load(bp.add(WSIZE)) }
  }

  #[inline]
  unsafe fn set_prev(
    bp: *mut u8,
    off: u32,
  ) {
    unsafe { store(bp, off) }
  }

  #[inline]
  unsafe fn set_next(
    bp: *mut u8,
    off: u32,
  ) {
    unsafe { store(bp.add(WSIZE), off) }
  }

  /// Successor of `bp` in the list, or null at the tail.
  pub(crate) unsafe fn next_ptr(
    base: *mut u8,
    bp: *mut u8,
  ) -> *mut u8 {
    let next = unsafe { Self::next_of(bp) };
    if next == NIL {
      ptr::null_mut()
    } else {
      unsafe { at(base, next) }
    }
  }

  /// Pushes the free block at `bp` onto the head of the list.
  ///
  /// # Safety
  ///
  /// `bp` must be the payload of a free block inside the region starting
  /// at `base`, and must not already be on the list.
  pub(crate) unsafe fn push(
    &mut self,
    base: *mut u8,
    bp: *mut u8,
  ) {
    let off = offset_of(base, bp);

    unsafe {
      if self.head == NIL {
        Self::set_prev(bp, NIL);
        Self::set_next(bp, NIL);
      } else {
        Self::set_prev(at(base, self.head), off);
        Self::set_prev(bp, NIL);
        Self::set_next(bp, self.head);
      }
    }

    self.head = off;
  }

  /// Unlinks the free block at `bp` from the list.
  ///
  /// Four cases, keyed on whether the block has a predecessor and a
  /// successor.
  ///
  /// # Safety
  ///
  /// `bp` must currently be on this list.
  pub(crate) unsafe fn remove(
    &mut self,
    base: *mut u8,
    bp: *mut u8,
  ) {
    unsafe {
      let prev = Self::prev_of(bp);
      let next = Self::next_of(bp);

      match (prev == NIL, next == NIL) {
        // Only element.
        (true, true) => self.head = NIL,
        // Head of a longer list.
        (true, false) => {
          self.head = next;
          Self::set_prev(at(base, next), NIL);
        }
        // Tail.
        (false, true) => Self::set_next(at(base, prev), NIL),
        // Interior.
        (false, false) => {
          Self::set_next(at(base, prev), next);
          Self::set_prev(at(base, next), prev);
        }
      }
    }
  }

  /// First-fit search: the first block on the list whose size is at
  /// least `asize`, or null if none fits.
  pub(crate) unsafe fn first_fit(
    &self,
    base: *mut u8,
    asize: usize,
  ) -> *mut u8 {
    let mut off = self.head;

    while off != NIL {
      let bp = unsafe { at(base, off) };
      if unsafe { block_size(bp) } >= asize {
        return bp;
      }
      off = unsafe { Self::next_of(bp) };
    }

    ptr::null_mut()
  }

  /// Whether `bp` is on the list. Linear; used by the heap checker.
  ///
  /// The walk gives up after `limit` steps so a corrupted cyclic list
  /// reports a miss instead of hanging.
  pub(crate) unsafe fn contains(
    &self,
    base: *mut u8,
    bp: *mut u8,
    limit: usize,
  ) -> bool {
    let target = offset_of(base, bp);
    let mut off = self.head;
    let mut steps = 0;

    while off != NIL && steps <= limit {
      if off == target {
        return true;
      }
      off = unsafe { Self::next_of(at(base, off)) };
      steps += 1;
    }

    false
  }
}
