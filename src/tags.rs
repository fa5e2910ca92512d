//! # Boundary Tags
//!
//! The word-level layer of the allocator. Every block in the heap carries
//! its size and allocation state twice, in a one-word *header* and a
//! one-word *footer*:
//!
//! ```text
//!   A block of `size` bytes (size is a multiple of 8, at least 16):
//!
//!   bp - 4          bp                             bp + size - 8   bp + size
//!     ┌────────────┬──────────────────────────────┬────────────┐
//!     │  HEADER    │   PAYLOAD (size - 8 bytes)   │  FOOTER    │
//!     │ size|alloc │                              │ size|alloc │
//!     └────────────┴──────────────────────────────┴────────────┘
//!                  ▲
//!                  └── block pointer `bp` (returned to the user,
//!                      always 8-byte aligned)
//! ```
//!
//! Because `size` is a multiple of 8 its low three bits are zero, so the
//! allocation state fits in bit 0 of the same word. The duplicated footer
//! is what makes backward navigation O(1): the footer of the *previous*
//! block sits directly below this block's header, so `prev_block` is a
//! single word read away.
//!
//! All raw pointer arithmetic of the crate funnels through the accessors
//! in this module; the layers above deal in whole blocks.

use crate::ALIGNMENT;

/// Word size in bytes. Headers, footers and free-list links are one word.
pub(crate) const WSIZE: usize = 4;

/// Double-word size in bytes; payloads are aligned to this.
pub(crate) const DSIZE: usize = 8;

/// Smallest representable block: header + two link words + footer.
pub const MIN_BLOCK: usize = 16;

/// Default heap extension step in bytes.
pub const CHUNK_SIZE: usize = 4096;

const _: () = assert!(MIN_BLOCK == 4 * WSIZE);
const _: () = assert!(DSIZE == ALIGNMENT);
const _: () = assert!(CHUNK_SIZE % DSIZE == 0);

/// Reads the word at `p`.
///
/// # Safety
///
/// `p` must point to a readable, 4-byte aligned word inside the region.
#[inline]
pub(crate) unsafe fn load(p: *const u8) -> u32 {
  unsafe { (p as *const u32).read() }
}

/// Writes the word at `p`.
///
/// # Safety
///
/// `p` must point to a writable, 4-byte aligned word inside the region.
#[inline]
pub(crate) unsafe fn store(
  p: *mut u8,
  word: u32,
) {
  unsafe { (p as *mut u32).write(word) }
}

/// Packs a block size and an allocation bit into one tag word.
#[inline]
pub(crate) fn pack(
  size: usize,
  allocated: bool,
) -> u32 {
  debug_assert!(size % ALIGNMENT == 0, "block sizes keep the low 3 bits free");
  size as u32 | allocated as u32
}

/// Address of the header of the block whose payload starts at `bp`.
#[inline]
pub(crate) unsafe fn header(bp: *mut u8) -> *mut u8 {
  unsafe { bp.sub(WSIZE) }
}

/// Address of the footer of the block whose payload starts at `bp`.
#[inline]
pub(crate) unsafe fn footer(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(block_size(bp)).sub(DSIZE) }
}

/// Size in bytes of the block at `bp`, header and footer included.
#[inline]
pub(crate) unsafe fn block_size(bp: *mut u8) -> usize {
  unsafe { (load(header(bp)) & !0x7) as usize }
}

/// Allocation bit of the block at `bp`.
#[inline]
pub(crate) unsafe fn is_allocated(bp: *mut u8) -> bool {
  unsafe { load(header(bp)) & 0x1 != 0 }
}

/// Payload pointer of the block directly above `bp` in the heap.
#[inline]
pub(crate) unsafe fn next_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(block_size(bp)) }
}

/// Payload pointer of the block directly below `bp` in the heap.
///
/// Reads the previous block's footer, which sits at `bp - 8`.
#[inline]
pub(crate) unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.sub((load(bp.sub(DSIZE)) & !0x7) as usize) }
}

/// Writes matching header and footer tags for a block of `size` bytes
/// at `bp`. The footer position is derived from `size`, not from the old
/// header, so this also installs tags on fresh memory.
#[inline]
pub(crate) unsafe fn write_tags(
  bp: *mut u8,
  size: usize,
  allocated: bool,
) {
  let tag = pack(size, allocated);
  unsafe {
    store(header(bp), tag);
    store(bp.add(size).sub(DSIZE), tag);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// An 8-byte aligned scratch buffer standing in for a heap slice.
  #[repr(align(8))]
  struct Scratch([u8; 128]);

  #[test]
  fn pack_splits_back_into_size_and_alloc() {
    assert_eq!(pack(16, true), 17);
    assert_eq!(pack(16, false), 16);
    assert_eq!(pack(4096, true) & !0x7, 4096);
    assert_eq!(pack(4096, true) & 0x1, 1);
  }

  #[test]
  fn tags_roundtrip_through_header_and_footer() {
    let mut scratch = Scratch([0; 128]);

    unsafe {
      // Payload starts one word in, leaving room for the header.
      let bp = scratch.0.as_mut_ptr().add(2 * WSIZE);
      write_tags(bp, 24, true);

      assert_eq!(block_size(bp), 24);
      assert!(is_allocated(bp));
      assert_eq!(load(header(bp)), load(footer(bp)));

      write_tags(bp, 24, false);
      assert!(!is_allocated(bp));
    }
  }

  #[test]
  fn linear_navigation_crosses_adjacent_blocks() {
    let mut scratch = Scratch([0; 128]);

    unsafe {
      let first = scratch.0.as_mut_ptr().add(2 * WSIZE);
      write_tags(first, 32, true);

      let second = next_block(first);
      assert_eq!(second as usize - first as usize, 32);
      write_tags(second, 16, false);

      assert_eq!(prev_block(second), first);
      assert_eq!(next_block(second) as usize - second as usize, 16);
    }
  }
}
