//! # Heap Checker
//!
//! Audits the allocator's invariants at a quiescent point. Each audit
//! walks the heap (or the free list) on its own and reports the first
//! violation it sees through `log::error!`; the combined [`check`]
//! succeeds only when every audit does.
//!
//! The checker never repairs anything: a failed audit means the heap is
//! corrupt and the allocator's behavior is no longer defined.
//!
//! [`check`]: ListAllocator::check

use log::error;

use crate::free_list::FreeList;
use crate::list::ListAllocator;
use crate::region::Region;
use crate::tags::{block_size, footer, header, is_allocated, load, next_block, WSIZE};
use crate::ALIGNMENT;

impl<R: Region> ListAllocator<R> {
  /// Audits the whole heap. Returns `true` iff every invariant holds:
  ///
  /// 1. every free-list entry is marked free;
  /// 2. no two adjacent free blocks escaped coalescing;
  /// 3. every free block is on the free list;
  /// 4. no allocated block runs into its successor;
  /// 5. every block lies inside the region, payload 8-byte aligned;
  /// 6. header and footer of every block agree.
  pub fn check(&self) -> bool {
    let blocks = match self.count_blocks() {
      Some(blocks) => blocks,
      None => return false,
    };

    self.free_list_marked_free(blocks)
      && self.no_adjacent_free_blocks()
      && self.free_blocks_listed(blocks)
      && self.no_allocated_overlap()
      && self.blocks_in_bounds()
      && self.tags_consistent()
  }

  /// Counts blocks by linear traversal, prologue included.
  ///
  /// Also serves as the traversal sanity gate: a size field corrupted to
  /// step past the region end is reported here, and the count bounds the
  /// free-list walks below so a cyclic list cannot hang the checker.
  fn count_blocks(&self) -> Option<usize> {
    let hi = self.region().heap_hi();
    let mut count = 0;

    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        if bp as usize > hi as usize {
          error!("traversal ran past the region end at {bp:p}");
          return None;
        }
        count += 1;
        bp = next_block(bp);
      }
    }

    Some(count)
  }

  /// Every block reachable over `next_free` has its alloc bit clear.
  fn free_list_marked_free(&self, limit: usize) -> bool {
    let base = self.base();
    let mut steps = 0;

    unsafe {
      let mut bp = self.free.head_ptr(base);
      while !bp.is_null() {
        if steps > limit {
          error!("free list does not terminate within {limit} blocks");
          return false;
        }
        if is_allocated(bp) {
          error!("block {bp:p} is on the free list but marked allocated");
          return false;
        }
        steps += 1;
        bp = FreeList::next_ptr(base, bp);
      }
    }

    true
  }

  /// No two address-adjacent free blocks exist.
  fn no_adjacent_free_blocks(&self) -> bool {
    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        if !is_allocated(bp) && !is_allocated(next_block(bp)) {
          error!("adjacent free blocks at {bp:p} escaped coalescing");
          return false;
        }
        bp = next_block(bp);
      }
    }

    true
  }

  /// Every free block found linearly is a member of the free list.
  fn free_blocks_listed(&self, limit: usize) -> bool {
    let base = self.base();

    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        if !is_allocated(bp) && !self.free.contains(base, bp, limit) {
          error!("free block {bp:p} is missing from the free list");
          return false;
        }
        bp = next_block(bp);
      }
    }

    true
  }

  /// No allocated block's tag region reaches its successor's header.
  fn no_allocated_overlap(&self) -> bool {
    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        let next = next_block(bp);
        if is_allocated(bp) && bp.add(block_size(bp)).sub(WSIZE) >= next {
          error!("allocated block {bp:p} overlaps its successor {next:p}");
          return false;
        }
        bp = next;
      }
    }

    true
  }

  /// Every header lies within the region and every payload is aligned.
  fn blocks_in_bounds(&self) -> bool {
    let lo = self.region().heap_lo() as usize;
    let hi = self.region().heap_hi() as usize;

    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        let hdr = header(bp) as usize;
        if hdr < lo || hdr > hi {
          error!("block {bp:p} lies outside the region");
          return false;
        }
        if bp as usize % ALIGNMENT != 0 {
          error!("payload {bp:p} is not {ALIGNMENT}-byte aligned");
          return false;
        }
        bp = next_block(bp);
      }

      // The epilogue header is the last word the allocator owns.
      let epilogue = self.epilogue as usize;
      if epilogue < lo || epilogue + WSIZE - 1 > hi {
        error!("epilogue at {:p} lies outside the region", self.epilogue);
        return false;
      }
    }

    true
  }

  /// Header and footer of every block agree on size and state.
  fn tags_consistent(&self) -> bool {
    unsafe {
      let mut bp = self.prologue;
      while block_size(bp) != 0 {
        if load(header(bp)) != load(footer(bp)) {
          error!("header/footer mismatch at {bp:p}");
          return false;
        }
        bp = next_block(bp);
      }
    }

    true
  }
}
