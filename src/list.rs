//! # Explicit Free-List Allocator
//!
//! The facade tying the boundary-tag layer, the free list and a region
//! provider together into a malloc/free/realloc-style interface.
//!
//! ## Heap shape
//!
//! The region always looks like this between public calls:
//!
//! ```text
//!    heap_lo
//!       │
//!       ▼
//!   ┌───────┬─────────┬─────────┬────────┬────────┬─────┬────────┬──────────┐
//!   │  pad  │prologue │prologue │ block  │ block  │ ... │ block  │ epilogue │
//!   │  (4)  │ hdr 8|1 │ ftr 8|1 │        │        │     │        │ hdr 0|1  │
//!   └───────┴─────────┴─────────┴────────┴────────┴─────┴────────┴──────────┘
//!                     ▲                                           ▲
//!                     └── prologue payload pointer               └── epilogue
//! ```
//!
//! The prologue and epilogue are permanent, always-allocated sentinels:
//! coalescing reads its neighbors' allocation bits, and the sentinels make
//! the first and last real block look like they have allocated neighbors,
//! so there is no boundary special-casing anywhere in the merge logic.
//!
//! ## Allocation flow
//!
//! ```text
//!   allocate(size)
//!     ├── round size up to an aligned block size (asize)
//!     ├── first-fit scan of the free list
//!     │     ├── hit  → place(bp, asize), splitting off the remainder
//!     │     │         when it can still hold a minimum block
//!     │     └── miss → extend the region by max(asize, CHUNK_SIZE),
//!     │               coalesce with a free old tail, then place
//!     └── return the payload pointer (null on provider failure)
//!
//!   release(ptr)
//!     ├── rewrite both tags as free
//!     ├── coalesce with free neighbors (4 cases via boundary tags)
//!     └── push the merged block on the free list
//! ```

use std::ptr;

use log::trace;

use crate::align;
use crate::error::AllocError;
use crate::ALIGNMENT;
use crate::free_list::FreeList;
use crate::region::Region;
use crate::tags::{
  block_size, header, is_allocated, next_block, pack, prev_block, store, write_tags, CHUNK_SIZE,
  DSIZE, MIN_BLOCK, WSIZE,
};

/// An explicit free-list allocator over a growable region.
///
/// The allocator owns its region exclusively; all anchor state lives in
/// the instance, so independent heaps can coexist over independent
/// regions.
///
/// # Thread Safety
///
/// Not thread-safe. The raw-pointer anchors keep the type `!Send` and
/// `!Sync`; wrap it in external synchronization if you must share it.
pub struct ListAllocator<R: Region> {
  region: R,

  /// Payload pointer of the prologue sentinel; linear traversal starts
  /// here.
  pub(crate) prologue: *mut u8,

  /// Address of the epilogue header, the zero-size allocated tag that
  /// terminates the heap.
  pub(crate) epilogue: *mut u8,

  /// Explicit free list threaded through free payloads.
  pub(crate) free: FreeList,
}

impl<R: Region> ListAllocator<R> {
  /// Initializes an empty heap inside `region` and seeds it with one
  /// free block of [`CHUNK_SIZE`](crate::CHUNK_SIZE) bytes.
  ///
  /// Lays down the sentinels first:
  ///
  /// ```text
  ///   [ pad ][ prologue hdr (8,1) ][ prologue ftr (8,1) ][ epilogue (0,1) ]
  /// ```
  ///
  /// Fails with [`AllocError::Oom`] if the region refuses either the
  /// sentinel words or the initial chunk.
  pub fn init(mut region: R) -> Result<Self, AllocError> {
    let start = region.extend(4 * WSIZE);
    if start.is_null() {
      return Err(AllocError::Oom);
    }

    unsafe {
      store(start, 0); // alignment padding, also the NIL link target
      store(start.add(WSIZE), pack(DSIZE, true)); // prologue header
      store(start.add(2 * WSIZE), pack(DSIZE, true)); // prologue footer
      store(start.add(3 * WSIZE), pack(0, true)); // epilogue header
    }

    let mut heap = Self {
      region,
      prologue: unsafe { start.add(2 * WSIZE) },
      epilogue: unsafe { start.add(3 * WSIZE) },
      free: FreeList::new(),
    };

    if unsafe { heap.extend(CHUNK_SIZE / WSIZE) }.is_null() {
      return Err(AllocError::Oom);
    }

    Ok(heap)
  }

  /// Allocates a block with at least `size` usable bytes and returns its
  /// payload pointer, 8-byte aligned.
  ///
  /// Returns null when `size` is 0 (a no-op, not an error) or when the
  /// region provider refuses to grow the heap.
  pub fn allocate(&mut self, size: usize) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    // Reserve a double word for the tags and round up; tiny requests
    // land on the minimum block. Tag words are 32-bit, so sizes the
    // header cannot represent are refused outright.
    let asize = if size <= DSIZE {
      MIN_BLOCK
    } else {
      match size.checked_add(DSIZE + (ALIGNMENT - 1)) {
        Some(padded) => padded & !(ALIGNMENT - 1),
        None => return ptr::null_mut(),
      }
    };
    if asize > u32::MAX as usize {
      return ptr::null_mut();
    }

    let bp = unsafe { self.free.first_fit(self.base(), asize) };
    if !bp.is_null() {
      unsafe { self.place(bp, asize) };
      return bp;
    }

    // No fit: grow the heap by at least one chunk and carve from the
    // new (possibly tail-merged) free block.
    let extend_size = asize.max(CHUNK_SIZE);
    let bp = unsafe { self.extend(extend_size / WSIZE) };
    if bp.is_null() {
      return ptr::null_mut();
    }

    unsafe { self.place(bp, asize) };
    bp
  }

  /// Releases the block at `ptr`, coalescing it with any free neighbors.
  /// Null is a no-op.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a payload pointer obtained from [`allocate`]
  /// or [`reallocate`] on this allocator that has not been released
  /// since. Double frees and foreign pointers are undefined behavior.
  ///
  /// [`allocate`]: Self::allocate
  /// [`reallocate`]: Self::reallocate
  pub unsafe fn release(&mut self, ptr: *mut u8) {
    if ptr.is_null() {
      return;
    }

    unsafe {
      let size = block_size(ptr);
      write_tags(ptr, size, false);
      self.coalesce(ptr);
    }
  }

  /// Resizes the allocation at `ptr` to `size` usable bytes, moving it.
  ///
  /// The usable prefix (`min(size, old payload size)`) is preserved.
  /// A null `ptr` behaves like [`allocate`]; `size == 0` behaves like
  /// [`release`] and returns null. On provider failure the old block is
  /// left untouched and null is returned.
  ///
  /// # Safety
  ///
  /// Same contract as [`release`] for non-null `ptr`.
  ///
  /// [`allocate`]: Self::allocate
  /// [`release`]: Self::release
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    if ptr.is_null() {
      return self.allocate(size);
    }

    if size == 0 {
      unsafe { self.release(ptr) };
      return ptr::null_mut();
    }

    let new = self.allocate(size);
    if new.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      let old_payload = block_size(ptr) - DSIZE;
      ptr::copy_nonoverlapping(ptr, new, old_payload.min(size));
      self.release(ptr);
    }

    new
  }

  /// Usable payload bytes of the allocation at `ptr`.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live payload pointer from this allocator.
  pub unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
    unsafe { block_size(ptr) - DSIZE }
  }

  /// Lowest address of the underlying region; link offsets are relative
  /// to it.
  #[inline]
  pub(crate) fn base(&self) -> *mut u8 {
    self.region.heap_lo()
  }

  #[inline]
  pub(crate) fn region(&self) -> &R {
    &self.region
  }

  /// Grows the heap by `words` words (rounded up so the new block stays
  /// 8-byte aligned) and returns the resulting free block, coalesced
  /// with the old tail if that was free.
  ///
  /// The new block's header overwrites the old epilogue; a fresh
  /// epilogue is written after the block.
  unsafe fn extend(&mut self, words: usize) -> *mut u8 {
    let size = align!(words * WSIZE);

    let bp = self.region.extend(size);
    if bp.is_null() {
      return ptr::null_mut();
    }

    unsafe {
      write_tags(bp, size, false);
      let epilogue = header(next_block(bp));
      store(epilogue, pack(0, true));
      self.epilogue = epilogue;

      trace!("extended heap by {size} bytes, epilogue at {epilogue:p}");

      self.coalesce(bp)
    }
  }

  /// Allocates `asize` bytes inside the free block at `bp`.
  ///
  /// Splits when the remainder can still hold a minimum block; the
  /// allocated half keeps the low address so `bp` stays the payload
  /// pointer. Otherwise the whole block is charged to the allocation.
  unsafe fn place(
    &mut self,
    bp: *mut u8,
    asize: usize,
  ) {
    let base = self.base();

    unsafe {
      let csize = block_size(bp);
      self.free.remove(base, bp);

      if csize - asize >= MIN_BLOCK {
        write_tags(bp, asize, true);

        let remainder = next_block(bp);
        write_tags(remainder, csize - asize, false);
        self.free.push(base, remainder);
      } else {
        write_tags(bp, csize, true);
      }
    }
  }

  /// Merges the free (not yet listed) block at `bp` with its free
  /// neighbors, pushes the result on the free list and returns its
  /// payload pointer.
  ///
  /// The four cases, keyed on the neighbors' allocation bits; the
  /// sentinels guarantee both reads are valid at the heap boundaries:
  ///
  /// ```text
  ///   1. alloc │ bp │ alloc      keep bp
  ///   2. alloc │ bp │ free       absorb next into bp
  ///   3. free  │ bp │ alloc      absorb bp into prev
  ///   4. free  │ bp │ free       absorb bp and next into prev
  /// ```
  unsafe fn coalesce(&mut self, bp: *mut u8) -> *mut u8 {
    let base = self.base();

    unsafe {
      let prev_allocated = is_allocated(prev_block(bp));
      let next_allocated = is_allocated(next_block(bp));

      let mut bp = bp;
      let mut size = block_size(bp);

      match (prev_allocated, next_allocated) {
        (true, true) => {}

        (true, false) => {
          let next = next_block(bp);
          size += block_size(next);
          self.free.remove(base, next);
          write_tags(bp, size, false);
        }

        (false, true) => {
          let prev = prev_block(bp);
          size += block_size(prev);
          self.free.remove(base, prev);
          write_tags(prev, size, false);
          bp = prev;
        }

        (false, false) => {
          let prev = prev_block(bp);
          let next = next_block(bp);
          size += block_size(prev) + block_size(next);
          self.free.remove(base, prev);
          self.free.remove(base, next);
          write_tags(prev, size, false);
          bp = prev;
        }
      }

      self.free.push(base, bp);
      bp
    }
  }

  /// Logs one line per block (address, size, state) at debug level.
  /// Purely diagnostic.
  pub fn dump(&self) {
    unsafe {
      let mut bp = self.prologue;
      log::debug!("heap [{:p}..{:p}]", self.region.heap_lo(), self.region.heap_hi());

      loop {
        let size = block_size(bp);
        if size == 0 {
          log::debug!("  {:p} epilogue", header(bp));
          break;
        }
        log::debug!(
          "  {:p} size {:5} {}",
          bp,
          size,
          if is_allocated(bp) { "allocated" } else { "free" },
        );
        bp = next_block(bp);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::region::ArenaRegion;
  use crate::ALIGNMENT;

  /// A heap over a private arena, big enough for a few chunks.
  fn test_heap() -> ListAllocator<ArenaRegion> {
    ListAllocator::init(ArenaRegion::new(64 * 1024).unwrap()).unwrap()
  }

  /// Collects the (payload, size) pairs on the free list, head first.
  fn free_blocks(heap: &ListAllocator<ArenaRegion>) -> Vec<(*mut u8, usize)> {
    let mut blocks = Vec::new();

    unsafe {
      let mut bp = heap.free.head_ptr(heap.base());
      while !bp.is_null() {
        blocks.push((bp, block_size(bp)));
        bp = FreeList::next_ptr(heap.base(), bp);
      }
    }

    blocks
  }

  #[test]
  fn init_seeds_one_chunk_sized_free_block() {
    let heap = test_heap();

    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, CHUNK_SIZE);
    assert!(heap.check());
  }

  #[test]
  fn init_fails_when_region_cannot_hold_the_sentinels() {
    let region = ArenaRegion::new(8).unwrap();
    assert!(matches!(ListAllocator::init(region), Err(AllocError::Oom)));
  }

  #[test]
  fn init_fails_when_region_cannot_seed_the_first_chunk() {
    let region = ArenaRegion::new(4 * WSIZE).unwrap();
    assert!(matches!(ListAllocator::init(region), Err(AllocError::Oom)));
  }

  #[test]
  fn minimal_request_takes_a_minimum_block() {
    let mut heap = test_heap();

    let p = heap.allocate(1);
    assert!(!p.is_null());
    assert_eq!(p as usize % ALIGNMENT, 0);
    unsafe {
      assert_eq!(block_size(p), MIN_BLOCK);
    }

    // The rest of the seed chunk is back on the free list.
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, CHUNK_SIZE - MIN_BLOCK);
    assert!(heap.check());
  }

  #[test]
  fn zero_sized_request_is_a_noop() {
    let mut heap = test_heap();

    assert!(heap.allocate(0).is_null());

    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, CHUNK_SIZE);
    assert!(heap.check());
  }

  #[test]
  fn release_null_is_a_noop() {
    let mut heap = test_heap();
    unsafe { heap.release(std::ptr::null_mut()) };
    assert!(heap.check());
  }

  #[test]
  fn releasing_neighbors_coalesces_into_one_block() {
    let mut heap = test_heap();

    let a = heap.allocate(24);
    let b = heap.allocate(24);
    assert!(!a.is_null() && !b.is_null());

    unsafe {
      heap.release(a);
      heap.release(b);
    }

    // a, b and the tail remainder merge back into the seed chunk.
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0], (a, CHUNK_SIZE));
    assert!(heap.check());
  }

  #[test]
  fn split_leaves_remainder_on_the_free_list() {
    let mut heap = test_heap();

    // Build a 32-byte free island fenced off by an allocated block.
    let a = heap.allocate(24);
    let _pin = heap.allocate(24);
    unsafe { heap.release(a) };

    // Rounds to a 16-byte block; 32 - 16 leaves a minimum block, so the
    // island splits.
    let p = heap.allocate(8);
    assert_eq!(p, a);
    unsafe {
      assert_eq!(block_size(p), MIN_BLOCK);

      let remainder = next_block(p);
      assert!(!is_allocated(remainder));
      assert_eq!(block_size(remainder), 16);
    }
    assert!(heap.check());
  }

  #[test]
  fn undersized_remainder_is_charged_to_the_allocation() {
    let mut heap = test_heap();

    let a = heap.allocate(24);
    let _pin = heap.allocate(24);
    unsafe { heap.release(a) };

    // Rounds to 24; the 8-byte remainder cannot hold a block, so the
    // whole 32 bytes go to the allocation.
    let p = heap.allocate(16);
    assert_eq!(p, a);
    unsafe {
      assert_eq!(block_size(p), 32);
      assert_eq!(heap.usable_size(p), 24);
    }
    assert!(heap.check());
  }

  #[test]
  fn sandwich_release_merges_three_blocks() {
    let mut heap = test_heap();

    let a = heap.allocate(24);
    let b = heap.allocate(24);
    let c = heap.allocate(24);
    let _pin = heap.allocate(24);

    unsafe {
      heap.release(a);
      heap.release(c);
      // Both neighbors of b are free now; releasing it merges all three.
      heap.release(b);
    }

    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0], (a, 96));
    assert_eq!(blocks[1].1, CHUNK_SIZE - 4 * 32);
    assert!(heap.check());
  }

  #[test]
  fn miss_extends_the_heap_by_a_chunk() {
    let mut heap = test_heap();

    // Consumes the whole seed chunk (the 8-byte remainder cannot split).
    let first = heap.allocate(CHUNK_SIZE - MIN_BLOCK);
    assert!(!first.is_null());
    assert!(free_blocks(&heap).is_empty());

    // Nothing fits, so the region grows by one more chunk.
    let second = heap.allocate(1);
    assert!(!second.is_null());
    assert_eq!(second as usize, first as usize + CHUNK_SIZE);
    assert!(heap.check());
  }

  #[test]
  fn large_request_extends_by_the_request_itself() {
    let mut heap = test_heap();

    let p = heap.allocate(3 * CHUNK_SIZE);
    assert!(!p.is_null());
    unsafe {
      assert!(heap.usable_size(p) >= 3 * CHUNK_SIZE);
    }
    assert!(heap.check());
  }

  #[test]
  fn allocate_returns_null_once_the_region_is_spent() {
    // Exactly the sentinels plus the seed chunk: nothing left to extend.
    let region = ArenaRegion::new(4 * WSIZE + CHUNK_SIZE).unwrap();
    let mut heap = ListAllocator::init(region).unwrap();

    assert!(heap.allocate(CHUNK_SIZE).is_null());

    // The seed chunk itself is still usable.
    let p = heap.allocate(CHUNK_SIZE - MIN_BLOCK);
    assert!(!p.is_null());
    assert!(heap.check());
  }

  #[test]
  fn reallocate_preserves_the_payload_prefix() {
    let mut heap = test_heap();

    let p = heap.allocate(24);
    unsafe {
      for i in 0..24 {
        p.add(i).write(i as u8);
      }

      let q = heap.reallocate(p, 100);
      assert!(!q.is_null());
      assert_ne!(q, p);
      for i in 0..24 {
        assert_eq!(q.add(i).read(), i as u8);
      }

      // Shrinking keeps the requested prefix.
      let r = heap.reallocate(q, 8);
      assert!(!r.is_null());
      for i in 0..8 {
        assert_eq!(r.add(i).read(), i as u8);
      }
    }
    assert!(heap.check());
  }

  #[test]
  fn reallocate_null_allocates_and_zero_releases() {
    let mut heap = test_heap();

    unsafe {
      let p = heap.reallocate(std::ptr::null_mut(), 24);
      assert!(!p.is_null());

      assert!(heap.reallocate(p, 0).is_null());
    }

    // Everything is back on the free list.
    let blocks = free_blocks(&heap);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].1, CHUNK_SIZE);
    assert!(heap.check());
  }

  #[test]
  fn reallocate_failure_leaves_the_old_block_alive() {
    let region = ArenaRegion::new(4 * WSIZE + CHUNK_SIZE).unwrap();
    let mut heap = ListAllocator::init(region).unwrap();

    let p = heap.allocate(24);
    unsafe {
      p.write(0xAB);

      // Too big for the spent region: must fail without touching `p`.
      let q = heap.reallocate(p, 2 * CHUNK_SIZE);
      assert!(q.is_null());
      assert_eq!(p.read(), 0xAB);
      assert!(is_allocated(p));
    }
    assert!(heap.check());
  }
}
