//! # tagalloc - An Explicit Free-List Memory Allocator
//!
//! This crate implements the classic boundary-tag heap allocator with an
//! explicit doubly-linked free list, immediate coalescing and first-fit
//! placement, on top of an sbrk-style growable memory region.
//!
//! ## Overview
//!
//! ```text
//!   The heap is one contiguous run of blocks between two permanent
//!   sentinels:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                           HEAP REGION                                │
//!   │                                                                      │
//!   │  ┌────┬──────────┬────────┬────────┬────────┬────────┬───────────┐   │
//!   │  │pad │ PROLOGUE │ block  │ block  │ block  │ block  │ EPILOGUE  │   │
//!   │  │    │ (8, used)│ (used) │ (free) │ (used) │ (free) │ (0, used) │   │
//!   │  └────┴──────────┴────────┴───┬────┴────────┴───┬────┴───────────┘   │
//!   │                               │    ▲            │    ▲               │
//!   │                               ▼    │            ▼    │               │
//!   │                 free list:  links stored inside the free payloads    │
//!   │                 (LIFO head insertion, first-fit search)              │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Every block carries its size twice - in a header and a footer word -
//!   so both neighbors are one word-read away and freeing coalesces in
//!   O(1).
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── tags       - Boundary tags: pack/size/alloc words, block navigation
//!   ├── free_list  - Explicit doubly-linked list of free blocks
//!   ├── region     - Region providers (sbrk-backed and arena-backed)
//!   ├── list       - ListAllocator: allocate / release / reallocate
//!   ├── check      - Heap invariant checker
//!   └── error      - AllocError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ArenaRegion, ListAllocator};
//!
//! let region = ArenaRegion::new(1 << 20).unwrap();
//! let mut heap = ListAllocator::init(region).unwrap();
//!
//! let ptr = heap.allocate(64);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write(42);
//!     assert_eq!(ptr.read(), 42);
//!
//!     heap.release(ptr);
//! }
//!
//! assert!(heap.check());
//! ```
//!
//! To run a heap on the real program break instead, initialize with
//! [`SbrkRegion`]; the algorithm is identical, only the provider changes.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives.
//! - **Monotonic region**: memory is never returned to the provider.
//! - **First-fit, one list**: no size classes, no best-fit.
//! - **4 GiB region cap**: free-list links are 32-bit offsets.
//!
//! ## Safety
//!
//! Allocation itself is safe; using the returned raw pointers, releasing
//! and reallocating are `unsafe` with the usual malloc contracts: no
//! double free, no use after free, no foreign pointers.

pub mod align;
mod check;
mod error;
mod free_list;
mod list;
mod region;
mod tags;

pub use error::AllocError;
pub use list::ListAllocator;
pub use region::{ArenaRegion, Region, SbrkRegion};
pub use tags::{CHUNK_SIZE, MIN_BLOCK};

/// Payload alignment in bytes; every pointer returned by the allocator
/// is a multiple of this.
pub const ALIGNMENT: usize = 8;
