use std::error::Error;
use std::fmt;

/// Errors surfaced by the allocator.
///
/// Only one condition ever reaches callers: the region provider refused
/// to grow the heap. Internal invariant violations are reported by the
/// heap checker but are not recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The region provider could not supply more memory.
  Oom,
}

impl fmt::Display for AllocError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AllocError::Oom => write!(f, "region provider is out of memory"),
    }
  }
}

impl Error for AllocError {}
