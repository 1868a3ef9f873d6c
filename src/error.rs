//! Internal error types.
//!
//! These never cross the public allocation API (`allocate`, `free`,
//! `reallocate`, `zero_allocate` all keep the null-pointer/no-op contract
//! mandated by the allocator's error taxonomy). They exist so the
//! diagnostic `log` call sites in [`crate::heap`] and [`crate::check`] have
//! something structured to report.

use thiserror::Error;

/// Why a heap-growth request failed.
#[derive(Debug, Error)]
pub enum GrowError {
  /// The host growth primitive (`sbrk`) refused the request, typically
  /// because the process is out of address space or has hit a resource
  /// limit such as `RLIMIT_DATA`.
  #[error("host refused to grow the heap by {requested} bytes")]
  HostRefused { requested: usize },

  /// The caller asked for a byte count that is not a multiple of the
  /// allocator's alignment; `heap_grow`'s contract requires callers to
  /// guarantee this, so hitting it indicates an internal bug.
  #[error("requested growth of {requested} bytes is not {alignment}-byte aligned")]
  Misaligned { requested: usize, alignment: usize },
}

/// A structural violation found by [`crate::check::check_heap`].
#[derive(Debug, Error)]
pub enum IntegrityError {
  #[error("block at {addr:#x} is not 16-byte aligned")]
  Misaligned { addr: usize },

  #[error("block at {addr:#x} lies outside [{low:#x}, {high:#x}]")]
  OutOfBounds { addr: usize, low: usize, high: usize },

  #[error("block at {addr:#x} has mismatched header ({header:#x}) and footer ({footer:#x})")]
  HeaderFooterMismatch { addr: usize, header: usize, footer: usize },

  #[error("block at {addr:#x} overlaps its successor at {next:#x}")]
  Overlap { addr: usize, next: usize },

  #[error("prologue is malformed")]
  BadPrologue,

  #[error("epilogue is malformed")]
  BadEpilogue,
}
