//! # Kernel Errors
//!
//! Failure reasons reported by task creation and scheduler startup.
//! Operations that the kernel defines as no-ops on bad input (for example
//! resuming a task that is not suspended) do not produce errors.

use core::fmt;

/// Reasons a kernel operation can fail.
///
/// Every failing operation leaves the scheduler exactly as it found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No entry function was supplied.
    MissingEntry,
    /// No stack region (or stack size) was supplied.
    MissingStack,
    /// The stack region cannot hold the initial frame plus headroom.
    StackTooSmall,
    /// Priority outside `0..PRIORITY_LEVELS`.
    InvalidPriority,
    /// Every slot in the task table is in use.
    NoFreeSlot,
    /// Heap-backed stack allocation failed.
    OutOfMemory,
    /// The scheduler has already been started.
    AlreadyStarted,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::MissingEntry => "task entry function missing",
            KernelError::MissingStack => "task stack region missing",
            KernelError::StackTooSmall => "task stack region too small",
            KernelError::InvalidPriority => "priority out of range",
            KernelError::NoFreeSlot => "task table full",
            KernelError::OutOfMemory => "stack allocation failed",
            KernelError::AlreadyStarted => "scheduler already started",
        };
        f.write_str(msg)
    }
}
