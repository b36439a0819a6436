//! # Architecture Abstraction Layer
//!
//! The scheduling core never touches registers directly. Everything it
//! needs from the hardware goes through [`Port`]: masking interrupts for
//! the critical section, pending the deferred context switch, and the
//! fatal halt used when a task entry returns.
//!
//! The register save/restore itself lives in the port's trap handler and
//! only exchanges saved stack pointers with the core through
//! [`Scheduler::switch_context`](crate::scheduler::Scheduler::switch_context).

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(not(target_os = "none"))]
pub mod host;

/// Hardware services the scheduling core depends on.
pub trait Port {
    /// Mask all maskable interrupts.
    fn disable_interrupts(&self);

    /// Unmask interrupts.
    fn enable_interrupts(&self);

    /// Pend the asynchronous context-switch trap.
    ///
    /// Must only set pending state: the switch happens after the current
    /// interrupt or critical section unwinds. Safe to call from task and
    /// interrupt context.
    fn request_switch(&self);

    /// Stop the machine. Reached when a task entry function returns.
    fn halt() -> !;
}
