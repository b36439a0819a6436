//! # Host Port
//!
//! A [`Port`] for running the scheduling core off-target. Nothing is
//! actually masked or switched; the port only records what the core asked
//! for so that simulations and tests can observe it. Each scheduler owns
//! its own `HostPort`, so independent instances never share state.

use core::cell::Cell;

use super::Port;

/// Recording port for host builds.
#[derive(Debug, Default)]
pub struct HostPort {
    masked: Cell<bool>,
    mask_count: Cell<u32>,
    unmask_count: Cell<u32>,
    switch_requests: Cell<u32>,
}

impl HostPort {
    pub const fn new() -> Self {
        Self {
            masked: Cell::new(false),
            mask_count: Cell::new(0),
            unmask_count: Cell::new(0),
            switch_requests: Cell::new(0),
        }
    }

    /// Whether interrupts are currently masked.
    pub fn interrupts_masked(&self) -> bool {
        self.masked.get()
    }

    /// Number of enabled→disabled transitions seen so far.
    pub fn mask_count(&self) -> u32 {
        self.mask_count.get()
    }

    /// Number of disabled→enabled transitions seen so far.
    pub fn unmask_count(&self) -> u32 {
        self.unmask_count.get()
    }

    /// Number of context-switch requests seen so far.
    pub fn switch_requests(&self) -> u32 {
        self.switch_requests.get()
    }
}

impl Port for HostPort {
    fn disable_interrupts(&self) {
        self.masked.set(true);
        self.mask_count.set(self.mask_count.get() + 1);
    }

    fn enable_interrupts(&self) {
        self.masked.set(false);
        self.unmask_count.set(self.unmask_count.get() + 1);
    }

    fn request_switch(&self) {
        self.switch_requests.set(self.switch_requests.get() + 1);
    }

    fn halt() -> ! {
        panic!("task entry function returned");
    }
}
