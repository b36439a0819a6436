//! # Synchronization Primitives
//!
//! Nestable interrupt-masking critical section. All shared scheduler state
//! must be touched inside one to keep task code and the tick interrupt from
//! observing half-updated queues.
//!
//! Interrupts are masked only on the outermost `enter` and unmasked only on
//! the matching outermost `exit`, so kernel routines can freely call each
//! other while already inside a critical section.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::arch::Port;

/// Nesting counter for the interrupt-masking critical section.
///
/// Only plain atomic loads and stores are used so the counter also works on
/// cores without read-modify-write atomics. A preempting interrupt that
/// enters and exits pairs its own updates, leaving the value as it found it.
#[derive(Debug)]
pub struct CriticalNesting {
    depth: AtomicU32,
}

impl CriticalNesting {
    pub const fn new() -> Self {
        Self { depth: AtomicU32::new(0) }
    }

    /// Enter the critical section. Masks interrupts on the 0→1 transition.
    #[inline]
    pub fn enter<P: Port>(&self, port: &P) {
        let depth = self.depth.load(Ordering::Relaxed);
        if depth == 0 {
            port.disable_interrupts();
        }
        self.depth.store(depth + 1, Ordering::Relaxed);
    }

    /// Leave the critical section. Unmasks interrupts on the 1→0 transition.
    ///
    /// An unpaired `exit` is ignored rather than underflowing the counter.
    #[inline]
    pub fn exit<P: Port>(&self, port: &P) {
        let depth = self.depth.load(Ordering::Relaxed);
        debug_assert!(depth > 0, "unpaired critical section exit");
        if depth == 0 {
            return;
        }
        self.depth.store(depth - 1, Ordering::Relaxed);
        if depth == 1 {
            port.enable_interrupts();
        }
    }

    /// Run `f` inside the critical section. Entry and exit are paired on
    /// every path out of the closure.
    #[inline]
    pub fn with<P: Port, R>(&self, port: &P, f: impl FnOnce() -> R) -> R {
        self.enter(port);
        let result = f();
        self.exit(port);
        result
    }

    /// Current nesting depth. Zero means interrupts are not held masked by
    /// this counter.
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth.load(Ordering::Relaxed)
    }
}

impl Default for CriticalNesting {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::host::HostPort;

    #[test]
    fn test_only_outermost_level_touches_interrupts() {
        let port = HostPort::new();
        let cs = CriticalNesting::new();

        cs.enter(&port);
        cs.enter(&port);
        cs.enter(&port);
        assert!(port.interrupts_masked());
        assert_eq!(port.mask_count(), 1);
        assert_eq!(cs.depth(), 3);

        cs.exit(&port);
        cs.exit(&port);
        assert!(port.interrupts_masked());
        assert_eq!(port.unmask_count(), 0);

        cs.exit(&port);
        assert!(!port.interrupts_masked());
        assert_eq!(port.unmask_count(), 1);
        assert_eq!(cs.depth(), 0);
    }

    #[test]
    fn test_with_pairs_nested_closures() {
        let port = HostPort::new();
        let cs = CriticalNesting::new();

        let value = cs.with(&port, || cs.with(&port, || cs.depth()));
        assert_eq!(value, 2);
        assert_eq!(cs.depth(), 0);
        assert_eq!(port.mask_count(), 1);
        assert_eq!(port.unmask_count(), 1);
    }
}
