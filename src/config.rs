//! # TickOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; the slot table and ready levels
//! are sized from these values.

/// Maximum number of tasks the system can manage simultaneously,
/// including the idle task. Bounds the static slot table.
pub const MAX_TASKS: usize = 8;

/// Number of priority levels. Level 0 is the highest priority.
/// Must not exceed 32 so the ready bitmap fits in a `u32`.
pub const PRIORITY_LEVELS: usize = 8;

/// Priority of the idle task. It is never placed in a ready level; the
/// scheduler falls back to it when the bitmap is empty.
pub const IDLE_PRIORITY: u8 = (PRIORITY_LEVELS - 1) as u8;

/// SysTick frequency in Hz. One tick is the system's unit of time.
pub const TICK_HZ: u32 = 1000;

/// Default time slice in ticks, used when a task is created with a
/// quantum of zero.
pub const DEFAULT_TIME_SLICE: u32 = 10;

/// Maximum task name length in bytes. Longer names are truncated.
pub const MAX_NAME_LEN: usize = 16;

/// Headroom (in words) a stack region must have beyond the initial
/// register frame to be accepted at creation.
pub const MIN_STACK_WORDS: usize = 16;

/// Stack size of the idle task, in words.
pub const IDLE_STACK_WORDS: usize = 64;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

const _: () = assert!(PRIORITY_LEVELS >= 2 && PRIORITY_LEVELS <= 32);
const _: () = assert!(MAX_TASKS >= 2);

/// Clock parameters handed to the port when the scheduler starts.
///
/// Board support code knows the real core clock; the defaults match the
/// reset state of the reference board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Core clock feeding SysTick, in Hz.
    pub system_clock_hz: u32,
    /// Desired tick frequency, in Hz.
    pub tick_hz: u32,
}

impl ClockConfig {
    pub const fn new(system_clock_hz: u32, tick_hz: u32) -> Self {
        Self { system_clock_hz, tick_hz }
    }

    /// SysTick reload value for this configuration.
    #[inline]
    pub const fn systick_reload(&self) -> u32 {
        self.system_clock_hz / self.tick_hz - 1
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new(SYSTEM_CLOCK_HZ, TICK_HZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reload_gives_one_ms_tick() {
        let clock = ClockConfig::default();
        assert_eq!(clock.systick_reload(), 15_999);
    }

    #[test]
    fn test_idle_is_lowest_level() {
        assert_eq!(IDLE_PRIORITY as usize, PRIORITY_LEVELS - 1);
    }
}
