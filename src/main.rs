//! # TickOS Demo Firmware
//!
//! Three tasks showing strict priority plus round-robin time slicing:
//!
//! | Task | Priority | Quantum | Behavior |
//! |------|----------|---------|----------|
//! | `sampler` | 0 | 10 | Short burst of work, then sleeps 100 ticks |
//! | `worker_b` | 1 | 10 | Busy loop, never blocks |
//! | `worker_c` | 1 | 10 | Busy loop, never blocks |
//!
//! ## Expected Timeline
//!
//! 1. `sampler` runs first and goes to sleep.
//! 2. `worker_b` and `worker_c` alternate in 10-tick bursts.
//! 3. On tick 100 `sampler` wakes, preempts whichever worker is running,
//!    does its burst and sleeps again. The workers pick up where they
//!    left off.
//!
//! `sampler` uses `delay_until`, so its period does not drift by the
//! length of its own burst.

#![no_std]
#![no_main]

use core::ptr::addr_of_mut;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use panic_halt as _;

use tickos::config::ClockConfig;
use tickos::kernel;
use tickos::task::TaskParams;

const STACK_WORDS: usize = 256;
const SAMPLE_PERIOD: u64 = 100;

static mut SAMPLER_STACK: [usize; STACK_WORDS] = [0; STACK_WORDS];
static mut WORKER_B_STACK: [usize; STACK_WORDS] = [0; STACK_WORDS];
static mut WORKER_C_STACK: [usize; STACK_WORDS] = [0; STACK_WORDS];

/// Per-worker progress, readable from a debugger.
static PROGRESS: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

/// **Sampler** (priority 0): wakes every 100 ticks.
extern "C" fn sampler(_: usize) {
    let mut wake = kernel::tick_count();
    loop {
        let mut work: u32 = 0;
        for _ in 0..2000 {
            work = work.wrapping_add(1);
        }
        core::hint::black_box(work);

        // Overran a period: skip ahead instead of bursting to catch up
        while !kernel::delay_until(&mut wake, SAMPLE_PERIOD) {}
    }
}

/// **Worker** (priority 1): pure CPU load, rotated by the quantum.
extern "C" fn worker(index: usize) {
    loop {
        PROGRESS[index].fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let cp = cortex_m::Peripherals::take().unwrap();

    let sampler_params = TaskParams::new("sampler")
        .entry(sampler)
        .priority(0)
        .time_slice(10)
        .stack(unsafe { &mut *addr_of_mut!(SAMPLER_STACK) });
    kernel::create(sampler_params).expect("Failed to create sampler");

    let worker_b = TaskParams::new("worker_b")
        .entry(worker)
        .param(0)
        .priority(1)
        .time_slice(10)
        .stack(unsafe { &mut *addr_of_mut!(WORKER_B_STACK) });
    kernel::create(worker_b).expect("Failed to create worker_b");

    let worker_c = TaskParams::new("worker_c")
        .entry(worker)
        .param(1)
        .priority(1)
        .time_slice(10)
        .stack(unsafe { &mut *addr_of_mut!(WORKER_C_STACK) });
    kernel::create(worker_c).expect("Failed to create worker_c");

    // Start the scheduler: does not return
    kernel::start(ClockConfig::default(), cp)
}
