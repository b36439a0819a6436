//! # Kernel
//!
//! The global scheduler instance on Cortex-M4 and the public API tasks and
//! startup code call.
//!
//! Every mutating call goes through the scheduler's own nesting critical
//! section. Read-only queries take a short `cortex_m::interrupt::free`
//! section instead.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::create()    ← register tasks (×N)
//!         └─► kernel::start()     ← launch scheduler (no return)
//!               ├─► set PendSV/SysTick priorities
//!               ├─► create idle task, pick first task
//!               ├─► configure SysTick
//!               └─► start first task via cortex_m4::start_first_task()
//! ```

use core::ptr::addr_of_mut;

use crate::arch::cortex_m4::{self, CortexM4};
use crate::arch::Port;
use crate::config::{ClockConfig, IDLE_STACK_WORDS};
use crate::error::KernelError;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::task::{TaskHandle, TaskInfo, TaskParams, Tick};

// ---------------------------------------------------------------------------
// Global scheduler instance
// ---------------------------------------------------------------------------

/// Global scheduler instance.
///
/// # Safety
/// Task code reaches it only through this module, whose calls serialize
/// through the scheduler's critical section. The PendSV and SysTick
/// handlers reach it through [`scheduler`]; interrupts are serialized by
/// priority.
static mut SCHEDULER: Scheduler<CortexM4> = Scheduler::new(CortexM4);

static mut IDLE_STACK: [usize; IDLE_STACK_WORDS] = [0; IDLE_STACK_WORDS];

/// The global scheduler.
///
/// # Safety
/// The caller must not hold another reference obtained from this function
/// across the call.
#[inline(always)]
pub(crate) unsafe fn scheduler() -> &'static mut Scheduler<CortexM4> {
    &mut *addr_of_mut!(SCHEDULER)
}

/// Body of the idle task: reclaim deleted tasks, then sleep until the next
/// interrupt.
extern "C" fn idle_entry(_: usize) {
    loop {
        unsafe { scheduler().reap() };
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Create a new task.
///
/// May be called before [`start`] or from a running task. A task created
/// above the caller's priority runs as soon as this returns.
///
/// # Example
/// ```ignore
/// static mut STACK: [usize; 256] = [0; 256];
///
/// let params = TaskParams::new("sensor")
///     .entry(sensor_task)
///     .priority(2)
///     .time_slice(10)
///     .stack(unsafe { &mut *core::ptr::addr_of_mut!(STACK) });
/// kernel::create(params)?;
/// ```
pub fn create(params: TaskParams<'_>) -> Result<TaskHandle, KernelError> {
    unsafe { scheduler().create(params) }
}

/// Start the scheduler. **Does not return.**
///
/// Creates the idle task, dispatches the highest-priority ready task and
/// starts the tick. If the idle task cannot be created the machine halts.
pub fn start(clock: ClockConfig, mut core_peripherals: cortex_m::Peripherals) -> ! {
    cortex_m4::set_interrupt_priorities();

    let idle_stack = unsafe { &mut *addr_of_mut!(IDLE_STACK) };
    let first_sp = match unsafe { scheduler().start(idle_entry, idle_stack) } {
        Ok(sp) => sp,
        Err(err) => {
            log::error!("scheduler start failed: {}", err);
            CortexM4::halt()
        }
    };
    log::info!(
        "tickos: {} tasks, tick {} Hz",
        unsafe { scheduler().tasks().len() },
        clock.tick_hz
    );

    // Interrupts stay masked until the first task is running
    cortex_m::interrupt::disable();
    cortex_m4::configure_systick(&mut core_peripherals.SYST, &clock);

    unsafe { cortex_m4::start_first_task(first_sp) }
}

/// Give up the CPU to the next ready task of the same priority.
pub fn yield_now() {
    unsafe { scheduler().yield_now() }
}

/// Block the calling task for `ticks` ticks. `delay(0)` yields.
pub fn delay(ticks: Tick) {
    unsafe { scheduler().delay(ticks) }
}

/// Block until `*previous_wake + period`, advancing `previous_wake`.
///
/// Returns `false` without blocking when that tick has already passed.
pub fn delay_until(previous_wake: &mut Tick, period: Tick) -> bool {
    unsafe { scheduler().delay_until(previous_wake, period) }
}

pub fn suspend(task: TaskHandle) {
    unsafe { scheduler().suspend(task) }
}

pub fn resume(task: TaskHandle) {
    unsafe { scheduler().resume(task) }
}

pub fn set_priority(task: TaskHandle, priority: u8) {
    unsafe { scheduler().set_priority(task, priority) }
}

/// Delete a task. A task may delete itself; it stops running as soon as
/// this returns and its slot is reclaimed by the idle task.
pub fn delete(task: TaskHandle) {
    unsafe { scheduler().delete(task) }
}

pub fn get_priority(task: TaskHandle) -> Option<u8> {
    cortex_m::interrupt::free(|_cs| unsafe { scheduler().get_priority(task) })
}

/// Handle of the calling task.
pub fn current_task() -> Option<TaskHandle> {
    cortex_m::interrupt::free(|_cs| unsafe { scheduler().current_task() })
}

pub fn task_info(task: TaskHandle) -> Option<TaskInfo> {
    cortex_m::interrupt::free(|_cs| unsafe { scheduler().task_info(task) })
}

/// Ticks since [`start`].
pub fn tick_count() -> Tick {
    cortex_m::interrupt::free(|_cs| unsafe { scheduler().tick_count() })
}

pub fn stats() -> SchedulerStats {
    cortex_m::interrupt::free(|_cs| unsafe { scheduler().stats() })
}

/// Enter the kernel critical section. Nests; pair every call with
/// [`exit_critical`].
pub fn enter_critical() {
    unsafe { scheduler().enter_critical() }
}

pub fn exit_critical() {
    unsafe { scheduler().exit_critical() }
}

/// Run `f` inside the kernel critical section.
pub fn critical<R>(f: impl FnOnce() -> R) -> R {
    unsafe { scheduler().critical(f) }
}
