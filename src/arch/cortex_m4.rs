//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! interrupt masking, SysTick configuration, the PendSV context switch and
//! the first-task launch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by tasks in Thread mode
//!
//! On exception entry the hardware stacks R0–R3, R12, LR, PC and xPSR onto
//! the process stack. PendSV pushes R4–R11 below them, hands the resulting
//! stack pointer to [`Scheduler::switch_context`] and restores R4–R11 from
//! whatever stack pointer it gets back. The scheduler never touches
//! registers; it only trades stack pointers.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: 0xFE, one step above PendSV
//! - PendSV: 0xFF (lowest), so a switch only happens once every other
//!   handler has unwound
//!
//! [`Scheduler::switch_context`]: crate::scheduler::Scheduler::switch_context

use core::arch::{asm, naked_asm};

use cortex_m::peripheral::syst::SystClkSource;

use super::Port;
use crate::config::ClockConfig;
use crate::stack;

// Only R4-R11 are switched; S16-S31 and extended frames are not.
#[cfg(target_abi = "eabihf")]
compile_error!("the Cortex-M4 port keeps no FPU context: build for thumbv7em-none-eabi");

/// PendSV exception priority (lowest).
pub const PENDSV_PRIORITY: u32 = 0xFF;

/// SysTick exception priority.
pub const SYSTICK_PRIORITY: u32 = 0xFE;

/// The Cortex-M4 implementation of [`Port`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CortexM4;

impl Port for CortexM4 {
    #[inline]
    fn disable_interrupts(&self) {
        cortex_m::interrupt::disable();
    }

    #[inline]
    fn enable_interrupts(&self) {
        // SAFETY: only called on the outermost critical-section exit.
        unsafe { cortex_m::interrupt::enable() }
    }

    #[inline]
    fn request_switch(&self) {
        trigger_pendsv();
    }

    fn halt() -> ! {
        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::bkpt();
        }
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the scheduler tick.
///
/// Fires at `clock.tick_hz` from the processor clock. Each tick enters
/// [`SysTick`], which runs `Scheduler::tick()`.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST, clock: &ClockConfig) {
    syst.set_reload(clock.systick_reload());
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// PendSV trigger
// ---------------------------------------------------------------------------

/// Pend the PendSV exception.
///
/// Sets PENDSVSET in the Interrupt Control and State Register (ICSR). The
/// handler runs once no other exception is active and interrupts are
/// unmasked.
#[inline]
pub fn trigger_pendsv() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Put PendSV at the lowest priority and SysTick just above it.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3) & 0x0000_FFFF;
        let val = val | (PENDSV_PRIORITY << 16) | (SYSTICK_PRIORITY << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Launch the first task from its synthesized frame. Never returns.
///
/// Switches Thread mode onto the PSP, unstacks the hardware half of the
/// frame by hand (R0 carries the task parameter, LR the exit trap) and
/// branches to the entry point with interrupts enabled.
///
/// # Safety
/// Must be called exactly once, with interrupts masked, with a stack
/// pointer returned by `Scheduler::start`.
pub unsafe fn start_first_task(psp: usize) -> ! {
    asm!(
        // Skip the software frame: R4-R11 hold only sentinels
        "adds r0, #32",
        "msr psp, r0",

        // Thread mode uses PSP from here on (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",

        "pop {{r0-r3, r12, lr}}",  // R0 = param, LR = exit trap
        "pop {{r4, r5}}",          // R4 = entry, R5 = xPSR (discarded)
        "orr r4, r4, #1",          // branch in Thumb state

        "cpsie i",
        "bx r4",

        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler: performs the context switch.
///
/// ## Sequence
/// 1. Mask interrupts so the tick cannot observe a half-finished switch
/// 2. Push R4–R11 onto the outgoing task's stack (PSP)
/// 3. Trade that stack pointer for the incoming one via `switch_context`
/// 4. Pop R4–R11 from the incoming stack and point PSP past them
/// 5. Unmask and return with a fixed EXC_RETURN (hardware restores R0–R3,
///    R12, LR, PC, xPSR from a basic frame)
///
/// With no switch pending the same stack pointer comes back and the
/// outgoing task simply resumes.
///
/// # Safety
/// Entered only by the NVIC, following the Cortex-M exception convention.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",

        // --- Save outgoing context ---
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",

        // --- Swap stack pointers ---
        "bl {switch}",

        // --- Restore incoming context ---
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",

        // Return to Thread mode on PSP with a basic frame
        "cpsie i",
        "ldr r0, ={exc_return}",
        "bx r0",

        switch = sym switch_from_trap,
        exc_return = const stack::EXC_RETURN_THREAD_PSP,
    );
}

/// Store the outgoing stack pointer and return the incoming one.
///
/// # Safety
/// Called only from `PendSV` with interrupts masked.
unsafe extern "C" fn switch_from_trap(saved_sp: usize) -> usize {
    crate::kernel::scheduler().switch_context(saved_sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler: scheduler tick entry point.
///
/// `tick()` pends PendSV itself when the scheduling decision changes the
/// running task.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::scheduler().tick();
}
