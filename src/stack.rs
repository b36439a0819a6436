//! # Initial Stack Frame
//!
//! Synthesizes the register frame a new task is first dispatched from.
//! The frame has exactly the shape the Cortex-M4 switch trap leaves behind
//! when it saves a task, so a task's first dispatch is indistinguishable
//! from resuming after a switch.
//!
//! ## Frame Layout (top = high address, stack grows down)
//!
//! ```text
//! [Hardware stacked frame]     restored by exception return
//!   xPSR  0x0100_0000 (Thumb bit)
//!   PC    entry (bit 0 clear)
//!   LR    task_exit trap
//!   R12   0x1212_1212
//!   R3    0x0303_0303
//!   R2    0x0202_0202
//!   R1    0x0101_0101
//!   R0    param              <- first argument slot
//! [Software saved context]     restored by the trap with LDMIA
//!   R11   0x1111_1111
//!   ...
//!   R4    0x0404_0404        <- stack_pointer after init
//! ```
//!
//! The sentinel values make a frame recognizable in a memory dump.

use crate::arch::Port;
use crate::config::MIN_STACK_WORDS;
use crate::error::KernelError;
use crate::task::TaskEntry;

/// Words in the software-saved part (R4–R11).
pub const SOFTWARE_FRAME_WORDS: usize = 8;

/// Words in the hardware-stacked part (R0–R3, R12, LR, PC, xPSR).
pub const HARDWARE_FRAME_WORDS: usize = 8;

/// Total initial frame size in words.
pub const FRAME_WORDS: usize = SOFTWARE_FRAME_WORDS + HARDWARE_FRAME_WORDS;

/// xPSR with only the Thumb state bit set.
pub const INITIAL_XPSR: usize = 0x0100_0000;

/// EXC_RETURN for the switch trap: Thread mode, PSP, basic 8-word frame.
/// Every task frame, synthesized or saved, has that shape.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Exception return clears PC bit 0; the Thumb bit lives in xPSR instead.
const START_ADDRESS_MASK: usize = !1;

// Word offsets from the saved stack pointer.
pub const R4: usize = 0;
pub const R11: usize = 7;
pub const R0: usize = 8;
pub const R1: usize = 9;
pub const R2: usize = 10;
pub const R3: usize = 11;
pub const R12: usize = 12;
pub const LR: usize = 13;
pub const PC: usize = 14;
pub const XPSR: usize = 15;

/// Sentinel for register `rN`: the register number repeated in every byte
/// (written in decimal digits, so R10 is `0x1010_1010`).
const fn sentinel(reg: usize) -> usize {
    let digits = (reg / 10) * 0x10 + reg % 10;
    digits * 0x0101_0101
}

/// Smallest region, in words, that [`init_frame`] accepts.
pub const fn min_stack_words() -> usize {
    FRAME_WORDS + MIN_STACK_WORDS
}

/// Build the initial frame at the 8-byte-aligned top of `region`.
///
/// Returns the address to store in the task's `stack_pointer`. The region
/// is left untouched on failure.
pub fn init_frame(
    region: &mut [usize],
    entry: TaskEntry,
    param: usize,
    exit: usize,
) -> Result<usize, KernelError> {
    if region.is_empty() {
        return Err(KernelError::MissingStack);
    }
    if region.len() < min_stack_words() {
        return Err(KernelError::StackTooSmall);
    }

    let word = core::mem::size_of::<usize>();
    let base = region.as_ptr() as usize;
    let mut top = region.len();
    // AAPCS: the stack pointer at a public interface must be 8-byte aligned
    while (base + top * word) % 8 != 0 {
        top -= 1;
    }

    let sp_index = top - FRAME_WORDS;
    let frame = &mut region[sp_index..top];

    for (offset, slot) in frame[R4..=R11].iter_mut().enumerate() {
        *slot = sentinel(offset + 4);
    }
    frame[R0] = param;
    frame[R1] = sentinel(1);
    frame[R2] = sentinel(2);
    frame[R3] = sentinel(3);
    frame[R12] = sentinel(12);
    frame[LR] = exit;
    frame[PC] = (entry as usize) & START_ADDRESS_MASK;
    frame[XPSR] = INITIAL_XPSR;

    Ok(base + sp_index * word)
}

/// Error trap installed as every task's return address.
///
/// Task entry functions must never return; if one does, control lands
/// here instead of at an arbitrary address and the port halts the machine.
pub extern "C" fn task_exit<P: Port>() -> ! {
    log::error!("task returned from its entry function");
    P::halt()
}

/// Address of the exit trap for port `P`.
#[inline]
pub fn exit_trap_address<P: Port>() -> usize {
    task_exit::<P> as usize
}
