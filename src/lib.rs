//! # TickOS
//!
//! A preemptive, priority-based real-time task scheduler for ARM Cortex-M4
//! microcontrollers.
//!
//! ## Overview
//!
//! Tasks run at one of a fixed number of priority levels (0 is highest).
//! The highest-priority ready task always runs; tasks sharing a level take
//! turns in fixed time quanta driven by the periodic tick.
//!
//! - **O(1) selection**: a bitmap of non-empty ready levels, lowest set
//!   bit wins
//! - **Round-robin**: a preempted or yielding task goes to the tail of its
//!   level
//! - **Timed blocking**: one delayed list sorted by absolute wakeup tick
//! - **Deferred switching**: the scheduler only picks the next task and
//!   pends the port's switch trap; registers are saved and restored there
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   create() · start() · delay() · suspend() · resume()   │
//! ├──────────────┬────────────────────┬────────────────────┤
//! │  Scheduler   │   Tick Engine      │  Sync Primitives   │
//! │  scheduler.rs│   tick.rs          │  sync.rs           │
//! │  ─ schedule()│   ─ tick()         │  ─ CriticalNesting │
//! │  ─ delay()   │   ─ wakeups        │                    │
//! │  ─ suspend() │   ─ quantum aging  │                    │
//! ├──────────────┴─────┬──────────────┴────────────────────┤
//! │  Ready Queue       │  Delayed Queue     Task Registry   │
//! │  ready.rs          │  delayed.rs        registry.rs     │
//! ├────────────────────┴───────────────────────────────────┤
//! │         Task Model (task.rs) · Stack Frame (stack.rs)   │
//! ├────────────────────────────────────────────────────────┤
//! │     Port trait (arch/) · Cortex-M4 · host simulation    │
//! │        PendSV · SysTick · first-task launch             │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap by default**: the task table is a fixed slot array and stacks
//!   are caller-provided `'static` buffers
//! - **`alloc` feature**: tasks may ask for a heap-allocated stack instead
//! - **Critical sections**: a nesting counter that masks interrupts only on
//!   the outermost entry
//!
//! The scheduling core is target-independent and runs on the host against
//! [`arch::host::HostPort`]; only `kernel` and `arch::cortex_m4` are tied to
//! the hardware.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod arch;
pub mod config;
pub mod delayed;
pub mod error;
pub mod ready;
pub mod registry;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod task;
pub mod tick;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod kernel;

pub use arch::Port;
pub use config::ClockConfig;
pub use error::KernelError;
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{TaskEntry, TaskHandle, TaskInfo, TaskParams, TaskState, Tick};
