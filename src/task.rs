//! # Task Control Block
//!
//! Defines the task model for TickOS. A task is a single schedulable
//! instruction stream with its own stack, a fixed priority level, and a
//! round-robin quantum shared with the other tasks at its level.
//!
//! TCBs are owned by the [`TaskRegistry`](crate::registry::TaskRegistry)
//! slot table. Queues never hold TCBs, only slot indices threaded through
//! each TCB's `next` link, so a task can be in at most one queue at a time.

#[cfg(feature = "alloc")]
use alloc::boxed::Box;

use heapless::String;

use crate::config::{DEFAULT_TIME_SLICE, MAX_NAME_LEN};

/// Absolute time in ticks since the scheduler started.
pub type Tick = u64;

/// Index into the task slot table.
pub type Slot = usize;

/// Task entry point. Receives the opaque parameter given at creation in
/// its first argument register. Returning from it is fatal.
pub type TaskEntry = extern "C" fn(param: usize);

/// Fixed-capacity diagnostic name.
pub type TaskName = String<MAX_NAME_LEN>;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task in the scheduler's state machine.
///
/// ```text
///              schedule()
///   ┌──────────┐ ─────────► ┌─────────┐  delay()   ┌──────────┐
///   │  Ready   │            │ Running │ ─────────► │ Blocked  │
///   └──────────┘ ◄───────── └─────────┘            └──────────┘
///     ▲    ▲   yield / quantum   │                      │
///     │    └─────────────────────┼──────────────────────┘
///     │                          │ suspend()      tick: wakeup due
///     │ resume()           ┌───────────┐
///     └─────────────────── │ Suspended │ ◄── suspend() from Ready/Blocked
///                          └───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Task is runnable and waiting in its ready level.
    Ready,
    /// Task owns the CPU (or is the pending switch target).
    Running,
    /// Task is waiting for its wakeup tick in the delayed queue.
    Blocked,
    /// Task is parked until explicitly resumed.
    Suspended,
    /// Task was deleted and waits for its slot to be reclaimed.
    Terminated,
}

/// Which queue currently links a task through its `next` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Unlinked,
    Ready,
    Delayed,
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Reference to a task held by application code.
///
/// A handle names a slot and the identity of the task created there. Once
/// that task is deleted the identity no longer matches and the handle goes
/// stale: every operation on a stale handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    pub(crate) slot: Slot,
    pub(crate) id: u32,
}

impl TaskHandle {
    /// Stable task identity, assigned sequentially at creation.
    #[inline]
    pub const fn id(&self) -> u32 {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Stack regions
// ---------------------------------------------------------------------------

/// Memory a task's call stack lives in. Owned by the task for its whole
/// lifetime and never resized.
#[derive(Debug)]
pub enum StackRegion {
    /// Caller-provided static buffer.
    Static(&'static mut [usize]),
    /// Heap allocation made at creation.
    #[cfg(feature = "alloc")]
    Heap(Box<[usize]>),
}

impl StackRegion {
    /// Region size in machine words.
    #[inline]
    pub fn len(&self) -> usize {
        self.words().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn words(&self) -> &[usize] {
        match self {
            StackRegion::Static(words) => words,
            #[cfg(feature = "alloc")]
            StackRegion::Heap(words) => words,
        }
    }

    pub(crate) fn words_mut(&mut self) -> &mut [usize] {
        match self {
            StackRegion::Static(words) => words,
            #[cfg(feature = "alloc")]
            StackRegion::Heap(words) => words,
        }
    }
}

/// Where a new task's stack comes from.
#[derive(Debug)]
pub enum StackSource {
    /// Use this buffer as-is.
    Static(&'static mut [usize]),
    /// Allocate this many words from the heap at creation.
    #[cfg(feature = "alloc")]
    Heap(usize),
}

// ---------------------------------------------------------------------------
// Creation parameters
// ---------------------------------------------------------------------------

/// Everything needed to create a task.
///
/// ```ignore
/// static mut STACK: [usize; 256] = [0; 256];
///
/// let params = TaskParams::new("sensor")
///     .entry(sensor_task)
///     .param(0)
///     .priority(2)
///     .time_slice(10)
///     .stack(unsafe { &mut *core::ptr::addr_of_mut!(STACK) });
/// ```
#[derive(Debug)]
pub struct TaskParams<'a> {
    pub entry: Option<TaskEntry>,
    pub param: usize,
    pub name: &'a str,
    pub stack: Option<StackSource>,
    pub priority: u8,
    /// Quantum in ticks. Zero selects `DEFAULT_TIME_SLICE`.
    pub time_slice: u32,
}

impl<'a> TaskParams<'a> {
    pub const fn new(name: &'a str) -> Self {
        Self {
            entry: None,
            param: 0,
            name,
            stack: None,
            priority: 0,
            time_slice: 0,
        }
    }

    pub fn entry(mut self, entry: TaskEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn param(mut self, param: usize) -> Self {
        self.param = param;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = ticks;
        self
    }

    pub fn stack(mut self, region: &'static mut [usize]) -> Self {
        self.stack = Some(StackSource::Static(region));
        self
    }

    #[cfg(feature = "alloc")]
    pub fn heap_stack(mut self, words: usize) -> Self {
        self.stack = Some(StackSource::Heap(words));
        self
    }
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

/// Task Control Block (TCB): scheduling state plus the saved execution
/// context of one task.
#[derive(Debug)]
pub struct Task {
    /// Identity assigned at creation.
    pub id: u32,

    pub name: TaskName,

    /// Effective priority used for scheduling. 0 is highest.
    pub priority: u8,

    /// Priority without any boost. Tracks `priority` while no boosting
    /// protocol exists.
    pub base_priority: u8,

    pub state: TaskState,

    /// Saved stack pointer. Written at creation and afterwards only by the
    /// context-switch trap through `Scheduler::switch_context`.
    pub stack_pointer: usize,

    pub stack: StackRegion,

    /// Configured quantum in ticks.
    pub time_slice: u32,

    /// Ticks left before forced rotation.
    pub remaining_slice: u32,

    /// Absolute wakeup tick. Meaningful only while in the delayed queue.
    pub wakeup_time: Tick,

    pub(crate) next: Option<Slot>,
    pub(crate) link: Link,
}

impl Task {
    /// Build a TCB in the Ready state, not yet linked into any queue.
    ///
    /// The stack pointer is left at zero; the caller synthesizes the
    /// initial frame with [`stack::init_frame`](crate::stack::init_frame).
    pub fn new(id: u32, name: &str, priority: u8, time_slice: u32, stack: StackRegion) -> Self {
        let time_slice = if time_slice > 0 {
            time_slice
        } else {
            DEFAULT_TIME_SLICE
        };
        Self {
            id,
            name: truncate_name(name),
            priority,
            base_priority: priority,
            state: TaskState::Ready,
            stack_pointer: 0,
            stack,
            time_slice,
            remaining_slice: time_slice,
            wakeup_time: 0,
            next: None,
            link: Link::Unlinked,
        }
    }

    /// Refill the quantum.
    #[inline]
    pub fn reset_slice(&mut self) {
        self.remaining_slice = self.time_slice;
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.link != Link::Unlinked
    }

    /// Snapshot for diagnostics.
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            priority: self.priority,
            base_priority: self.base_priority,
            time_slice: self.time_slice,
            remaining_slice: self.remaining_slice,
            wakeup_time: if self.link == Link::Delayed { Some(self.wakeup_time) } else { None },
            stack_words: self.stack.len(),
        }
    }
}

/// Point-in-time copy of a task's scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u32,
    pub name: TaskName,
    pub state: TaskState,
    pub priority: u8,
    pub base_priority: u8,
    pub time_slice: u32,
    pub remaining_slice: u32,
    /// Wakeup tick while the task sits in the delayed queue.
    pub wakeup_time: Option<Tick>,
    pub stack_words: usize,
}

/// Copy `name` into a fixed buffer, cutting at the last character boundary
/// that fits.
pub fn truncate_name(name: &str) -> TaskName {
    let mut out = TaskName::new();
    for ch in name.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
