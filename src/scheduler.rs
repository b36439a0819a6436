//! # Scheduler
//!
//! Core scheduling logic for TickOS: a preemptive, priority-bitmap
//! scheduler with round-robin time slicing inside each priority level.
//!
//! ## Scheduling Algorithm
//!
//! On every scheduling decision:
//! 1. **Demote**: if the running task is still runnable, it goes back to
//!    the tail of its ready level. Callers that block the running task
//!    change its state first, so a blocked task is never re-queued here.
//! 2. **Select**: take the head of the highest non-empty ready level
//!    (lowest set bit of the bitmap), or the idle task if there is none.
//! 3. **Request switch**: if the chosen task is not the one whose context
//!    is live on the CPU, record it as the pending `next` task and pend
//!    the port's asynchronous switch trap.
//!
//! The trap later calls [`Scheduler::switch_context`], which stores the
//! outgoing stack pointer and hands back the incoming one. No register
//! state is touched here.
//!
//! ## Mutual Exclusion
//!
//! Every operation that mutates the queues runs inside the nesting
//! critical section owned by the scheduler, so the tick interrupt never
//! sees a half-updated list. Kernel routines nest freely.

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::arch::Port;
use crate::config::{IDLE_PRIORITY, MAX_TASKS, PRIORITY_LEVELS};
use crate::delayed::DelayedQueue;
use crate::error::KernelError;
use crate::ready::ReadyQueue;
use crate::registry::TaskRegistry;
use crate::stack;
use crate::sync::CriticalNesting;
use crate::task::{
    Link, Slot, StackRegion, StackSource, Task, TaskEntry, TaskHandle, TaskInfo, TaskParams,
    TaskState, Tick,
};

/// Counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Scheduling decisions taken.
    pub schedule_calls: u64,
    /// Switches requested from the port.
    pub switch_requests: u64,
    /// Switches completed by the trap.
    pub context_switches: u64,
    /// Completed switches whose incoming task was the idle task.
    pub idle_dispatches: u64,
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state: task table, ready and delayed queues, the
/// current/next task pair and the tick counter.
///
/// ## Design Notes
///
/// - Tasks are stored in a fixed slot table (no heap unless the `alloc`
///   feature provides heap stacks)
/// - `current` is the task whose registers are live on the CPU; `next` is
///   set while a switch is pending
/// - The idle task is never queued; it runs only when every level is empty
pub struct Scheduler<P: Port> {
    port: P,
    nesting: CriticalNesting,
    pub(crate) tasks: TaskRegistry,
    pub(crate) ready: ReadyQueue,
    pub(crate) delayed: DelayedQueue,
    pub(crate) current: Option<Slot>,
    pub(crate) next: Option<Slot>,
    pub(crate) idle: Option<Slot>,
    pub(crate) tick_count: Tick,
    started: bool,
    pub(crate) stats: SchedulerStats,
}

impl<P: Port> Scheduler<P> {
    /// Create an empty scheduler bound to `port`.
    pub const fn new(port: P) -> Self {
        Self {
            port,
            nesting: CriticalNesting::new(),
            tasks: TaskRegistry::new(),
            ready: ReadyQueue::new(),
            delayed: DelayedQueue::new(),
            current: None,
            next: None,
            idle: None,
            tick_count: 0,
            started: false,
            stats: SchedulerStats {
                schedule_calls: 0,
                switch_requests: 0,
                context_switches: 0,
                idle_dispatches: 0,
            },
        }
    }

    // -----------------------------------------------------------------------
    // Critical section
    // -----------------------------------------------------------------------

    /// Enter the kernel critical section. Must be paired with
    /// [`exit_critical`](Self::exit_critical).
    #[inline]
    pub fn enter_critical(&self) {
        self.nesting.enter(&self.port);
    }

    #[inline]
    pub fn exit_critical(&self) {
        self.nesting.exit(&self.port);
    }

    /// Current critical-section nesting depth.
    #[inline]
    pub fn critical_depth(&self) -> u32 {
        self.nesting.depth()
    }

    /// Run `f` inside the kernel critical section.
    #[inline]
    pub fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        self.nesting.with(&self.port, f)
    }

    /// Run `f` with the critical section held and the scheduler borrowed.
    pub(crate) fn locked<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.nesting.enter(&self.port);
        let result = f(self);
        self.nesting.exit(&self.port);
        result
    }

    // -----------------------------------------------------------------------
    // Task creation
    // -----------------------------------------------------------------------

    /// Create a task and make it Ready at its priority level.
    ///
    /// Fails without side effects if the entry function or stack is missing,
    /// the stack is too small, the priority is out of range, or the slot
    /// table (or heap) is exhausted. Once the scheduler is running, a task
    /// created above the running task's priority preempts it.
    pub fn create(&mut self, params: TaskParams<'_>) -> Result<TaskHandle, KernelError> {
        self.locked(|s| {
            s.reap();
            let task = s.prepare(params)?;
            let priority = task.priority;
            let slot = s.tasks.insert(task)?;
            s.ready.enqueue(&mut s.tasks, slot);
            let handle = TaskHandle { slot, id: s.tasks[slot].id };
            log::debug!(
                "created task {} '{}' at priority {}",
                handle.id,
                s.tasks[slot].name,
                priority
            );

            if s.preemption_pending() {
                s.schedule();
            }
            Ok(handle)
        })
    }

    /// Validate `params` and build a TCB with its initial frame. Nothing is
    /// registered; every failure returns before any state changes.
    fn prepare(&mut self, params: TaskParams<'_>) -> Result<Task, KernelError> {
        let entry = params.entry.ok_or(KernelError::MissingEntry)?;
        if params.priority as usize >= PRIORITY_LEVELS {
            return Err(KernelError::InvalidPriority);
        }
        let source = params.stack.ok_or(KernelError::MissingStack)?;
        if !self.tasks.has_free_slot() {
            return Err(KernelError::NoFreeSlot);
        }

        let mut region = Self::stack_region(source)?;
        let sp = stack::init_frame(
            region.words_mut(),
            entry,
            params.param,
            stack::exit_trap_address::<P>(),
        )?;

        let id = self.tasks.next_id();
        let mut task = Task::new(id, params.name, params.priority, params.time_slice, region);
        task.stack_pointer = sp;
        Ok(task)
    }

    fn stack_region(source: StackSource) -> Result<StackRegion, KernelError> {
        match source {
            StackSource::Static(words) if words.is_empty() => Err(KernelError::MissingStack),
            StackSource::Static(words) => Ok(StackRegion::Static(words)),
            #[cfg(feature = "alloc")]
            StackSource::Heap(0) => Err(KernelError::MissingStack),
            #[cfg(feature = "alloc")]
            StackSource::Heap(words) => {
                if words < stack::min_stack_words() {
                    return Err(KernelError::StackTooSmall);
                }
                let mut buffer = Vec::new();
                buffer
                    .try_reserve_exact(words)
                    .map_err(|_| KernelError::OutOfMemory)?;
                buffer.resize(words, 0usize);
                Ok(StackRegion::Heap(buffer.into_boxed_slice()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Startup and context switch glue
    // -----------------------------------------------------------------------

    /// Create the idle task, pick the first task and mark it Running.
    ///
    /// Returns the first task's saved stack pointer; the port restores it
    /// and never comes back.
    pub fn start(
        &mut self,
        idle_entry: TaskEntry,
        idle_stack: &'static mut [usize],
    ) -> Result<usize, KernelError> {
        self.locked(|s| {
            if s.started {
                return Err(KernelError::AlreadyStarted);
            }
            let params = TaskParams::new("idle")
                .entry(idle_entry)
                .priority(IDLE_PRIORITY)
                .stack(idle_stack);
            let idle = s.prepare(params)?;
            let idle = s.tasks.insert(idle)?;
            s.idle = Some(idle);

            let first = s.select_next().unwrap_or(idle);
            s.tasks[first].state = TaskState::Running;
            s.current = Some(first);
            s.next = None;
            s.started = true;
            log::debug!("scheduler started with task {}", s.tasks[first].id);
            Ok(s.tasks[first].stack_pointer)
        })
    }

    /// Complete a pending switch. Called by the port's trap with interrupts
    /// masked, after it has pushed the outgoing registers.
    ///
    /// Stores `saved_sp` into the outgoing TCB, promotes the pending task to
    /// current and returns the stack pointer to restore from. With no switch
    /// pending, returns `saved_sp` unchanged.
    pub fn switch_context(&mut self, saved_sp: usize) -> usize {
        let Some(incoming) = self.next.take() else {
            return saved_sp;
        };
        if let Some(outgoing) = self.current {
            if let Some(task) = self.tasks.get_mut(outgoing) {
                task.stack_pointer = saved_sp;
            }
        }
        self.current = Some(incoming);
        self.stats.context_switches += 1;
        if Some(incoming) == self.idle {
            self.stats.idle_dispatches += 1;
        }
        self.tasks[incoming].stack_pointer
    }

    // -----------------------------------------------------------------------
    // Scheduling decision
    // -----------------------------------------------------------------------

    /// Dequeue the head of the highest-priority non-empty level.
    ///
    /// `None` means nothing is ready and the idle task should run.
    pub fn select_next(&mut self) -> Option<Slot> {
        let level = self.ready.highest_level()?;
        self.ready.dequeue(&mut self.tasks, level)
    }

    /// Make a scheduling decision and request a switch if it changes the
    /// running task.
    pub fn schedule(&mut self) {
        self.locked(|s| {
            if !s.started {
                return;
            }
            s.stats.schedule_calls += 1;

            if let Some(running) = s.running() {
                if s.tasks[running].state == TaskState::Running {
                    s.tasks[running].state = TaskState::Ready;
                    if Some(running) != s.idle {
                        s.ready.enqueue(&mut s.tasks, running);
                    }
                }
            }

            let Some(chosen) = s.select_next().or(s.idle) else {
                return;
            };
            s.tasks[chosen].state = TaskState::Running;

            if Some(chosen) == s.current {
                s.next = None;
            } else {
                s.next = Some(chosen);
                s.stats.switch_requests += 1;
                s.port.request_switch();
            }
        })
    }

    /// The task the scheduler considers running: the pending switch target
    /// if there is one, otherwise the task live on the CPU.
    #[inline]
    pub(crate) fn running(&self) -> Option<Slot> {
        self.next.or(self.current)
    }

    /// Whether a ready task outranks the running one.
    fn preemption_pending(&self) -> bool {
        match self.running() {
            None => false,
            Some(running) if Some(running) == self.idle => !self.ready.is_empty(),
            Some(running) => self
                .ready
                .highest_level()
                .map_or(false, |level| level < self.tasks[running].priority as usize),
        }
    }

    // -----------------------------------------------------------------------
    // Task-side operations
    // -----------------------------------------------------------------------

    /// Give up the CPU to the next task at the same (or higher) priority.
    pub fn yield_now(&mut self) {
        self.locked(|s| {
            let Some(current) = s.current else {
                return;
            };
            s.tasks[current].reset_slice();
            s.schedule();
        })
    }

    /// Block the calling task for `ticks` ticks. `delay(0)` is a yield.
    pub fn delay(&mut self, ticks: Tick) {
        if ticks == 0 {
            self.yield_now();
            return;
        }
        self.locked(|s| {
            let wake = s.tick_count.saturating_add(ticks);
            s.block_current_until(wake);
        })
    }

    /// Periodic delay without drift.
    ///
    /// Advances `*previous_wake` by exactly `period` and blocks until that
    /// tick. If the new wakeup is already due (the caller is running late),
    /// returns `false` immediately so the caller can catch up.
    pub fn delay_until(&mut self, previous_wake: &mut Tick, period: Tick) -> bool {
        self.locked(|s| {
            *previous_wake = previous_wake.saturating_add(period);
            let wake = *previous_wake;
            if wake <= s.tick_count {
                return false;
            }
            s.block_current_until(wake)
        })
    }

    fn block_current_until(&mut self, wake: Tick) -> bool {
        let Some(current) = self.current else {
            log::warn!("delay requested with no running task");
            return false;
        };
        if Some(current) == self.idle {
            return false;
        }
        // Suspended, deleted or already sleeping inside the same critical
        // section: the caller is on its way out and must not be queued again.
        let state = self.tasks[current].state;
        if !matches!(state, TaskState::Running | TaskState::Ready) {
            log::warn!("delay: calling task is {:?}", state);
            return false;
        }
        // A switch may already be pending, which leaves the caller queued.
        self.unlink(current);
        let task = &mut self.tasks[current];
        task.state = TaskState::Blocked;
        task.wakeup_time = wake;
        self.delayed.insert(&mut self.tasks, current);
        self.schedule();
        true
    }

    /// Park a task until [`resume`](Self::resume). Stale handles, the idle
    /// task and already-suspended tasks are ignored.
    pub fn suspend(&mut self, handle: TaskHandle) {
        self.locked(|s| {
            let Some(slot) = s.tasks.resolve(handle) else {
                log::debug!("suspend: stale handle {}", handle.id);
                return;
            };
            if Some(slot) == s.idle {
                log::warn!("suspend: refusing to suspend the idle task");
                return;
            }
            if matches!(s.tasks[slot].state, TaskState::Suspended | TaskState::Terminated) {
                return;
            }

            s.unlink(slot);
            s.tasks[slot].state = TaskState::Suspended;
            log::debug!("suspended task {}", handle.id);

            if s.running() == Some(slot) {
                s.schedule();
            }
        })
    }

    /// Make a suspended task Ready again. Preempts the running task if the
    /// resumed one has a higher priority.
    pub fn resume(&mut self, handle: TaskHandle) {
        self.locked(|s| {
            let Some(slot) = s.tasks.resolve(handle) else {
                log::debug!("resume: stale handle {}", handle.id);
                return;
            };
            if s.tasks[slot].state != TaskState::Suspended {
                return;
            }

            let task = &mut s.tasks[slot];
            task.reset_slice();
            task.state = TaskState::Ready;
            s.ready.enqueue(&mut s.tasks, slot);
            log::debug!("resumed task {}", handle.id);

            if s.preemption_pending() {
                s.schedule();
            }
        })
    }

    /// Change a task's priority, moving it between ready levels if queued.
    ///
    /// Values past the lowest level are clamped to it. Lowering the
    /// running task below a ready one, or raising a ready task above the
    /// running one, reschedules.
    pub fn set_priority(&mut self, handle: TaskHandle, priority: u8) {
        self.locked(|s| {
            let Some(slot) = s.tasks.resolve(handle) else {
                log::debug!("set_priority: stale handle {}", handle.id);
                return;
            };
            if Some(slot) == s.idle {
                return;
            }
            let priority = if priority as usize >= PRIORITY_LEVELS {
                log::warn!("set_priority: clamping {} to {}", priority, PRIORITY_LEVELS - 1);
                (PRIORITY_LEVELS - 1) as u8
            } else {
                priority
            };
            if s.tasks[slot].priority == priority {
                return;
            }

            let queued = s.ready.remove(&mut s.tasks, slot);
            let task = &mut s.tasks[slot];
            task.priority = priority;
            task.base_priority = priority;
            if queued {
                s.ready.enqueue(&mut s.tasks, slot);
            }
            log::debug!("task {} priority -> {}", handle.id, priority);

            if s.preemption_pending() {
                s.schedule();
            }
        })
    }

    /// Effective priority of a task, or `None` for a stale handle.
    pub fn get_priority(&self, handle: TaskHandle) -> Option<u8> {
        let slot = self.tasks.resolve(handle)?;
        Some(self.tasks[slot].priority)
    }

    /// Delete a task. Its slot is reclaimed at once unless it is still
    /// live on the CPU, in which case [`reap`](Self::reap) frees it after
    /// the switch away.
    pub fn delete(&mut self, handle: TaskHandle) {
        self.locked(|s| {
            let Some(slot) = s.tasks.resolve(handle) else {
                log::debug!("delete: stale handle {}", handle.id);
                return;
            };
            if Some(slot) == s.idle {
                log::warn!("delete: refusing to delete the idle task");
                return;
            }

            s.unlink(slot);
            s.tasks[slot].state = TaskState::Terminated;
            log::debug!("deleted task {}", handle.id);

            if s.running() == Some(slot) {
                s.schedule();
            }
            s.reap();
        })
    }

    /// Release the slots of terminated tasks that are no longer live on the
    /// CPU. Returns how many were freed. Must run in task context.
    pub fn reap(&mut self) -> usize {
        self.locked(|s| {
            let mut freed = 0;
            for slot in 0..MAX_TASKS {
                let terminated = s
                    .tasks
                    .get(slot)
                    .map_or(false, |task| task.state == TaskState::Terminated);
                if terminated && Some(slot) != s.current && Some(slot) != s.next {
                    s.tasks.release(slot);
                    freed += 1;
                }
            }
            freed
        })
    }

    /// Take a task out of whichever queue holds it.
    fn unlink(&mut self, slot: Slot) {
        match self.tasks[slot].link {
            Link::Ready => {
                self.ready.remove(&mut self.tasks, slot);
            }
            Link::Delayed => {
                self.delayed.remove(&mut self.tasks, slot);
            }
            Link::Unlinked => {}
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Handle of the task whose context is live on the CPU (the caller, in
    /// task context).
    pub fn current_task(&self) -> Option<TaskHandle> {
        self.current.and_then(|slot| self.tasks.handle(slot))
    }

    /// Task a requested switch will dispatch, if one is pending.
    pub fn pending_task(&self) -> Option<TaskHandle> {
        self.next.and_then(|slot| self.tasks.handle(slot))
    }

    /// Handle of the idle task once started.
    pub fn idle_task(&self) -> Option<TaskHandle> {
        self.idle.and_then(|slot| self.tasks.handle(slot))
    }

    pub fn task_info(&self, handle: TaskHandle) -> Option<TaskInfo> {
        let slot = self.tasks.resolve(handle)?;
        Some(self.tasks[slot].info())
    }

    /// Borrow a task's TCB.
    pub fn task(&self, handle: TaskHandle) -> Option<&Task> {
        let slot = self.tasks.resolve(handle)?;
        self.tasks.get(slot)
    }

    #[inline]
    pub fn tick_count(&self) -> Tick {
        self.tick_count
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.started
    }

    #[inline]
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn ready_queue(&self) -> &ReadyQueue {
        &self.ready
    }

    pub fn delayed_queue(&self) -> &DelayedQueue {
        &self.delayed
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
