//! # Tick Engine
//!
//! Periodic timer processing, run from the tick interrupt once per tick:
//!
//! 1. Advance the tick counter.
//! 2. Move every delayed task whose wakeup tick has arrived to the tail of
//!    its ready level with a fresh quantum.
//! 3. Age the running task's quantum. On expiry the quantum is reloaded
//!    and a reschedule is flagged; the task itself is re-queued by
//!    [`Scheduler::schedule`], never here.
//! 4. If anything flagged a reschedule, make the scheduling decision. The
//!    switch itself is only requested, never performed, from the tick.

use crate::arch::Port;
use crate::scheduler::Scheduler;
use crate::task::TaskState;

impl<P: Port> Scheduler<P> {
    /// Process one timer tick. Returns `true` if a scheduling decision was
    /// made. Ticks before [`start`](Scheduler::start) are ignored.
    pub fn tick(&mut self) -> bool {
        self.locked(|s| {
            if !s.is_started() {
                return false;
            }
            s.tick_count += 1;
            let now = s.tick_count;
            let mut reschedule = false;

            let running = s.running();
            let running_priority = running.map(|slot| s.tasks[slot].priority);

            while let Some(slot) = s.delayed.pop_due(&mut s.tasks, now) {
                let task = &mut s.tasks[slot];
                task.state = TaskState::Ready;
                task.reset_slice();
                let priority = task.priority;
                s.ready.enqueue(&mut s.tasks, slot);
                log::trace!("tick {}: woke slot {}", now, slot);
                if running_priority.map_or(true, |p| priority <= p) {
                    reschedule = true;
                }
            }

            match running {
                Some(slot) if Some(slot) == s.idle => {
                    if !s.ready.is_empty() {
                        reschedule = true;
                    }
                }
                Some(slot) if s.tasks[slot].state == TaskState::Running => {
                    let task = &mut s.tasks[slot];
                    task.remaining_slice = task.remaining_slice.saturating_sub(1);
                    if task.remaining_slice == 0 {
                        task.reset_slice();
                        reschedule = true;
                    }
                }
                _ => {}
            }

            if reschedule {
                s.schedule();
            }
            reschedule
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::arch::host::HostPort;
    use crate::scheduler::tests::{assert_invariants, dispatch, level, spawn, started, state_of};
    use crate::scheduler::Scheduler;
    use crate::task::{TaskHandle, TaskState};
    use std::vec::Vec;

    fn run_ticks(s: &mut Scheduler<HostPort>, n: usize) -> Vec<TaskHandle> {
        (0..n)
            .map(|_| {
                s.tick();
                dispatch(s);
                s.current_task().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_ticks_before_start_are_ignored() {
        let mut s = Scheduler::new(HostPort::new());
        spawn(&mut s, "a", 1, 10);
        assert!(!s.tick());
        assert_eq!(s.tick_count(), 0);
    }

    #[test]
    fn test_tick_count_advances() {
        let mut s = Scheduler::new(HostPort::new());
        started(&mut s);
        run_ticks(&mut s, 7);
        assert_eq!(s.tick_count(), 7);
    }

    #[test]
    fn test_round_robin_order_with_quantum() {
        let mut s = Scheduler::new(HostPort::new());
        let a = spawn(&mut s, "a", 2, 2);
        let b = spawn(&mut s, "b", 2, 2);
        let c = spawn(&mut s, "c", 2, 2);
        started(&mut s);

        let order = run_ticks(&mut s, 8);
        assert_eq!(order, [a, b, b, c, c, a, a, b]);
        assert_invariants(&s);
    }

    #[test]
    fn test_expired_task_is_enqueued_exactly_once() {
        let mut s = Scheduler::new(HostPort::new());
        let a = spawn(&mut s, "a", 3, 1);
        let b = spawn(&mut s, "b", 3, 1);
        started(&mut s);

        assert!(s.tick());
        assert_eq!(level(&s, 3), [a]);
        assert_eq!(s.ready_queue().len(s.tasks(), 3), 1);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(b));
        assert_eq!(s.task_info(a).unwrap().remaining_slice, 1);
        assert_invariants(&s);
    }

    #[test]
    fn test_lone_task_keeps_cpu_on_expiry() {
        let mut s = Scheduler::new(HostPort::new());
        let a = spawn(&mut s, "a", 1, 3);
        spawn(&mut s, "low", 4, 3);
        started(&mut s);

        for _ in 0..9 {
            s.tick();
            assert_eq!(s.pending_task(), None);
        }
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(s.port().switch_requests(), 0);
        assert_eq!(s.task_info(a).unwrap().remaining_slice, 3);
    }

    #[test]
    fn test_wakeup_preempts_lower_priority() {
        let mut s = Scheduler::new(HostPort::new());
        let high = spawn(&mut s, "high", 0, 10);
        let low = spawn(&mut s, "low", 5, 10);
        started(&mut s);

        s.delay(4);
        dispatch(&mut s);
        let seen = run_ticks(&mut s, 5);
        assert_eq!(seen, [low, low, low, high, high]);
        assert_eq!(state_of(&s, low), TaskState::Ready);
    }

    #[test]
    fn test_wakeup_below_running_priority_waits() {
        let mut s = Scheduler::new(HostPort::new());
        let high = spawn(&mut s, "high", 1, 100);
        let low = spawn(&mut s, "low", 4, 100);
        started(&mut s);
        s.suspend(high);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(low));
        s.resume(high);
        dispatch(&mut s);

        // low sleeps briefly while high runs
        s.suspend(high);
        dispatch(&mut s);
        s.delay(2);
        dispatch(&mut s);
        s.resume(high);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(high));

        let requests = s.port().switch_requests();
        s.tick();
        s.tick();
        assert_eq!(state_of(&s, low), TaskState::Ready);
        assert_eq!(s.port().switch_requests(), requests);
        assert_eq!(s.current_task(), Some(high));
    }

    #[test]
    fn test_simultaneous_wakeups_keep_delay_order() {
        let mut s = Scheduler::new(HostPort::new());
        let a = spawn(&mut s, "a", 2, 10);
        let b = spawn(&mut s, "b", 2, 10);
        spawn(&mut s, "bg", 6, 10);
        started(&mut s);

        s.delay(5);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(b));
        run_ticks(&mut s, 1);
        s.delay(4);
        dispatch(&mut s);

        run_ticks(&mut s, 4);
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(level(&s, 2), [b]);
        assert_invariants(&s);
    }

    #[test]
    fn test_priority_and_round_robin_scenario() {
        // A at 0 works then sleeps 100 ticks; B and C share level 1 with a
        // 10-tick quantum.
        let mut s = Scheduler::new(HostPort::new());
        let a = spawn(&mut s, "a", 0, 10);
        let b = spawn(&mut s, "b", 1, 10);
        let c = spawn(&mut s, "c", 1, 10);
        started(&mut s);
        assert_eq!(s.current_task(), Some(a));

        s.delay(100);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(b));

        let seen = run_ticks(&mut s, 99);
        for (i, &who) in seen.iter().enumerate() {
            // tick i+1 expires a quantum every 10 ticks
            let burst = (i + 1) / 10;
            let expected = if burst % 2 == 0 { b } else { c };
            assert_eq!(who, expected, "tick {}", i + 1);
        }
        assert_eq!(state_of(&s, a), TaskState::Blocked);

        run_ticks(&mut s, 1);
        assert_eq!(s.tick_count(), 100);
        assert_eq!(s.current_task(), Some(a));
        assert_eq!(s.task_info(a).unwrap().remaining_slice, 10);
        assert_invariants(&s);
    }

    #[test]
    fn test_idle_yields_to_any_ready_task() {
        let mut s = Scheduler::new(HostPort::new());
        started(&mut s);
        let idle = s.idle_task().unwrap();
        for _ in 0..5 {
            s.tick();
        }
        assert_eq!(s.current_task(), Some(idle));
        assert_eq!(s.port().switch_requests(), 0);

        let late = spawn(&mut s, "late", 6, 10);
        dispatch(&mut s);
        assert_eq!(s.current_task(), Some(late));
        assert_eq!(state_of(&s, idle), TaskState::Ready);
    }

    #[test]
    fn test_tick_leaves_critical_section_balanced() {
        let mut s = Scheduler::new(HostPort::new());
        spawn(&mut s, "a", 1, 1);
        spawn(&mut s, "b", 1, 1);
        started(&mut s);
        run_ticks(&mut s, 10);
        assert_eq!(s.critical_depth(), 0);
        assert!(!s.port().interrupts_masked());
    }
}
