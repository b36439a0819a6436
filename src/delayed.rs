//! # Delayed Queue
//!
//! A single list of time-waiting tasks, sorted ascending by wakeup tick.
//! Insertion walks to the first entry that wakes strictly later, so tasks
//! with the same wakeup tick leave in the order they went in. The tick
//! engine only ever looks at the head.

use crate::registry::TaskRegistry;
use crate::task::{Link, Slot, Tick};

#[derive(Debug)]
pub struct DelayedQueue {
    head: Option<Slot>,
    len: usize,
}

impl DelayedQueue {
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Wakeup tick of the earliest sleeper.
    #[inline]
    pub fn next_wakeup(&self, tasks: &TaskRegistry) -> Option<Tick> {
        self.head.map(|slot| tasks[slot].wakeup_time)
    }

    /// Splice `slot` in by its `wakeup_time`. O(n).
    pub fn insert(&mut self, tasks: &mut TaskRegistry, slot: Slot) {
        debug_assert_eq!(tasks[slot].link, Link::Unlinked, "task already queued");
        let wake = tasks[slot].wakeup_time;

        let mut prev: Option<Slot> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if tasks[current].wakeup_time > wake {
                break;
            }
            prev = cursor;
            cursor = tasks[current].next;
        }

        let task = &mut tasks[slot];
        task.next = cursor;
        task.link = Link::Delayed;
        match prev {
            Some(p) => tasks[p].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.len += 1;
        log::trace!("delayed: slot {} sleeps until tick {}", slot, wake);
    }

    /// Pop the head if its wakeup tick is `<= now`.
    ///
    /// Call repeatedly to drain every due entry; the first entry not yet
    /// due stops the drain and the list stays sorted.
    pub fn pop_due(&mut self, tasks: &mut TaskRegistry, now: Tick) -> Option<Slot> {
        let head = self.head?;
        if tasks[head].wakeup_time > now {
            return None;
        }
        let task = &mut tasks[head];
        self.head = task.next.take();
        task.link = Link::Unlinked;
        self.len -= 1;
        Some(head)
    }

    /// Unlink `slot`. Returns `false` if it was not in the delayed queue.
    pub fn remove(&mut self, tasks: &mut TaskRegistry, slot: Slot) -> bool {
        if tasks[slot].link != Link::Delayed {
            return false;
        }

        let mut prev: Option<Slot> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            if current == slot {
                let next = tasks[current].next.take();
                match prev {
                    Some(p) => tasks[p].next = next,
                    None => self.head = next,
                }
                tasks[slot].link = Link::Unlinked;
                self.len -= 1;
                return true;
            }
            prev = cursor;
            cursor = tasks[current].next;
        }
        false
    }

    /// Slots in wakeup order.
    pub fn iter<'a>(&self, tasks: &'a TaskRegistry) -> impl Iterator<Item = Slot> + 'a {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let current = cursor?;
            cursor = tasks[current].next;
            Some(current)
        })
    }

    /// Whether the list is ascending by wakeup tick.
    pub fn is_sorted(&self, tasks: &TaskRegistry) -> bool {
        let mut last: Option<Tick> = None;
        self.iter(tasks).all(|slot| {
            let wake = tasks[slot].wakeup_time;
            let ok = last.map_or(true, |l| l <= wake);
            last = Some(wake);
            ok
        })
    }
}

impl Default for DelayedQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::make_task;
    use std::vec::Vec;

    fn sleeper(tasks: &mut TaskRegistry, wake: Tick) -> Slot {
        let slot = make_task(tasks, 1);
        tasks[slot].wakeup_time = wake;
        slot
    }

    #[test]
    fn test_insert_keeps_ascending_order() {
        let mut tasks = TaskRegistry::new();
        let mut delayed = DelayedQueue::new();
        let wakes = [50, 10, 30, 10, 70, 20];
        let slots: Vec<Slot> = wakes.iter().map(|&w| sleeper(&mut tasks, w)).collect();
        for &slot in &slots {
            delayed.insert(&mut tasks, slot);
            assert!(delayed.is_sorted(&tasks));
        }

        let order: Vec<Tick> = delayed.iter(&tasks).map(|s| tasks[s].wakeup_time).collect();
        assert_eq!(order, [10, 10, 20, 30, 50, 70]);
        // equal wakeups keep insertion order
        let tens: Vec<Slot> = delayed.iter(&tasks).take(2).collect();
        assert_eq!(tens, [slots[1], slots[3]]);
        assert_eq!(delayed.len(), 6);
    }

    #[test]
    fn test_pop_due_stops_at_first_future_entry() {
        let mut tasks = TaskRegistry::new();
        let mut delayed = DelayedQueue::new();
        let a = sleeper(&mut tasks, 5);
        let b = sleeper(&mut tasks, 5);
        let c = sleeper(&mut tasks, 9);
        for slot in [c, a, b] {
            delayed.insert(&mut tasks, slot);
        }

        assert_eq!(delayed.pop_due(&mut tasks, 4), None);
        assert_eq!(delayed.pop_due(&mut tasks, 5), Some(a));
        assert_eq!(delayed.pop_due(&mut tasks, 5), Some(b));
        assert_eq!(delayed.pop_due(&mut tasks, 5), None);
        assert_eq!(delayed.next_wakeup(&tasks), Some(9));
        assert_eq!(tasks[a].link, Link::Unlinked);
        assert_eq!(delayed.pop_due(&mut tasks, 100), Some(c));
        assert!(delayed.is_empty());
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let mut tasks = TaskRegistry::new();
        let mut delayed = DelayedQueue::new();
        let slots: Vec<Slot> = [1, 2, 3, 4].iter().map(|&w| sleeper(&mut tasks, w)).collect();
        for &slot in &slots {
            delayed.insert(&mut tasks, slot);
        }

        assert!(delayed.remove(&mut tasks, slots[1]));
        assert!(delayed.remove(&mut tasks, slots[3]));
        assert!(delayed.remove(&mut tasks, slots[0]));
        assert!(!delayed.remove(&mut tasks, slots[0]));
        assert!(delayed.is_sorted(&tasks));
        assert_eq!(delayed.iter(&tasks).collect::<Vec<_>>(), [slots[2]]);
        assert_eq!(delayed.len(), 1);
    }
}
