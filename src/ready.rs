//! # Ready Queue
//!
//! One FIFO per priority level plus a bitmap of non-empty levels.
//!
//! - `enqueue` and `dequeue` are O(1).
//! - `remove` walks one level and is only used on cold paths (suspend,
//!   priority change, delete).
//! - The highest ready level is the lowest set bit of the bitmap.
//!
//! Bit `k` of the bitmap is set if and only if level `k` is non-empty.
//! A preempted or yielding task goes back to the tail of its level, which
//! is all round-robin among equal priorities needs.

use crate::config::PRIORITY_LEVELS;
use crate::registry::TaskRegistry;
use crate::task::{Link, Slot};

#[derive(Debug)]
pub struct ReadyQueue {
    heads: [Option<Slot>; PRIORITY_LEVELS],
    tails: [Option<Slot>; PRIORITY_LEVELS],
    bitmap: u32,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            heads: [None; PRIORITY_LEVELS],
            tails: [None; PRIORITY_LEVELS],
            bitmap: 0,
        }
    }

    /// Bitmap of non-empty levels (bit 0 = highest priority).
    #[inline]
    pub fn bitmap(&self) -> u32 {
        self.bitmap
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    /// Highest-priority (numerically lowest) non-empty level.
    #[inline]
    pub fn highest_level(&self) -> Option<usize> {
        if self.bitmap == 0 {
            None
        } else {
            Some(self.bitmap.trailing_zeros() as usize)
        }
    }

    /// Append `slot` at the tail of its priority level.
    pub fn enqueue(&mut self, tasks: &mut TaskRegistry, slot: Slot) {
        let task = &mut tasks[slot];
        debug_assert_eq!(task.link, Link::Unlinked, "task already queued");
        let level = task.priority as usize;
        task.next = None;
        task.link = Link::Ready;

        match self.tails[level] {
            Some(tail) => tasks[tail].next = Some(slot),
            None => self.heads[level] = Some(slot),
        }
        self.tails[level] = Some(slot);
        self.bitmap |= 1 << level;
        log::trace!("ready: enqueue slot {} at level {}", slot, level);
    }

    /// Pop the head of `level`.
    pub fn dequeue(&mut self, tasks: &mut TaskRegistry, level: usize) -> Option<Slot> {
        let head = self.heads.get(level).copied().flatten()?;
        let task = &mut tasks[head];
        self.heads[level] = task.next.take();
        task.link = Link::Unlinked;

        if self.heads[level].is_none() {
            self.tails[level] = None;
            self.bitmap &= !(1 << level);
        }
        Some(head)
    }

    /// Unlink `slot` from wherever it sits in its level.
    ///
    /// Returns `false` if the task was not in the ready queue.
    pub fn remove(&mut self, tasks: &mut TaskRegistry, slot: Slot) -> bool {
        if tasks[slot].link != Link::Ready {
            return false;
        }
        let level = tasks[slot].priority as usize;

        let mut prev: Option<Slot> = None;
        let mut cursor = self.heads[level];
        while let Some(current) = cursor {
            if current == slot {
                let next = tasks[current].next.take();
                match prev {
                    Some(p) => tasks[p].next = next,
                    None => self.heads[level] = next,
                }
                if self.tails[level] == Some(slot) {
                    self.tails[level] = prev;
                }
                if self.heads[level].is_none() {
                    self.bitmap &= !(1 << level);
                }
                tasks[slot].link = Link::Unlinked;
                return true;
            }
            prev = cursor;
            cursor = tasks[current].next;
        }
        false
    }

    /// Number of tasks waiting at `level`.
    pub fn len(&self, tasks: &TaskRegistry, level: usize) -> usize {
        self.level_iter(tasks, level).count()
    }

    /// Slots at `level` in dispatch order.
    pub fn level_iter<'a>(
        &self,
        tasks: &'a TaskRegistry,
        level: usize,
    ) -> impl Iterator<Item = Slot> + 'a {
        let mut cursor = self.heads.get(level).copied().flatten();
        core::iter::from_fn(move || {
            let current = cursor?;
            cursor = tasks[current].next;
            Some(current)
        })
    }

    /// Check the bitmap and head/tail bookkeeping against the lists.
    pub fn is_consistent(&self, tasks: &TaskRegistry) -> bool {
        (0..PRIORITY_LEVELS).all(|level| {
            let bit = self.bitmap & (1 << level) != 0;
            let last = self.level_iter(tasks, level).last();
            let members_ok = self.level_iter(tasks, level).all(|slot| {
                tasks[slot].link == Link::Ready && tasks[slot].priority as usize == level
            });
            bit == self.heads[level].is_some() && last == self.tails[level] && members_ok
        })
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::make_task;
    use std::vec::Vec;

    #[test]
    fn test_fifo_within_level() {
        let mut tasks = TaskRegistry::new();
        let mut ready = ReadyQueue::new();
        let a = make_task(&mut tasks, 2);
        let b = make_task(&mut tasks, 2);
        let c = make_task(&mut tasks, 2);
        for slot in [a, b, c] {
            ready.enqueue(&mut tasks, slot);
        }

        assert_eq!(ready.bitmap(), 1 << 2);
        assert_eq!(ready.dequeue(&mut tasks, 2), Some(a));
        assert_eq!(ready.dequeue(&mut tasks, 2), Some(b));
        assert_eq!(ready.dequeue(&mut tasks, 2), Some(c));
        assert_eq!(ready.dequeue(&mut tasks, 2), None);
        assert!(ready.is_empty());
        assert!(ready.is_consistent(&tasks));
    }

    #[test]
    fn test_highest_level_is_lowest_set_bit() {
        let mut tasks = TaskRegistry::new();
        let mut ready = ReadyQueue::new();
        let low = make_task(&mut tasks, 5);
        let high = make_task(&mut tasks, 1);
        ready.enqueue(&mut tasks, low);
        assert_eq!(ready.highest_level(), Some(5));
        ready.enqueue(&mut tasks, high);
        assert_eq!(ready.highest_level(), Some(1));
        assert_eq!(ready.bitmap(), (1 << 1) | (1 << 5));
    }

    #[test]
    fn test_remove_patches_head_tail_and_bitmap() {
        let mut tasks = TaskRegistry::new();
        let mut ready = ReadyQueue::new();
        let a = make_task(&mut tasks, 3);
        let b = make_task(&mut tasks, 3);
        let c = make_task(&mut tasks, 3);
        for slot in [a, b, c] {
            ready.enqueue(&mut tasks, slot);
        }

        // middle
        assert!(ready.remove(&mut tasks, b));
        assert!(ready.is_consistent(&tasks));
        assert_eq!(ready.level_iter(&tasks, 3).collect::<Vec<_>>(), [a, c]);

        // tail
        assert!(ready.remove(&mut tasks, c));
        assert!(ready.is_consistent(&tasks));
        ready.enqueue(&mut tasks, b);
        assert_eq!(ready.level_iter(&tasks, 3).collect::<Vec<_>>(), [a, b]);

        // head, then last
        assert!(ready.remove(&mut tasks, a));
        assert!(ready.remove(&mut tasks, b));
        assert_eq!(ready.bitmap(), 0);
        assert!(ready.is_consistent(&tasks));

        // not queued
        assert!(!ready.remove(&mut tasks, a));
    }

    #[test]
    fn test_bitmap_consistent_through_mixed_operations() {
        let mut tasks = TaskRegistry::new();
        let mut ready = ReadyQueue::new();
        let slots: Vec<Slot> = [0u8, 3, 3, 7, 0, 5]
            .iter()
            .map(|&p| make_task(&mut tasks, p))
            .collect();

        for &slot in &slots {
            ready.enqueue(&mut tasks, slot);
            assert!(ready.is_consistent(&tasks));
        }
        ready.remove(&mut tasks, slots[3]);
        assert!(ready.is_consistent(&tasks));
        while let Some(level) = ready.highest_level() {
            ready.dequeue(&mut tasks, level);
            assert!(ready.is_consistent(&tasks));
        }
        assert_eq!(ready.bitmap(), 0);
    }
}
