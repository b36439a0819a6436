//! # Task Registry
//!
//! Fixed-capacity slot table that owns every TCB. Unused slots are kept on
//! an index free list, so allocation and release are O(1) and no heap is
//! involved. Queues refer to tasks only by slot index.

use core::ops::{Index, IndexMut};

use crate::config::MAX_TASKS;
use crate::error::KernelError;
use crate::task::{Slot, Task, TaskHandle};

/// Owner of all task control blocks.
#[derive(Debug)]
pub struct TaskRegistry {
    slots: [Option<Task>; MAX_TASKS],
    /// Free-list successor of each unused slot.
    free_next: [Option<Slot>; MAX_TASKS],
    free_head: Option<Slot>,
    next_id: u32,
    count: usize,
}

impl TaskRegistry {
    pub const fn new() -> Self {
        let mut free_next = [None; MAX_TASKS];
        let mut i = 0;
        while i + 1 < MAX_TASKS {
            free_next[i] = Some(i + 1);
            i += 1;
        }
        Self {
            slots: [const { None }; MAX_TASKS],
            free_next,
            free_head: Some(0),
            next_id: 1,
            count: 0,
        }
    }

    /// Number of live tasks.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn has_free_slot(&self) -> bool {
        self.free_head.is_some()
    }

    /// Next sequential identity that no live task holds.
    pub fn next_id(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            if !self.iter().any(|(_, task)| task.id == id) {
                return id;
            }
        }
    }

    /// Store a task in a free slot.
    pub fn insert(&mut self, task: Task) -> Result<Slot, KernelError> {
        let slot = self.free_head.ok_or(KernelError::NoFreeSlot)?;
        self.free_head = self.free_next[slot].take();
        self.slots[slot] = Some(task);
        self.count += 1;
        Ok(slot)
    }

    /// Take a task out of its slot and return the slot to the free list.
    ///
    /// The caller must already have unlinked it from every queue.
    pub fn release(&mut self, slot: Slot) -> Option<Task> {
        let task = self.slots.get_mut(slot)?.take()?;
        debug_assert!(!task.is_linked(), "released task still queued");
        self.free_next[slot] = self.free_head;
        self.free_head = Some(slot);
        self.count -= 1;
        Some(task)
    }

    #[inline]
    pub fn get(&self, slot: Slot) -> Option<&Task> {
        self.slots.get(slot)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Task> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Slot of the live task `handle` refers to, or `None` if stale.
    pub fn resolve(&self, handle: TaskHandle) -> Option<Slot> {
        match self.get(handle.slot) {
            Some(task) if task.id == handle.id => Some(handle.slot),
            _ => None,
        }
    }

    /// Handle for the task in `slot`.
    pub fn handle(&self, slot: Slot) -> Option<TaskHandle> {
        self.get(slot).map(|task| TaskHandle { slot, id: task.id })
    }

    /// Iterate over occupied slots.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &Task)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, task)| task.as_ref().map(|t| (slot, t)))
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Slot> for TaskRegistry {
    type Output = Task;

    fn index(&self, slot: Slot) -> &Task {
        match self.get(slot) {
            Some(task) => task,
            None => panic!("task slot {} is empty", slot),
        }
    }
}

impl IndexMut<Slot> for TaskRegistry {
    fn index_mut(&mut self, slot: Slot) -> &mut Task {
        match self.get_mut(slot) {
            Some(task) => task,
            None => panic!("task slot {} is empty", slot),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::task::StackRegion;
    use std::boxed::Box;
    use std::vec;

    pub(crate) fn make_task(registry: &mut TaskRegistry, priority: u8) -> Slot {
        let id = registry.next_id();
        let stack = StackRegion::Static(Box::leak(vec![0usize; 32].into_boxed_slice()));
        registry.insert(Task::new(id, "t", priority, 10, stack)).unwrap()
    }

    #[test]
    fn test_fills_every_slot_then_rejects() {
        let mut registry = TaskRegistry::new();
        for _ in 0..MAX_TASKS {
            make_task(&mut registry, 1);
        }
        assert_eq!(registry.len(), MAX_TASKS);
        assert!(!registry.has_free_slot());

        let stack = StackRegion::Static(Box::leak(vec![0usize; 32].into_boxed_slice()));
        let extra = Task::new(99, "x", 1, 10, stack);
        assert_eq!(registry.insert(extra).unwrap_err(), KernelError::NoFreeSlot);
    }

    #[test]
    fn test_released_slot_is_reused_with_new_identity() {
        let mut registry = TaskRegistry::new();
        let a = make_task(&mut registry, 1);
        let handle = registry.handle(a).unwrap();
        assert_eq!(registry.resolve(handle), Some(a));

        registry.release(a).unwrap();
        assert_eq!(registry.resolve(handle), None);

        let b = make_task(&mut registry, 1);
        assert_eq!(b, a);
        assert_ne!(registry[b].id, handle.id());
        assert_eq!(registry.resolve(handle), None);
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut registry = TaskRegistry::new();
        let a = make_task(&mut registry, 0);
        let b = make_task(&mut registry, 0);
        assert_eq!(registry[a].id, 1);
        assert_eq!(registry[b].id, 2);
    }
}
