//! # hysim-engine::sched
//!
//! A binary heap that keeps atomic components ordered by their next event
//! time. Slot 0 holds a sentinel with a pre-zero priority so percolation
//! toward the root needs no bounds check. The heap position of every
//! scheduled component is tracked in a map private to this module, giving
//! O(1) location for increase-key and decrease-key; position 0 means "not
//! scheduled".

use hysim_types::id::ComponentId;
use hysim_types::time::Time;

#[derive(Clone, Copy)]
struct HeapElem<T> {
    item: ComponentId,
    priority: T,
}

pub(crate) struct Schedule<T: Time> {
    /// heap[1..] is the binary heap; heap[0] is the sentinel.
    heap: Vec<HeapElem<T>>,
    /// Heap slot of each component, indexed by id. 0 = absent.
    q_index: Vec<usize>,
}

impl<T: Time> Schedule<T> {
    pub fn new() -> Self {
        Self {
            heap: vec![HeapElem {
                item: ComponentId::MAX,
                priority: T::sentinel(),
            }],
            q_index: Vec::new(),
        }
    }

    fn slot_of(&self, item: ComponentId) -> usize {
        self.q_index.get(item).copied().unwrap_or(0)
    }

    fn set_slot(&mut self, item: ComponentId, slot: usize) {
        if self.q_index.len() <= item {
            self.q_index.resize(item + 1, 0);
        }
        self.q_index[item] = slot;
    }

    pub fn len(&self) -> usize {
        self.heap.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The time of the next event, or `inf` when nothing is scheduled.
    pub fn min_priority(&self) -> T {
        match self.heap.get(1) {
            Some(elem) => elem.priority,
            None => T::inf(),
        }
    }

    /// The component at the front of the queue.
    pub fn peek_min(&self) -> Option<ComponentId> {
        self.heap.get(1).map(|elem| elem.item)
    }

    /// The priority stored for a component, if it is scheduled.
    pub fn stored_priority(&self, item: ComponentId) -> Option<T> {
        let slot = self.slot_of(item);
        if slot == 0 {
            None
        } else {
            Some(self.heap[slot].priority)
        }
    }

    /// Collect every component whose stored priority equals the current
    /// minimum. Order within the set is unspecified; the heap is left
    /// unmodified.
    pub fn visit_imminent(&self, out: &mut Vec<ComponentId>) {
        self.visit_imminent_rec(1, out);
    }

    fn visit_imminent_rec(&self, root: usize, out: &mut Vec<ComponentId>) {
        // Stop at the bottom, or where the priority falls behind the minimum.
        if root >= self.heap.len() || self.heap[1].priority < self.heap[root].priority {
            return;
        }
        out.push(self.heap[root].item);
        self.visit_imminent_rec(root * 2, out);
        self.visit_imminent_rec(root * 2 + 1, out);
    }

    /// Erase the component at the front of the queue.
    pub fn remove_minimum(&mut self) {
        if self.len() == 0 {
            return;
        }
        let min_item = self.heap[1].item;
        self.set_slot(min_item, 0);
        let Some(last) = self.heap.pop() else { return };
        if self.heap.len() > 1 {
            // Fill the hole left by the removed minimum.
            let slot = self.percolate_down(1, last.priority);
            self.heap[slot] = last;
            self.set_slot(last.item, slot);
        }
    }

    /// Add, move, or remove a component as required by its priority: an
    /// `inf` priority removes a scheduled component, a finite priority
    /// inserts an absent one, and a changed priority re-percolates in
    /// place. Re-scheduling at the stored priority is a no-op.
    pub fn schedule(&mut self, item: ComponentId, priority: T) {
        let slot = self.slot_of(item);
        if slot != 0 {
            if !(priority < T::inf()) {
                // Move the item to the top of the heap and remove it.
                let min_priority = self.min_priority();
                let top = self.percolate_up(slot, min_priority);
                self.heap[top] = HeapElem {
                    item,
                    priority: min_priority,
                };
                self.set_slot(item, top);
                self.remove_minimum();
            } else if priority < self.heap[slot].priority {
                let new_slot = self.percolate_up(slot, priority);
                self.heap[new_slot] = HeapElem { item, priority };
                self.set_slot(item, new_slot);
            } else if self.heap[slot].priority < priority {
                let new_slot = self.percolate_down(slot, priority);
                self.heap[new_slot] = HeapElem { item, priority };
                self.set_slot(item, new_slot);
            }
            // Unchanged priority: nothing to do.
        } else if priority < T::inf() {
            // Occupy a new slot at the end and percolate into place.
            self.heap.push(HeapElem { item, priority });
            let new_slot = self.percolate_up(self.heap.len() - 1, priority);
            self.heap[new_slot] = HeapElem { item, priority };
            self.set_slot(item, new_slot);
        }
        // Absent with an infinite priority: the component has no next event.
    }

    /// Move the hole at `slot` toward the leaves until `priority` fits;
    /// returns the hole's final slot.
    fn percolate_down(&mut self, mut slot: usize, priority: T) -> usize {
        let size = self.heap.len() - 1;
        while slot * 2 <= size {
            let mut child = slot * 2;
            if child != size && self.heap[child + 1].priority < self.heap[child].priority {
                child += 1;
            }
            if self.heap[child].priority < priority {
                self.heap[slot] = self.heap[child];
                self.set_slot(self.heap[slot].item, slot);
                slot = child;
            } else {
                break;
            }
        }
        slot
    }

    /// Move the hole at `slot` toward the root until `priority` fits;
    /// returns the hole's final slot. The sentinel guarantees termination.
    fn percolate_up(&mut self, mut slot: usize, priority: T) -> usize {
        while priority <= self.heap[slot / 2].priority {
            self.heap[slot] = self.heap[slot / 2];
            self.set_slot(self.heap[slot].item, slot);
            slot /= 2;
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn remove_then_reschedule() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(0, 0.0);
        q.remove_minimum();
        q.schedule(0, 0.0);
        q.schedule(0, 1.0);
        assert_eq!(q.min_priority(), 1.0);
    }

    #[test]
    fn min_tracks_insert_order() {
        let mut q: Schedule<f64> = Schedule::new();
        for i in 0..10 {
            q.schedule(i, i as f64);
            assert_eq!(q.min_priority(), 0.0);
            assert_eq!(q.peek_min(), Some(0));
        }
        for i in 0..10 {
            assert_eq!(q.min_priority(), i as f64);
            assert_eq!(q.peek_min(), Some(i));
            q.remove_minimum();
        }
        assert!(q.is_empty());
    }

    #[test]
    fn interleaved_insert_and_pop() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(0, 1.0);
        q.schedule(1, 10.0);
        q.schedule(2, 5.0);
        assert_eq!(q.min_priority(), 1.0);
        q.remove_minimum();
        assert_eq!(q.min_priority(), 5.0);
        q.schedule(3, 3.0);
        q.schedule(4, 4.0);
        assert_eq!(q.min_priority(), 3.0);
        q.remove_minimum();
        assert_eq!(q.min_priority(), 4.0);
        q.remove_minimum();
        assert_eq!(q.min_priority(), 5.0);
        q.remove_minimum();
        assert_eq!(q.min_priority(), 10.0);
        q.remove_minimum();
        assert!(q.is_empty());
    }

    #[test]
    fn infinite_priority_removes() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(0, 5.0);
        q.schedule(1, 10.0);
        q.schedule(2, 1.0);
        q.schedule(0, f64::INFINITY);
        assert_eq!(q.min_priority(), 1.0);
        q.schedule(2, f64::INFINITY);
        assert_eq!(q.min_priority(), 10.0);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_of_equal_priority_keeps_the_other() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(0, 1.0);
        q.schedule(1, 1.0);
        q.schedule(0, f64::INFINITY);
        assert_eq!(q.peek_min(), Some(1));
        assert_eq!(q.min_priority(), 1.0);
    }

    #[test]
    fn reschedule_is_idempotent() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(0, 2.0);
        q.schedule(1, 3.0);
        q.schedule(0, 4.0);
        q.schedule(0, 4.0);
        assert_eq!(q.peek_min(), Some(1));
        assert_eq!(q.len(), 2);
        q.remove_minimum();
        assert_eq!(q.peek_min(), Some(0));
        q.schedule(1, 1.0);
        assert_eq!(q.peek_min(), Some(1));
    }

    #[test]
    fn imminent_set_holds_every_minimum() {
        let mut q: Schedule<f64> = Schedule::new();
        for i in 0..10 {
            q.schedule(i, 1.0);
        }
        for i in 10..20 {
            q.schedule(i, 2.0);
        }
        let mut imm = Vec::new();
        q.visit_imminent(&mut imm);
        assert_eq!(imm.len(), 10);
        assert!(imm.iter().all(|&m| m < 10));
        // The heap itself is unmodified.
        assert_eq!(q.len(), 20);
        assert_eq!(q.min_priority(), 1.0);
    }

    #[test]
    fn empty_queue_reports_infinity() {
        let q: Schedule<f64> = Schedule::new();
        assert_eq!(q.min_priority(), f64::INFINITY);
        assert_eq!(q.peek_min(), None);
    }

    #[test]
    fn random_stress_pops_in_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(200);
        let mut q: Schedule<f64> = Schedule::new();
        for i in 0..2000 {
            q.schedule(i, rng.gen_range(0.0..1.0e6));
        }
        assert_eq!(q.len(), 2000);
        let mut count = 0;
        let mut last = q.min_priority();
        while !q.is_empty() {
            assert!(last <= q.min_priority());
            last = q.min_priority();
            q.remove_minimum();
            count += 1;
        }
        assert_eq!(count, 2000);
    }

    #[test]
    fn random_stress_with_reprioritization() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut q: Schedule<f64> = Schedule::new();
        for _ in 0..3000 {
            let id = rng.gen_range(0..200);
            q.schedule(id, rng.gen_range(0.0..1.0e3));
        }
        let mut last = q.min_priority();
        while !q.is_empty() {
            assert!(last <= q.min_priority());
            last = q.min_priority();
            q.remove_minimum();
        }
    }

    #[test]
    fn stored_priority_matches_heap() {
        let mut q: Schedule<f64> = Schedule::new();
        q.schedule(3, 9.0);
        q.schedule(5, 2.0);
        q.schedule(3, 1.0);
        assert_eq!(q.stored_priority(3), Some(1.0));
        assert_eq!(q.stored_priority(5), Some(2.0));
        assert_eq!(q.stored_priority(0), None);
    }
}
