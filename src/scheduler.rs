/// Completion scheduler: an indexed min-heap of predicted action end dates.
///
/// Entries are keyed by `(date, seq)`, with `seq` a monotonic insertion
/// counter so that ties pop in insertion order. Every action has at most
/// one entry, and the heap tracks each entry's slot so that an action's
/// entry can be updated or removed in `O(log n)` without scanning.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::action::ActionId;

/// Why an action is expected to change state at the entry's date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// The remaining work reaches zero.
    Normal,
    /// The action's `max_duration` expires.
    MaxDuration,
    /// The latency phase ends and the action starts consuming.
    Latency,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeapEntry {
    pub date: f64,
    pub action: ActionId,
    pub kind: EntryKind,
    seq: u64,
}

impl HeapEntry {
    fn cmp_key(&self, other: &HeapEntry) -> Ordering {
        self.date
            .total_cmp(&other.date)
            .then(self.seq.cmp(&other.seq))
    }
}

/// The per-model completion heap.
#[derive(Debug, Clone, Default)]
pub struct CompletionScheduler {
    heap: Vec<HeapEntry>,
    /// Current slot of each action's entry.
    slots: HashMap<ActionId, usize>,
    next_seq: u64,
}

impl CompletionScheduler {
    /// Create a new, empty scheduler.
    pub fn new() -> Self {
        CompletionScheduler {
            heap: Vec::new(),
            slots: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `action` at `date`, replacing any entry it already had.
    pub fn insert(&mut self, action: ActionId, date: f64, kind: EntryKind) {
        self.remove(action);
        let seq = self.next_seq;
        self.next_seq += 1;
        let pos = self.heap.len();
        self.heap.push(HeapEntry {
            date,
            action,
            kind,
            seq,
        });
        self.slots.insert(action, pos);
        self.sift_up(pos);
    }

    /// Remove the entry of `action`, if any.
    pub fn remove(&mut self, action: ActionId) -> Option<HeapEntry> {
        let pos = self.slots.remove(&action)?;
        let last = self.heap.len() - 1;
        self.heap.swap(pos, last);
        let entry = self.heap.pop();
        if pos < self.heap.len() {
            let moved = self.heap[pos].action;
            self.slots.insert(moved, pos);
            self.sift_down(pos);
            self.sift_up(pos);
        }
        entry
    }

    /// The earliest entry.
    pub fn peek(&self) -> Option<&HeapEntry> {
        self.heap.first()
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<HeapEntry> {
        let action = self.heap.first()?.action;
        self.remove(action)
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.slots.contains_key(&action)
    }

    /// Scheduled date of `action`.
    pub fn date_of(&self, action: ActionId) -> Option<f64> {
        self.slots.get(&action).map(|pos| self.heap[*pos].date)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Drain all entries in pop order into a `Vec`.
    pub fn drain_ordered(&mut self) -> Vec<HeapEntry> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.pop() {
            out.push(entry);
        }
        out
    }

    // ── Heap maintenance ──────────────────────────────────────────────

    fn swap_slots(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.slots.insert(self.heap[a].action, a);
        self.slots.insert(self.heap[b].action, b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].cmp_key(&self.heap[parent]) != Ordering::Less {
                break;
            }
            self.swap_slots(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < len && self.heap[left].cmp_key(&self.heap[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < len && self.heap[right].cmp_key(&self.heap[smallest]) == Ordering::Less {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap_slots(pos, smallest);
            pos = smallest;
        }
    }

    /// Every slot record matches the heap and the heap property holds.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let slots_ok = self.slots.len() == self.heap.len()
            && self
                .heap
                .iter()
                .enumerate()
                .all(|(pos, e)| self.slots.get(&e.action) == Some(&pos));
        let heap_ok = (1..self.heap.len())
            .all(|pos| self.heap[(pos - 1) / 2].cmp_key(&self.heap[pos]) != Ordering::Greater);
        slots_ok && heap_ok
    }
}
