//! Timer queue with lazy deletion
//!
//! A min-heap over `(deadline, tie, id)` plus a HashMap of live entries.
//! Removing a timer only touches the map; stale heap keys are discarded on
//! peek/pop.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Heap key. Equal deadlines are ordered by tie (insertion sequence), then id.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Key {
    deadline: u64,
    tie: u64,
    id: u64,
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the ordering is reversed.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.deadline, self.tie, self.id)
            .cmp(&(other.deadline, other.tie, other.id))
            .reverse()
    }
}

/// A min-priority queue of timers keyed by logical deadline.
pub struct MinPq<M> {
    heap: BinaryHeap<Key>,
    live: HashMap<u64, (u64, u64, M)>, // id -> (deadline, tie, metadata)
}

impl<M> Default for MinPq<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MinPq<M> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashMap::new(),
        }
    }

    /// Add an item to the queue. Returns false if id already exists.
    pub fn add(&mut self, id: u64, deadline: u64, tie: u64, meta: M) -> bool {
        if self.live.contains_key(&id) {
            return false;
        }
        self.live.insert(id, (deadline, tie, meta));
        self.heap.push(Key { deadline, tie, id });
        true
    }

    /// Remove an item by id. Returns the metadata if found.
    pub fn remove(&mut self, id: u64) -> Option<M> {
        self.live.remove(&id).map(|(_, _, m)| m)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.live.contains_key(&id)
    }

    /// Peek the minimum deadline without removing. Returns None if empty.
    pub fn peek_deadline(&mut self) -> Option<u64> {
        self.clean_top();
        self.heap.peek().map(|k| k.deadline)
    }

    /// Pop the minimum item. Returns (id, deadline, tie, metadata).
    pub fn pop(&mut self) -> Option<(u64, u64, u64, M)> {
        loop {
            let k = self.heap.pop()?;
            match self.live.get(&k.id) {
                Some((dl, tie, _)) if *dl == k.deadline && *tie == k.tie => {}
                _ => continue, // stale entry
            }
            if let Some((dl, tie, meta)) = self.live.remove(&k.id) {
                return Some((k.id, dl, tie, meta));
            }
        }
    }

    /// Drop removed entries from the top of the heap.
    fn clean_top(&mut self) {
        while let Some(k) = self.heap.peek() {
            let ok = match self.live.get(&k.id) {
                Some((dl, tie, _)) => *dl == k.deadline && *tie == k.tie,
                None => false,
            };
            if ok {
                break;
            }
            self.heap.pop();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let mut pq: MinPq<&str> = MinPq::new();

        assert!(pq.add(1, 500, 0, "first"));
        assert!(pq.add(2, 200, 1, "second"));
        assert!(pq.add(3, 800, 2, "third"));
        assert!(!pq.add(3, 100, 3, "duplicate"));

        let (id, dl, _, meta) = pq.pop().unwrap();
        assert_eq!((id, dl, meta), (2, 200, "second"));

        let (id, dl, _, meta) = pq.pop().unwrap();
        assert_eq!((id, dl, meta), (1, 500, "first"));
        assert_eq!(pq.len(), 1);
    }

    #[test]
    fn test_remove_skips_stale_keys() {
        let mut pq: MinPq<i32> = MinPq::new();

        pq.add(1, 500, 0, 100);
        pq.add(2, 200, 1, 200);
        pq.add(3, 800, 2, 300);

        assert_eq!(pq.remove(2), Some(200));
        assert!(!pq.contains(2));
        assert_eq!(pq.peek_deadline(), Some(500));

        let (id, _, _, _) = pq.pop().unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_tie_breaking() {
        let mut pq: MinPq<u32> = MinPq::new();

        pq.add(1, 1000, 2, 100);
        pq.add(2, 1000, 0, 200);
        pq.add(3, 1000, 1, 300);

        let order: Vec<u64> = std::iter::from_fn(|| pq.pop().map(|(id, ..)| id)).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(pq.is_empty());
    }
}
