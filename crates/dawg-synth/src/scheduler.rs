//! Event queue keyed to the logical clock.
//!
//! Deferred bookkeeping (freeing a voice once its release has decayed) is
//! queued here with an absolute time on the same clock the automation uses,
//! and drained by whoever advances that clock. Live and offline rendering
//! therefore see identical ordering.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Scheduled<E> {
    time: f64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    // Reversed: BinaryHeap is a max-heap and the earliest event must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of events ordered by time, then by insertion order.
///
/// # Example
///
/// ```rust
/// use dawg_synth::EventQueue;
///
/// let mut queue = EventQueue::new();
/// queue.push(0.5, "late");
/// queue.push(0.1, "early");
///
/// assert_eq!(queue.pop_due(0.2), Some((0.1, "early")));
/// assert_eq!(queue.pop_due(0.2), None);
/// assert_eq!(queue.pop_due(1.0), Some((0.5, "late")));
/// ```
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    next_seq: u64,
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `event` at `time`.
    pub fn push(&mut self, time: f64, event: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { time, seq, event });
    }

    /// Remove and return the earliest event due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(f64, E)> {
        if self.heap.peek()?.time > now {
            return None;
        }
        self.heap.pop().map(|s| (s.time, s.event))
    }

    /// Time of the earliest pending event.
    pub fn next_time(&self) -> Option<f64> {
        self.heap.peek().map(|s| s.time)
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pops_in_time_order() {
        let mut q = EventQueue::new();
        q.push(3.0, 'c');
        q.push(1.0, 'a');
        q.push(2.0, 'b');
        let order: Vec<char> = std::iter::from_fn(|| q.pop_due(10.0).map(|(_, e)| e)).collect();
        assert_eq!(order, ['a', 'b', 'c']);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut q = EventQueue::new();
        q.push(1.0, 1);
        q.push(1.0, 2);
        q.push(1.0, 3);
        assert_eq!(q.pop_due(1.0), Some((1.0, 1)));
        assert_eq!(q.pop_due(1.0), Some((1.0, 2)));
        assert_eq!(q.pop_due(1.0), Some((1.0, 3)));
    }

    #[test]
    fn test_not_due_stays_queued() {
        let mut q = EventQueue::new();
        q.push(5.0, ());
        assert_eq!(q.pop_due(4.999), None);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next_time(), Some(5.0));
        q.clear();
        assert!(q.is_empty());
    }
}
