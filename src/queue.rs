//! Fixed-capacity time-ordered event queue.
//!
//! Entries are kept sorted in descending time order in a flat array, so the
//! earliest entry always sits at the end and [`Queue::pop`] is O(1). Index 0
//! holds a sentinel with [`SimTime::never`], which terminates the insertion
//! scan without an empty-queue check.
//!
//! An entry either names a net or is the horizon marker (`None`) pushed by
//! the main loop to bound a `process_queue` call.

use crate::netlist::NetId;
use crate::time::SimTime;

/// A scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    /// When the event fires
    pub time: SimTime,
    /// Net to update, `None` for the stop-time marker
    pub net: Option<NetId>,
}

impl QueueEntry {
    pub fn new(time: SimTime, net: Option<NetId>) -> Self {
        Self { time, net }
    }
}

/// Sorted event queue with a fixed capacity.
#[derive(Debug, Clone)]
pub struct Queue {
    /// Entries in descending time order, sentinel at index 0
    list: Vec<QueueEntry>,
    capacity: usize,
}

impl Queue {
    /// Create a queue holding at most `capacity` pending entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut list = Vec::with_capacity(capacity + 1);
        list.push(QueueEntry::new(SimTime::never(), None));
        Self { list, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.list.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert an entry in time order.
    ///
    /// Entries with a time equal to an already queued one are placed after
    /// it and therefore pop first.
    ///
    /// # Panics
    ///
    /// Panics when the queue is full. Capacities are derived from the netlist
    /// at setup, so overflow is a sizing bug.
    pub fn push(&mut self, time: SimTime, net: Option<NetId>) {
        assert!(
            self.len() < self.capacity,
            "event queue overflow (capacity {})",
            self.capacity
        );
        // scan from the tail; the sentinel stops the loop
        let mut i = self.list.len();
        while self.list[i - 1].time < time {
            i -= 1;
        }
        self.list.insert(i, QueueEntry::new(time, net));
    }

    /// Remove and return the earliest entry.
    ///
    /// Popping an empty queue returns the sentinel (`never`, no net).
    pub fn pop(&mut self) -> QueueEntry {
        if self.list.len() > 1 {
            self.list.pop().unwrap_or(QueueEntry::new(SimTime::never(), None))
        } else {
            self.list[0]
        }
    }

    /// Earliest entry without removing it.
    pub fn top(&self) -> QueueEntry {
        self.list[self.list.len() - 1]
    }

    /// Drop any pending entry for `net`.
    pub fn remove(&mut self, net: NetId) {
        if let Some(pos) = self.list.iter().skip(1).rposition(|e| e.net == Some(net)) {
            self.list.remove(pos + 1);
        }
    }

    /// Move the pending entry for `net` to a new time.
    pub fn retime(&mut self, time: SimTime, net: NetId) {
        self.remove(net);
        self.push(time, Some(net));
    }

    /// Whether `net` currently has a pending entry.
    pub fn contains(&self, net: NetId) -> bool {
        self.list.iter().skip(1).any(|e| e.net == Some(net))
    }

    /// Drop all pending entries.
    pub fn clear(&mut self) {
        self.list.truncate(1);
    }

    /// Pending entries, earliest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        self.list.iter().skip(1).rev()
    }

    /// Grow the capacity; existing entries are kept.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity > self.capacity {
            self.list.reserve(capacity - self.capacity);
            self.capacity = capacity;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(t: u64) -> SimTime {
        SimTime::from_nsec(t)
    }

    #[test]
    fn test_pop_in_time_order() {
        let mut q = Queue::with_capacity(8);
        q.push(ns(30), Some(NetId(3)));
        q.push(ns(10), Some(NetId(1)));
        q.push(ns(20), Some(NetId(2)));

        assert_eq!(q.len(), 3);
        assert_eq!(q.top().net, Some(NetId(1)));
        assert_eq!(q.pop().net, Some(NetId(1)));
        assert_eq!(q.pop().net, Some(NetId(2)));
        assert_eq!(q.pop().net, Some(NetId(3)));
        assert!(q.is_empty());
    }

    #[test]
    fn test_equal_times_pop_lifo() {
        let mut q = Queue::with_capacity(8);
        q.push(ns(5), Some(NetId(1)));
        q.push(ns(5), Some(NetId(2)));
        q.push(ns(5), Some(NetId(3)));

        assert_eq!(q.pop().net, Some(NetId(3)));
        assert_eq!(q.pop().net, Some(NetId(2)));
        assert_eq!(q.pop().net, Some(NetId(1)));
    }

    #[test]
    fn test_empty_pop_returns_sentinel() {
        let mut q = Queue::with_capacity(1);
        let e = q.pop();
        assert!(e.time.is_never());
        assert_eq!(e.net, None);
    }

    #[test]
    fn test_remove_and_retime() {
        let mut q = Queue::with_capacity(8);
        q.push(ns(10), Some(NetId(1)));
        q.push(ns(20), Some(NetId(2)));
        q.remove(NetId(1));
        assert!(!q.contains(NetId(1)));
        assert_eq!(q.len(), 1);

        q.retime(ns(5), NetId(2));
        let e = q.pop();
        assert_eq!(e.time, ns(5));
        assert_eq!(e.net, Some(NetId(2)));
    }

    #[test]
    fn test_clear() {
        let mut q = Queue::with_capacity(4);
        q.push(ns(1), None);
        q.push(ns(2), Some(NetId(0)));
        q.clear();
        assert!(q.is_empty());
        assert!(q.top().time.is_never());
    }

    #[test]
    #[should_panic(expected = "event queue overflow")]
    fn test_overflow_is_fatal() {
        let mut q = Queue::with_capacity(1);
        q.push(ns(1), Some(NetId(0)));
        q.push(ns(2), Some(NetId(1)));
    }
}
