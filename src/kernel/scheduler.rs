use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::kernel::process::{Pid, SimTime};

#[derive(Debug)]
struct ScheduledWakeup {
    due: SimTime,
    sequence_num: u64,
    pid: Pid,
}

impl PartialEq for ScheduledWakeup {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence_num == other.sequence_num
    }
}

impl Eq for ScheduledWakeup {}

impl PartialOrd for ScheduledWakeup {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledWakeup {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (BinaryHeap is max-heap by default)
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence_num.cmp(&self.sequence_num))
    }
}

/// Min-heap of timed wake-ups, ordered by due time with a monotone sequence
/// tiebreak so same-instant holds resume in schedule order.
pub struct TimerQueue {
    heap: BinaryHeap<ScheduledWakeup>,
    sequence_counter: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            sequence_counter: 0,
        }
    }

    pub fn schedule(&mut self, pid: Pid, due: SimTime) {
        self.heap.push(ScheduledWakeup {
            due,
            sequence_num: self.sequence_counter,
            pid,
        });
        self.sequence_counter += 1;
    }

    /// Earliest due time without removing anything.
    pub fn peek_due(&self) -> Option<SimTime> {
        self.heap.peek().map(|w| w.due)
    }

    /// Remove and return every wake-up due at exactly `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Vec<Pid> {
        let mut due = Vec::new();
        while let Some(wakeup) = self.heap.peek() {
            if wakeup.due == now {
                if let Some(wakeup) = self.heap.pop() {
                    due.push(wakeup.pid);
                }
            } else {
                break;
            }
        }
        due
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
