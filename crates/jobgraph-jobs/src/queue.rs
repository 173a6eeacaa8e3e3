//! Ready queue.
//!
//! Min-heap of job ids ordered by `(priority, seq)`: lower priority values
//! pop first, and jobs with equal priority pop in submission order.

use crate::job::{JobId, Priority};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedJob {
    priority: Priority,
    seq: u64,
    id: JobId,
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of jobs that are eligible to run.
///
/// A job is queued at most once at a time. Not a concurrency primitive: the
/// scheduler's coordinator owns it exclusively.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<Reverse<QueuedJob>>,
    members: HashSet<JobId>,
}

impl ReadyQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty queue with room for `capacity` jobs.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Queue a job. Returns `false` if it is already queued.
    pub fn push(&mut self, id: JobId, priority: Priority, seq: u64) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.heap.push(Reverse(QueuedJob { priority, seq, id }));
        true
    }

    /// Remove and return the most urgent job.
    pub fn pop(&mut self) -> Option<JobId> {
        let Reverse(entry) = self.heap.pop()?;
        self.members.remove(&entry.id);
        Some(entry.id)
    }

    /// The job [`pop`](Self::pop) would return next.
    pub fn peek(&self) -> Option<&JobId> {
        self.heap.peek().map(|Reverse(entry)| &entry.id)
    }

    /// Returns true if `id` is queued.
    pub fn contains(&self, id: &JobId) -> bool {
        self.members.contains(id)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns true if no job is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every queued job, returning them in pop order.
    pub fn drain(&mut self) -> Vec<JobId> {
        let mut drained = Vec::with_capacity(self.len());
        while let Some(id) = self.pop() {
            drained.push(id);
        }
        drained
    }
}
