use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use super::types::{TaskId, TaskPriority};

/// Heap entry for a pending task. A view of the task record, never the
/// source of truth.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueuedEntry {
    pub task_id: TaskId,
    pub priority: TaskPriority,
    pub created_at: DateTime<Utc>,
    /// Submission sequence; breaks ties between equal timestamps.
    pub seq: u64,
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    // Max-heap: the "greatest" entry is popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending tasks ordered by priority, then submission time.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    heap: BinaryHeap<QueuedEntry>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueuedEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueuedEntry> {
        self.heap.pop()
    }

    pub fn remove(&mut self, task_id: TaskId) -> bool {
        let before = self.heap.len();
        self.heap.retain(|e| e.task_id != task_id);
        self.heap.len() != before
    }

    /// Re-keys an entry under a new priority, keeping its place in time.
    pub fn reprioritize(&mut self, task_id: TaskId, priority: TaskPriority) -> bool {
        let Some(mut entry) = self.heap.iter().find(|e| e.task_id == task_id).copied() else {
            return false;
        };
        self.remove(task_id);
        entry.priority = priority;
        self.heap.push(entry);
        true
    }

    /// Task ids in the order they would be dequeued.
    pub fn ordered_ids(&self) -> Vec<TaskId> {
        let mut entries: Vec<QueuedEntry> = self.heap.iter().copied().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.task_id).collect()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
