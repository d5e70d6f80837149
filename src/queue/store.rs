//! Task record store, library index and pending queue as one aggregate.
//!
//! Every method here is a plain state transition that takes the current time
//! as an argument. Locking, wakeups and events belong to
//! [`ScanQueue`](super::ScanQueue); keeping the clock explicit lets tests
//! drive retention windows without sleeping.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;

use super::pending::{PendingQueue, QueuedEntry};
use super::types::{
    LibraryId, QueueError, ScanProgress, ScanTask, Submission, TaskId, TaskOutcome, TaskPriority, TaskStatus,
};

#[derive(Debug)]
struct TaskRecord {
    task: ScanTask,
    seq: u64,
    /// Cooperative cancellation flag, read by the worker at checkpoints.
    cancel: CancellationToken,
}

/// A task handed to the worker by [`QueueState::claim_next`].
#[derive(Debug, Clone)]
pub(crate) struct ScanClaim {
    pub task: ScanTask,
    pub cancel: CancellationToken,
}

/// Result of a successful cancel request.
#[derive(Debug, Clone)]
pub(crate) enum Cancellation {
    /// The task was pending and is now `Cancelled`.
    Cancelled(ScanTask),
    /// The task is running; its flag is set and the worker will finalize it.
    Requested(ScanTask),
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    tasks: HashMap<TaskId, TaskRecord>,
    library_index: HashMap<LibraryId, TaskId>,
    pending: PendingQueue,
    running: Option<TaskId>,
    next_seq: u64,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, library_id: LibraryId, priority: TaskPriority, now: DateTime<Utc>) -> Submission {
        if let Some(&existing) = self.library_index.get(&library_id) {
            if let Some(record) = self.tasks.get_mut(&existing) {
                if record.task.status == TaskStatus::Pending && record.task.priority < priority {
                    record.task.priority = priority;
                    self.pending.reprioritize(existing, priority);
                    return Submission::Upgraded(existing);
                }
                if record.task.status.is_active() {
                    return Submission::Joined(existing);
                }
            }
            // Index entries are removed on every terminal transition, so this
            // only triggers if a record was evicted underneath it.
            self.library_index.remove(&library_id);
        }

        let task = ScanTask::new(library_id, priority, now);
        let id = task.id;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(QueuedEntry { task_id: id, priority, created_at: now, seq });
        self.library_index.insert(library_id, id);
        self.tasks.insert(id, TaskRecord { task, seq, cancel: CancellationToken::new() });
        Submission::Created(id)
    }

    pub fn get(&self, id: TaskId) -> Option<&ScanTask> {
        self.tasks.get(&id).map(|r| &r.task)
    }

    pub fn library_task(&self, library_id: LibraryId) -> Option<&ScanTask> {
        self.library_index.get(&library_id).and_then(|id| self.get(*id))
    }

    /// The running task (if any) followed by pending tasks in dequeue order.
    pub fn active(&self) -> Vec<ScanTask> {
        let running = self.running.and_then(|id| self.get(id)).cloned();
        running
            .into_iter()
            .chain(self.pending.ordered_ids().into_iter().filter_map(|id| self.get(id).cloned()))
            .collect()
    }

    /// Terminal tasks finished within `retention` of `now`, most recent first.
    pub fn history(&self, limit: usize, now: DateTime<Utc>, retention: Duration) -> Vec<ScanTask> {
        let cutoff = retention_cutoff(now, retention);
        let mut finished: Vec<&TaskRecord> = self
            .tasks
            .values()
            .filter(|r| r.task.status.is_terminal())
            .filter(|r| r.task.completed_at.is_some_and(|t| t >= cutoff))
            .collect();
        finished.sort_by(|a, b| b.task.completed_at.cmp(&a.task.completed_at).then_with(|| b.seq.cmp(&a.seq)));
        finished.into_iter().take(limit).map(|r| r.task.clone()).collect()
    }

    pub fn cancel(&mut self, id: TaskId, now: DateTime<Utc>) -> Result<Cancellation, QueueError> {
        let record = self.tasks.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        match record.task.status {
            TaskStatus::Pending => {
                self.pending.remove(id);
                if self.library_index.get(&record.task.library_id) == Some(&id) {
                    self.library_index.remove(&record.task.library_id);
                }
                record.task.status = TaskStatus::Cancelled;
                record.task.completed_at = Some(now);
                Ok(Cancellation::Cancelled(record.task.clone()))
            }
            TaskStatus::Running => {
                record.cancel.cancel();
                record.task.cancel_requested = true;
                Ok(Cancellation::Requested(record.task.clone()))
            }
            status => Err(QueueError::InvalidState { id, status }),
        }
    }

    /// Pops the next pending task and marks it running in the same step.
    ///
    /// Returns `None` when nothing is pending or a task is already running.
    pub fn claim_next(&mut self, now: DateTime<Utc>) -> Option<ScanClaim> {
        if self.running.is_some() {
            return None;
        }
        while let Some(entry) = self.pending.pop() {
            let Some(record) = self.tasks.get_mut(&entry.task_id) else {
                continue;
            };
            if record.task.status != TaskStatus::Pending {
                continue;
            }
            record.task.status = TaskStatus::Running;
            record.task.started_at = Some(now);
            record.task.progress = Some(ScanProgress::default());
            self.running = Some(entry.task_id);
            return Some(ScanClaim { task: record.task.clone(), cancel: record.cancel.clone() });
        }
        None
    }

    pub fn update_progress(&mut self, id: TaskId, scanned_paths: u64, total_paths: u64) -> bool {
        match self.tasks.get_mut(&id) {
            Some(record) if record.task.status == TaskStatus::Running => {
                record.task.progress = Some(ScanProgress { scanned_paths, total_paths });
                true
            }
            _ => false,
        }
    }

    /// Moves a running task into its terminal state and releases its library.
    pub fn finish(&mut self, id: TaskId, outcome: TaskOutcome, now: DateTime<Utc>) -> Option<ScanTask> {
        let record = self.tasks.get_mut(&id)?;
        if record.task.status != TaskStatus::Running {
            return None;
        }
        let task = &mut record.task;
        match outcome {
            TaskOutcome::Completed(summary) => {
                task.status = TaskStatus::Completed;
                task.result = Some(summary);
            }
            TaskOutcome::Failed(message) => {
                task.status = TaskStatus::Failed;
                task.error = Some(message);
            }
            TaskOutcome::Cancelled => task.status = TaskStatus::Cancelled,
        }
        task.completed_at = Some(now);
        task.progress = None;
        task.cancel_requested = false;
        if self.library_index.get(&task.library_id) == Some(&id) {
            self.library_index.remove(&task.library_id);
        }
        if self.running == Some(id) {
            self.running = None;
        }
        Some(task.clone())
    }

    /// Drops terminal records that finished before the retention window.
    pub fn evict_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let cutoff = retention_cutoff(now, retention);
        let before = self.tasks.len();
        self.tasks.retain(|_, r| !(r.task.status.is_terminal() && r.task.completed_at.is_some_and(|t| t < cutoff)));
        before - self.tasks.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Oldest completion time still inside the window. A window reaching past
/// the representable range keeps everything.
fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
