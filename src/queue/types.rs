use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scanner::ScanSummary;

/// Process-unique identifier of a scan task.
pub type TaskId = Uuid;

/// Row id of a library in the `libraries` table.
pub type LibraryId = i64;

/// Scheduling priority of a scan task.
///
/// The derived ordering is relied upon by the pending queue: `High > Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// `Pending` and `Running` tasks are active: at most one per library.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub scanned_paths: u64,
    pub total_paths: u64,
}

/// Snapshot of one scan request.
///
/// Callers only ever see clones; the authoritative record lives inside the
/// queue's task store and is mutated exclusively by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: TaskId,
    pub library_id: LibraryId,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only while the task is running.
    pub progress: Option<ScanProgress>,
    /// Present only on `Completed`.
    pub result: Option<ScanSummary>,
    /// Present only on `Failed`.
    pub error: Option<String>,
    /// A cancel was requested while the task was running and has not been
    /// honoured yet.
    #[serde(default)]
    pub cancel_requested: bool,
}

impl ScanTask {
    pub(crate) fn new(library_id: LibraryId, priority: TaskPriority, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            library_id,
            priority,
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            progress: None,
            result: None,
            error: None,
            cancel_requested: false,
        }
    }
}

/// What `submit` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A fresh pending task was created.
    Created(TaskId),
    /// The library's pending task was raised to the requested priority.
    Upgraded(TaskId),
    /// The library already had an active task; nothing changed.
    Joined(TaskId),
}

impl Submission {
    pub fn task_id(self) -> TaskId {
        match self {
            Submission::Created(id) | Submission::Upgraded(id) | Submission::Joined(id) => id,
        }
    }
}

/// Live notifications broadcast to `/scan-tasks/events` subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued {
        task_id: TaskId,
        library_id: LibraryId,
        priority: TaskPriority,
    },
    PriorityRaised {
        task_id: TaskId,
        priority: TaskPriority,
    },
    Started {
        task_id: TaskId,
        library_id: LibraryId,
    },
    Progress {
        task_id: TaskId,
        scanned_paths: u64,
        total_paths: u64,
    },
    Finished {
        task_id: TaskId,
        library_id: LibraryId,
        status: TaskStatus,
    },
}

/// How a running task ended, as decided by the worker.
#[derive(Debug, Clone)]
pub(crate) enum TaskOutcome {
    Completed(ScanSummary),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("scan task {0} not found")]
    NotFound(TaskId),
    #[error("scan task {id} is already {status}")]
    InvalidState { id: TaskId, status: TaskStatus },
}
