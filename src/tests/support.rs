//! Shared fixtures: in-memory databases, app state and scripted scanners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::Semaphore;

use crate::config::AppConfig;
use crate::queue::{LibraryId, ScanQueue, ScanTask, TaskId, TaskStatus};
use crate::scanner::{LibraryScanner, ScanContext, ScanError, ScanSummary};
use crate::state::AppState;

/// One connection that lives for the whole test, so the in-memory database survives.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    pool
}

pub async fn test_state() -> AppState {
    AppState::new(memory_pool().await, AppConfig::default())
}

/// Polls until the task reaches `status`, failing after five seconds.
pub async fn wait_for_status(queue: &ScanQueue, id: TaskId, status: TaskStatus) -> ScanTask {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = queue.get_task(id) {
                if task.status == status {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {} never reached {:?}: {:?}", id, status, queue.get_task(id)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Checks for cancellation once more, then succeeds.
    Succeed,
    /// Succeeds without a final checkpoint.
    IgnoreCancel,
    Fail,
    Panic,
}

/// A scanner whose outcome is fixed up front. When gated, every scan blocks
/// after reporting its first progress until [`release`](Self::release).
pub struct ScriptedScanner {
    behavior: Behavior,
    gated: bool,
    calls: Mutex<Vec<LibraryId>>,
    entered: Semaphore,
    gate: Semaphore,
}

impl ScriptedScanner {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, false))
    }

    pub fn gated(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self::build(behavior, true))
    }

    fn build(behavior: Behavior, gated: bool) -> Self {
        Self { behavior, gated, calls: Mutex::new(Vec::new()), entered: Semaphore::new(0), gate: Semaphore::new(0) }
    }

    /// Waits until one more scan has started.
    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.acquire())
            .await
            .expect("scan never started")
            .unwrap()
            .forget();
    }

    /// Lets one gated scan continue.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> Vec<LibraryId> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn summary_for(library_id: LibraryId) -> ScanSummary {
    ScanSummary { added_count: library_id as u64, removed_count: 1, ..ScanSummary::default() }
}

#[async_trait]
impl LibraryScanner for ScriptedScanner {
    async fn scan_library(&self, library_id: LibraryId, ctx: ScanContext) -> Result<ScanSummary, ScanError> {
        self.calls.lock().unwrap().push(library_id);
        ctx.report_progress(0, 2);
        self.entered.add_permits(1);
        if self.gated {
            self.gate.acquire().await.unwrap().forget();
        }
        ctx.report_progress(1, 2);
        match self.behavior {
            Behavior::Succeed => {
                ctx.checkpoint()?;
                Ok(summary_for(library_id))
            }
            Behavior::IgnoreCancel => Ok(summary_for(library_id)),
            Behavior::Fail => Err(ScanError::MissingScanPath("/mnt/offline".into())),
            Behavior::Panic => panic!("scanner exploded"),
        }
    }
}
