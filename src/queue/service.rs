use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::{Cancellation, QueueState, ScanClaim};
use super::types::{LibraryId, QueueError, ScanTask, Submission, TaskEvent, TaskId, TaskOutcome, TaskPriority, TaskStatus};
use super::worker::Worker;
use crate::config::QueueConfig;
use crate::metrics::Metrics;
use crate::scanner::LibraryScanner;

struct Shared {
    state: RwLock<QueueState>,
    wake: Notify,
    shutdown: CancellationToken,
    events: broadcast::Sender<TaskEvent>,
    retention: Duration,
    metrics: Metrics,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the scan queue.
///
/// Cheap to clone; all clones share the same task store, library index and
/// pending queue behind a single lock. Every method except
/// [`shutdown`](Self::shutdown) completes without suspending.
#[derive(Clone)]
pub struct ScanQueue {
    inner: Arc<Shared>,
}

impl ScanQueue {
    pub fn new(cfg: &QueueConfig, metrics: Metrics) -> Self {
        let (events, _) = broadcast::channel(cfg.event_buffer.max(1));
        // Out-of-range windows saturate instead of panicking.
        let retention = i64::try_from(cfg.history_retention_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX);
        Self {
            inner: Arc::new(Shared {
                state: RwLock::new(QueueState::new()),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                events,
                retention,
                metrics,
                worker: Mutex::new(None),
            }),
        }
    }

    // A panic while holding the lock cannot leave the state half-updated:
    // every transition in `QueueState` completes before returning.
    fn read(&self) -> RwLockReadGuard<'_, QueueState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, QueueState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is the common case.
        let _ = self.inner.events.send(event);
    }

    /// Requests a scan of `library_id`, deduplicating against its active task.
    pub fn submit(&self, library_id: LibraryId, priority: TaskPriority) -> Submission {
        let submission = self.write().submit(library_id, priority, Utc::now());
        match submission {
            Submission::Created(task_id) => {
                self.inner.metrics.inc_tasks_submitted();
                info!("Queued scan task {} for library {} ({:?})", task_id, library_id, priority);
                self.emit(TaskEvent::Queued { task_id, library_id, priority });
                self.inner.wake.notify_one();
            }
            Submission::Upgraded(task_id) => {
                self.inner.metrics.inc_tasks_upgraded();
                info!("Raised scan task {} for library {} to {:?}", task_id, library_id, priority);
                self.emit(TaskEvent::PriorityRaised { task_id, priority });
            }
            Submission::Joined(task_id) => {
                self.inner.metrics.inc_tasks_deduplicated();
                debug!("Library {} already has active scan task {}", library_id, task_id);
            }
        }
        submission
    }

    pub fn submit_task(&self, library_id: LibraryId, priority: TaskPriority) -> TaskId {
        self.submit(library_id, priority).task_id()
    }

    pub fn get_task(&self, id: TaskId) -> Option<ScanTask> {
        self.read().get(id).cloned()
    }

    /// The active task for a library; history is not searched.
    pub fn get_library_task(&self, library_id: LibraryId) -> Option<ScanTask> {
        self.read().library_task(library_id).cloned()
    }

    /// The running task first, then pending tasks in dequeue order.
    pub fn list_pending(&self) -> Vec<ScanTask> {
        self.read().active()
    }

    /// Terminal tasks inside the retention window, most recent first.
    pub fn list_history(&self, limit: usize) -> Vec<ScanTask> {
        self.read().history(limit, Utc::now(), self.inner.retention)
    }

    /// Cancels a task.
    ///
    /// Pending tasks are cancelled immediately. For a running task this only
    /// raises its cancellation flag: the returned snapshot still says
    /// `Running`, and the worker finalizes it as `Cancelled` at the scanner's
    /// next checkpoint. A scan past its last checkpoint still ends as
    /// `Completed` or `Failed`.
    pub fn cancel_task(&self, id: TaskId) -> Result<ScanTask, QueueError> {
        let cancellation = self.write().cancel(id, Utc::now())?;
        match cancellation {
            Cancellation::Cancelled(task) => {
                self.inner.metrics.inc_tasks_cancelled();
                info!("Cancelled pending scan task {} for library {}", task.id, task.library_id);
                self.emit(TaskEvent::Finished {
                    task_id: task.id,
                    library_id: task.library_id,
                    status: TaskStatus::Cancelled,
                });
                // These never reach the worker, which prunes after each scan.
                self.prune_history();
                Ok(task)
            }
            Cancellation::Requested(task) => {
                info!("Cancellation requested for running scan task {}", task.id);
                Ok(task)
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    pub fn queue_depth(&self) -> usize {
        self.read().pending_len()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Starts the single background worker. Later calls are ignored.
    pub fn spawn_worker(&self, scanner: Arc<dyn LibraryScanner>) {
        let mut slot = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("Scan worker already running; ignoring second spawn");
            return;
        }
        let worker = Worker::new(self.clone(), scanner);
        *slot = Some(tokio::spawn(worker.run()));
    }

    pub fn is_worker_running(&self) -> bool {
        let slot = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been requested.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    /// Stops the worker after its current task, then waits for it to exit.
    /// Pending tasks stay queued.
    pub async fn shutdown(&self) {
        {
            // Under the state lock so it cannot slip between the worker's
            // shutdown check and its claim.
            let _state = self.write();
            self.inner.shutdown.cancel();
        }
        let handle = self.inner.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Scan worker ended abnormally: {}", e);
            }
        }
        info!("Scan queue stopped with {} pending task(s)", self.queue_depth());
    }

    // ---- worker capabilities ----

    pub(crate) async fn wait_for_work(&self) {
        tokio::select! {
            _ = self.inner.wake.notified() => {}
            _ = self.inner.shutdown.cancelled() => {}
        }
    }

    /// Claims the next pending task, or `None` once shutdown was requested.
    pub(crate) fn claim_next(&self) -> Option<ScanClaim> {
        let claim = {
            let mut state = self.write();
            if self.is_shutting_down() {
                return None;
            }
            state.claim_next(Utc::now())?
        };
        let task = &claim.task;
        info!("Starting scan task {} for library {}", task.id, task.library_id);
        self.emit(TaskEvent::Started { task_id: task.id, library_id: task.library_id });
        Some(claim)
    }

    pub(crate) fn update_progress(&self, id: TaskId, scanned_paths: u64, total_paths: u64) {
        if self.write().update_progress(id, scanned_paths, total_paths) {
            self.emit(TaskEvent::Progress { task_id: id, scanned_paths, total_paths });
        }
    }

    pub(crate) fn finish(&self, id: TaskId, outcome: TaskOutcome) -> Option<ScanTask> {
        let task = self.write().finish(id, outcome, Utc::now())?;
        let metrics = &self.inner.metrics;
        match task.status {
            TaskStatus::Completed => {
                metrics.inc_tasks_completed();
                if let Some(summary) = &task.result {
                    metrics.add_contents_added(summary.added_count);
                    metrics.add_contents_removed(summary.removed_count);
                }
                info!("Scan task {} for library {} completed", task.id, task.library_id);
            }
            TaskStatus::Failed => {
                metrics.inc_tasks_failed();
                warn!(
                    "Scan task {} for library {} failed: {}",
                    task.id,
                    task.library_id,
                    task.error.as_deref().unwrap_or("unknown error")
                );
            }
            _ => {
                metrics.inc_tasks_cancelled();
                info!("Scan task {} for library {} cancelled", task.id, task.library_id);
            }
        }
        self.emit(TaskEvent::Finished { task_id: task.id, library_id: task.library_id, status: task.status });
        Some(task)
    }

    pub(crate) fn prune_history(&self) -> usize {
        let evicted = self.write().evict_expired(Utc::now(), self.inner.retention);
        if evicted > 0 {
            debug!("Evicted {} expired scan task record(s)", evicted);
        }
        evicted
    }
}
