use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Queue and scan counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub tasks_submitted: Arc<AtomicU64>,
    pub tasks_deduplicated: Arc<AtomicU64>,
    pub tasks_upgraded: Arc<AtomicU64>,
    pub tasks_completed: Arc<AtomicU64>,
    pub tasks_failed: Arc<AtomicU64>,
    pub tasks_cancelled: Arc<AtomicU64>,
    pub contents_added: Arc<AtomicU64>,
    pub contents_removed: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: Arc::new(AtomicU64::new(0)),
            tasks_deduplicated: Arc::new(AtomicU64::new(0)),
            tasks_upgraded: Arc::new(AtomicU64::new(0)),
            tasks_completed: Arc::new(AtomicU64::new(0)),
            tasks_failed: Arc::new(AtomicU64::new(0)),
            tasks_cancelled: Arc::new(AtomicU64::new(0)),
            contents_added: Arc::new(AtomicU64::new(0)),
            contents_removed: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_tasks_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission that joined an existing active task.
    pub fn inc_tasks_deduplicated(&self) {
        self.tasks_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_upgraded(&self) {
        self.tasks_upgraded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_contents_added(&self, count: u64) {
        self.contents_added.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_contents_removed(&self, count: u64) {
        self.contents_removed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self, queue_depth: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_deduplicated: self.tasks_deduplicated.load(Ordering::Relaxed),
            tasks_upgraded: self.tasks_upgraded.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            contents_added: self.contents_added.load(Ordering::Relaxed),
            contents_removed: self.contents_removed.load(Ordering::Relaxed),
            queue_depth,
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_deduplicated: u64,
    pub tasks_upgraded: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub contents_added: u64,
    pub contents_removed: u64,
    /// Pending tasks at snapshot time.
    pub queue_depth: usize,
    pub uptime_seconds: u64,
}
