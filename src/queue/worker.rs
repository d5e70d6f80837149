use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::service::ScanQueue;
use super::store::ScanClaim;
use super::types::TaskOutcome;
use crate::scanner::{LibraryScanner, ScanContext, ScanError};

/// The single consumer of the pending queue.
///
/// It is the only code path that moves tasks into `Running` or out of it,
/// and it runs scans strictly one after another.
pub(crate) struct Worker {
    queue: ScanQueue,
    scanner: Arc<dyn LibraryScanner>,
}

impl Worker {
    pub fn new(queue: ScanQueue, scanner: Arc<dyn LibraryScanner>) -> Self {
        Self { queue, scanner }
    }

    pub async fn run(self) {
        info!("Scan worker started");
        loop {
            // Checked before every pop so shutdown never starts new work.
            if self.queue.is_shutting_down() {
                break;
            }
            match self.queue.claim_next() {
                Some(claim) => {
                    self.execute(claim).await;
                    self.queue.prune_history();
                }
                None => self.queue.wait_for_work().await,
            }
        }
        info!("Scan worker stopped");
    }

    async fn execute(&self, claim: ScanClaim) {
        let ScanClaim { task, cancel } = claim;
        let id = task.id;

        // Cancelled between the pop and here.
        if cancel.is_cancelled() {
            self.queue.finish(id, TaskOutcome::Cancelled);
            return;
        }

        let observed = Arc::new(AtomicBool::new(false));
        let ctx = {
            let queue = self.queue.clone();
            let observed = observed.clone();
            ScanContext::new(
                move |scanned, total| queue.update_progress(id, scanned, total),
                move || {
                    let hit = cancel.is_cancelled();
                    if hit {
                        observed.store(true, Ordering::SeqCst);
                    }
                    hit
                },
            )
        };

        // Run on its own task so a panicking scanner only fails this task.
        let scanner = self.scanner.clone();
        let library_id = task.library_id;
        let joined = tokio::spawn(async move { scanner.scan_library(library_id, ctx).await }).await;

        // An honoured cancellation wins over whatever the scanner reported.
        let outcome = if observed.load(Ordering::SeqCst) {
            TaskOutcome::Cancelled
        } else {
            match joined {
                Ok(Ok(summary)) => TaskOutcome::Completed(summary),
                Ok(Err(ScanError::Cancelled)) => TaskOutcome::Cancelled,
                Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
                Err(e) => {
                    warn!("Scanner for library {} aborted: {}", library_id, e);
                    TaskOutcome::Failed(format!("scan aborted: {}", e))
                }
            }
        };
        self.queue.finish(id, outcome);
    }
}
