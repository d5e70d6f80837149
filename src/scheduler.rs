//! Periodic rescans of every library at normal priority.

use std::time::Duration;

use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::library;
use crate::queue::{ScanQueue, TaskPriority};

/// Starts the scheduler. It stops once the queue shuts down.
pub fn spawn(queue: ScanQueue, pool: SqlitePool, cfg: SchedulerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(cfg.interval_secs.max(1));
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval() fires immediately; consume that tick unless asked to scan at startup.
        if !cfg.run_on_startup {
            ticker.tick().await;
        }
        info!("Library rescan scheduler running every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = queue.closed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = run_once(&queue, &pool).await {
                        warn!("Scheduled rescan failed: {:#}", e);
                    }
                }
            }
        }
        debug!("Library rescan scheduler stopped");
    })
}

/// Submits a normal-priority scan for every library. Returns how many
/// submissions were made; libraries with an active task simply join it.
pub async fn run_once(queue: &ScanQueue, pool: &SqlitePool) -> anyhow::Result<usize> {
    let ids = library::list_library_ids(pool).await?;
    for id in &ids {
        queue.submit_task(*id, TaskPriority::Normal);
    }
    debug!("Scheduled rescan submitted {} librar(y/ies)", ids.len());
    Ok(ids.len())
}
