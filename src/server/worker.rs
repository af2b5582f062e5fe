//! Background worker pool (spec §5 "background jobs run in a separate
//! worker pool, also in parallel, pulling from the three named queues").
//!
//! Each queue gets its own pool of tokio tasks; a worker blocks on
//! `dequeue`, does the job, and updates the owning Task row. A crash
//! between finishing the queue pop and updating the Task row is exactly
//! the case `TaskStore::get_reconciled` tolerates.

use std::sync::Arc;
use std::time::Duration;

use crate::server::task::{Job, TaskStore, QUEUE_FILES, QUEUE_METADATA, QUEUE_UPLOAD};

const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// A queue-specific job handler. Implementations live in `crate::server`
/// modules that know how to interpret a given queue's job payloads
/// (archive extraction for `upload`, trash cleanup for `files`,
/// catalogue reconciliation for `metadata`).
#[async_trait::async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> anyhow::Result<()>;
}

/// Runs one worker loop for `queue_name` until `shutdown` resolves.
/// Intended to be spawned once per queue (optionally several times per
/// queue for extra concurrency); spec §5 requires no cooperative
/// scheduler within a single job, so each dequeued job simply runs to
/// completion before the next `dequeue` call.
pub async fn run_worker(
    tasks: Arc<TaskStore>,
    queue_name: &'static str,
    handler: Arc<dyn JobHandler>,
) {
    loop {
        match tasks.dequeue(queue_name, DEQUEUE_POLL_TIMEOUT).await {
            Ok(Some(job)) => {
                log::info!("worker[{queue_name}] picked up task {}", job.task_id);
                if let Err(e) = tasks.mark_processing(&job.task_id).await {
                    log::error!("failed to claim task {}: {e}", job.task_id);
                }
                match handler.handle(&job).await {
                    Ok(()) => {
                        if let Err(e) = tasks.mark_done(&job.task_id).await {
                            log::error!("failed to mark task {} done: {e}", job.task_id);
                        }
                    }
                    Err(e) => {
                        log::error!("task {} failed: {e:#}", job.task_id);
                        let errors = vec![pifs_api_types::TaskError {
                            message: e.to_string(),
                            files: None,
                        }];
                        if let Err(e) = tasks.mark_error(&job.task_id, "Internal server error", errors).await {
                            log::error!("failed to mark task {} error: {e}", job.task_id);
                        }
                    }
                }
                if let Err(e) = tasks.clear_processing(&job.task_id).await {
                    log::error!("failed to clear claim on task {}: {e}", job.task_id);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("worker[{queue_name}] dequeue error: {e}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Spawns one worker loop per queue name, returning their join handles
/// so `pifs-worker`'s main can await them (or let the process supervisor
/// restart on exit).
pub fn spawn_all(
    tasks: Arc<TaskStore>,
    upload_handler: Arc<dyn JobHandler>,
    files_handler: Arc<dyn JobHandler>,
    metadata_handler: Arc<dyn JobHandler>,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(run_worker(tasks.clone(), QUEUE_UPLOAD, upload_handler)),
        tokio::spawn(run_worker(tasks.clone(), QUEUE_FILES, files_handler)),
        tokio::spawn(run_worker(tasks, QUEUE_METADATA, metadata_handler)),
    ]
}
