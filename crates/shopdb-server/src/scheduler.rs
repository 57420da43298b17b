//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring vector-index refresh.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shopdb_assistant::Indexer;
use shopdb_core::EntityKind;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the reindex job cannot be registered (for example an invalid cron
/// expression), or the scheduler fails to start.
pub async fn build_scheduler(
    pool: PgPool,
    indexer: Arc<Indexer>,
    reindex_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_reindex_job(&scheduler, pool, indexer, reindex_cron).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the full reindex of every entity kind.
///
/// A tick that fires while the previous run is still going is skipped.
async fn register_reindex_job(
    scheduler: &JobScheduler,
    pool: PgPool,
    indexer: Arc<Indexer>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let pool = Arc::new(pool);
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);
        let indexer = Arc::clone(&indexer);
        let running = Arc::clone(&running);

        Box::pin(async move {
            if running.swap(true, Ordering::AcqRel) {
                tracing::warn!("scheduler: previous reindex still running; skipping tick");
                return;
            }

            tracing::info!("scheduler: starting reindex run");
            run_reindex_job(&pool, &indexer).await;
            running.store(false, Ordering::Release);
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: registered reindex job");
    Ok(())
}

async fn run_reindex_job(pool: &PgPool, indexer: &Indexer) {
    match shopdb_assistant::run_full_index(pool, indexer, "scheduler", &EntityKind::ALL).await {
        Ok((run_id, stats)) => tracing::info!(
            run_id,
            indexed = stats.indexed,
            unchanged = stats.unchanged,
            deleted = stats.deleted,
            "scheduler: reindex run complete"
        ),
        Err(e) => tracing::error!(error = %e, "scheduler: reindex run failed"),
    }
}
