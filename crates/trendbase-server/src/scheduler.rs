//! Background job scheduler.
//!
//! Registers the daily age-decay recalculation at server startup.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use trendbase_core::{AppConfig, RecalcTrigger};
use trendbase_engine::TrendEngine;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    engine: Arc<TrendEngine>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_recalc_job(&scheduler, engine, &config.recalc_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_recalc_job(
    scheduler: &JobScheduler,
    engine: Arc<TrendEngine>,
    schedule: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let engine = Arc::clone(&engine);

        Box::pin(async move {
            tracing::info!("scheduler: starting recalculation run");
            match engine.recalculate_all(RecalcTrigger::Cron, Utc::now()).await {
                Ok(run) => tracing::info!(
                    run_id = run.id,
                    status = run.status.as_str(),
                    "scheduler: recalculation run complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: recalculation run failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(schedule, "scheduler: registered daily recalculation");
    Ok(())
}
