//! Scheduled retention using tokio-cron-scheduler.
//!
//! Retention runs on a cron cadence rather than on every insert, so write
//! paths stay cheap and eviction cost is paid in one place.
//!
//! ```text
//! Scheduler (hourly by default)
//!     │
//!     └─► cleanup(store, policy)
//!             └─► over budget? → delete oldest 20% of rows
//! ```

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::error::ScheduleError;
use crate::retention::{cleanup, RetentionPolicy};
use crate::store::LogStore;

/// Hourly, at the top of the hour.
pub const DEFAULT_SCHEDULE: &str = "0 0 * * * *";

/// Starts a scheduler that runs retention against `store` on `schedule`
/// (six-field cron). The scheduler keeps running until shut down or dropped.
pub async fn start_retention_scheduler(
    store: LogStore,
    policy: RetentionPolicy,
    schedule: &str,
) -> Result<JobScheduler, ScheduleError> {
    let scheduler = JobScheduler::new().await?;

    let job_store = store.clone();
    let retention_job = Job::new_async(schedule, move |_uuid, _lock| {
        let store = job_store.clone();
        Box::pin(async move {
            match cleanup(&store, &policy).await {
                Ok(outcome) => tracing::debug!(?outcome, "log retention pass finished"),
                Err(err) => tracing::error!(error = %err, "log retention pass failed"),
            }
        })
    })?;

    scheduler.add(retention_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule, "log retention scheduler started");
    Ok(scheduler)
}
