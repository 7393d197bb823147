use newsbrief_core::UnknownJobError;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The operation requires an active scheduler and none exists.
    #[error("scheduler is not running")]
    NotRunning,

    /// The requested job id is outside the known set.
    #[error("unknown job '{0}'")]
    UnknownJob(String),

    /// Failure surfaced by the underlying timer.
    #[error("scheduler backend error: {0}")]
    Backend(String),
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Backend(err.to_string())
    }
}

impl From<UnknownJobError> for SchedulerError {
    fn from(err: UnknownJobError) -> Self {
        SchedulerError::UnknownJob(err.0)
    }
}
