//! Cron expression and timezone resolution.
//!
//! Schedules are standard five-field cron expressions, overridable per job
//! through the environment. An override that fails to parse is downgraded
//! to a logged warning plus the job's hardcoded default; the defaults are
//! assumed always valid, so a failure there propagates as a configuration
//! bug rather than being papered over.

use std::env::VarError;

use chrono_tz::Tz;
use newsbrief_core::JobId;
use tokio_cron_scheduler::Job;

const TIMEZONE_ENV_VAR: &str = "CRON_TIMEZONE";

/// Resolve a job's cron expression from the environment.
///
/// Returns the trimmed env value when the variable is set and non-blank,
/// otherwise the hardcoded default.
pub fn resolve_cron_expression<F>(lookup: F, var: &str, default: &str) -> String
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(var) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

/// Resolve the scheduler timezone from `CRON_TIMEZONE`.
///
/// Unset or blank means UTC; an unrecognized zone is logged and downgraded
/// to UTC rather than failing startup.
pub fn resolve_timezone<F>(lookup: F) -> Tz
where
    F: Fn(&str) -> Result<String, VarError>,
{
    match lookup(TIMEZONE_ENV_VAR) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %raw, "unrecognized timezone; using UTC");
            Tz::UTC
        }),
        _ => Tz::UTC,
    }
}

/// Validate `candidate` as a five-field cron expression for `job`.
///
/// On parse failure, logs a warning naming the job and returns the job's
/// default expression instead. Never fails.
#[must_use]
pub fn effective_cron_expression(candidate: &str, job: JobId, timezone: Tz) -> String {
    if parses_as_cron(candidate, timezone) {
        candidate.to_string()
    } else {
        tracing::warn!(
            job = %job,
            expression = %candidate,
            fallback = %job.default_cron(),
            "invalid cron expression; falling back to default"
        );
        job.default_cron().to_string()
    }
}

/// Prefix a five-field expression with a zero seconds field, the form the
/// underlying timer parses.
pub(crate) fn to_seconds_cron(expression: &str) -> String {
    format!("0 {expression}")
}

fn parses_as_cron(expression: &str, timezone: Tz) -> bool {
    Job::new_async_tz(to_seconds_cron(expression).as_str(), timezone, |_uuid, _lock| {
        Box::pin(async {})
    })
    .is_ok()
}
