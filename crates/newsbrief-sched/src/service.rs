//! Scheduler lifecycle, job registry mutation, and introspection.
//!
//! One [`SchedulerService`] exists per process, constructed in `main` and
//! shared with the control surface. All lifecycle mutation
//! ([`SchedulerService::ensure_started`], [`SchedulerService::shutdown`])
//! serializes on a single async lock; reads take only short registry
//! critical sections and may observe state that is concurrently being
//! replaced, which is acceptable because they only report.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use newsbrief_core::JobId;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::cron;
use crate::registry::{JobHandler, JobRegistry};
use crate::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No scheduler instance exists (never started, or discarded by stop).
    NotStarted,
    /// The scheduler is executing jobs at their fire times.
    Running,
    /// All job executions are suspended.
    Paused,
    /// The instance exists but its timer is stopped.
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SchedulerState::NotStarted => "not_started",
            SchedulerState::Running => "running",
            SchedulerState::Paused => "paused",
            SchedulerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// One row of [`SchedulerService::jobs_overview`].
///
/// `paused` is derived: a job with no next run time is paused.
#[derive(Debug, Clone, Serialize)]
pub struct JobOverview {
    pub id: JobId,
    pub name: &'static str,
    pub next_run_time: Option<DateTime<Utc>>,
    pub trigger: String,
    pub paused: bool,
}

#[derive(Clone)]
struct JobEntry {
    /// Resolved five-field expression this registration was built from.
    expression: String,
    /// Live registration in the underlying timer; `None` while paused.
    registration: Option<Uuid>,
}

struct Registered {
    timezone: Tz,
    entries: HashMap<JobId, JobEntry>,
}

struct ActiveScheduler {
    scheduler: JobScheduler,
    registered: Mutex<Registered>,
    /// Tracks in-flight handler invocations so shutdown can drain them.
    tracker: TaskTracker,
    running: AtomicBool,
}

/// Process-wide recurring-job scheduler with runtime control.
pub struct SchedulerService {
    registry: JobRegistry,
    /// Serializes `ensure_started` and `shutdown` against each other.
    lifecycle: tokio::sync::Mutex<()>,
    active: RwLock<Option<Arc<ActiveScheduler>>>,
}

impl SchedulerService {
    #[must_use]
    pub fn new(registry: JobRegistry) -> Self {
        Self {
            registry,
            lifecycle: tokio::sync::Mutex::new(()),
            active: RwLock::new(None),
        }
    }

    /// Idempotently guarantee a running scheduler with up-to-date jobs.
    ///
    /// On first call, builds the underlying timer, registers every known
    /// job with its resolved cron trigger, and starts it. On later calls,
    /// re-reads the timezone and re-registers jobs when `refresh` is true,
    /// the timezone changed, or a known job is missing from the registry;
    /// a previously stopped timer is restarted. Re-registering replaces a
    /// job's trigger, so a paused job becomes active again.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Backend`] if the underlying timer cannot
    /// be built, populated, or started.
    pub async fn ensure_started(&self, refresh: bool) -> Result<(), SchedulerError> {
        let _guard = self.lifecycle.lock().await;
        let timezone = cron::resolve_timezone(|var| std::env::var(var));

        let existing = self.active.read().clone();
        match existing {
            None => {
                let active = self.build_and_start(timezone).await?;
                *self.active.write() = Some(active);
                tracing::info!(timezone = %timezone, "scheduler initialized");
            }
            Some(active) => {
                let needs_reschedule = refresh || {
                    let registered = active.registered.lock();
                    registered.timezone != timezone
                        || JobId::ALL
                            .iter()
                            .any(|id| !registered.entries.contains_key(id))
                };
                if needs_reschedule {
                    self.register_jobs(&active, timezone).await?;
                }
                if !active.running.load(Ordering::SeqCst) {
                    active.scheduler.start().await?;
                    active.running.store(true, Ordering::SeqCst);
                }
                tracing::info!(timezone = %timezone, refresh, "scheduler refreshed");
            }
        }
        Ok(())
    }

    /// Stop the scheduler if one exists and discard it.
    ///
    /// The next [`Self::ensure_started`] builds fresh state. With
    /// `wait = true`, blocks until every in-flight handler invocation has
    /// returned; otherwise in-flight runs finish in the background. Safe to
    /// call when no scheduler exists.
    pub async fn shutdown(&self, wait: bool) {
        let _guard = self.lifecycle.lock().await;
        let Some(active) = self.active.write().take() else {
            return;
        };
        active.running.store(false, Ordering::SeqCst);
        let mut scheduler = active.scheduler.clone();
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!(error = %e, "error while stopping scheduler timer");
        }
        active.tracker.close();
        if wait {
            active.tracker.wait().await;
        }
        tracing::info!(wait, "scheduler shut down");
    }

    /// Suppress future fires of `id` without dropping its registration.
    ///
    /// The job's next run time becomes absent, which is the paused signal
    /// reported by [`Self::jobs_overview`]. Pausing an already paused job
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotRunning`] when no scheduler exists,
    /// [`SchedulerError::UnknownJob`] when `id` has no registry entry, or
    /// [`SchedulerError::Backend`] if the timer rejects the removal.
    pub async fn pause_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let active = self.require_running()?;
        let registration = {
            let registered = active.registered.lock();
            registered
                .entries
                .get(&id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?
                .registration
        };
        let Some(registration) = registration else {
            tracing::debug!(job = %id, "pause requested for already paused job");
            return Ok(());
        };
        active.scheduler.remove(&registration).await?;
        if let Some(entry) = active.registered.lock().entries.get_mut(&id) {
            entry.registration = None;
        }
        tracing::info!(job = %id, "paused job");
        Ok(())
    }

    /// Rebuild a paused job's trigger from its stored expression and
    /// recompute its next fire time. Resuming a job that is not paused is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::pause_job`].
    pub async fn resume_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let active = self.require_running()?;
        let (expression, timezone, currently_registered) = {
            let registered = active.registered.lock();
            let entry = registered
                .entries
                .get(&id)
                .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
            (
                entry.expression.clone(),
                registered.timezone,
                entry.registration.is_some(),
            )
        };
        if currently_registered {
            tracing::debug!(job = %id, "resume requested for job that is not paused");
            return Ok(());
        }
        let handler = self
            .registry
            .handler(id)
            .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
        let job = build_job(
            id,
            &cron::to_seconds_cron(&expression),
            timezone,
            handler,
            active.tracker.clone(),
        )?;
        let registration = active.scheduler.add(job).await?;
        if let Some(entry) = active.registered.lock().entries.get_mut(&id) {
            entry.registration = Some(registration);
        }
        tracing::info!(job = %id, "resumed job");
        Ok(())
    }

    /// Invoke `id`'s handler once, immediately, on the caller's task.
    ///
    /// This bypasses the timer entirely: it works while the job is paused
    /// and while the scheduler is stopped or was never started. Handler
    /// failures are logged at the invocation boundary, not surfaced.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::UnknownJob`] when `id` has no handler.
    pub async fn trigger_job(&self, id: JobId) -> Result<(), SchedulerError> {
        let handler = self
            .registry
            .handler(id)
            .ok_or_else(|| SchedulerError::UnknownJob(id.to_string()))?;
        tracing::info!(job = %id, "manual trigger");
        // Route through the drain tracker when an instance exists so
        // shutdown(wait = true) also waits for manual runs.
        let active = self.active.read().clone();
        match active {
            Some(active) => active.tracker.track_future(run_handler(id, handler)).await,
            None => run_handler(id, handler).await,
        }
        Ok(())
    }

    /// Current lifecycle state. Never blocks, never fails.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        match self.active.read().as_ref() {
            None => SchedulerState::NotStarted,
            Some(active) if active.running.load(Ordering::SeqCst) => SchedulerState::Running,
            Some(_) => SchedulerState::Stopped,
        }
    }

    /// Per-job view over the live registry, in [`JobId::ALL`] order.
    ///
    /// Empty when no scheduler exists.
    pub async fn jobs_overview(&self) -> Vec<JobOverview> {
        let Some(active) = self.active.read().clone() else {
            return Vec::new();
        };
        let snapshot: Vec<(JobId, JobEntry, Tz)> = {
            let registered = active.registered.lock();
            JobId::ALL
                .iter()
                .filter_map(|id| {
                    registered
                        .entries
                        .get(id)
                        .map(|entry| (*id, entry.clone(), registered.timezone))
                })
                .collect()
        };

        let mut scheduler = active.scheduler.clone();
        let mut jobs = Vec::with_capacity(snapshot.len());
        for (id, entry, timezone) in snapshot {
            let next_run_time = match entry.registration {
                Some(registration) => {
                    match scheduler.next_tick_for_job(registration).await {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::warn!(job = %id, error = %e, "failed to query next run time");
                            None
                        }
                    }
                }
                None => None,
            };
            jobs.push(JobOverview {
                id,
                name: id.display_name(),
                next_run_time,
                trigger: format!("cron[{}] tz[{timezone}]", entry.expression),
                paused: next_run_time.is_none(),
            });
        }
        jobs
    }

    /// Drive the scheduler until `token` is cancelled, then drain.
    ///
    /// Starts (or refreshes) the scheduler — a start failure is logged and
    /// left for a later `ensure_started` to retry — suspends until the
    /// token fires, and finishes with `shutdown(wait = true)` so in-flight
    /// runs complete before this returns. The caller owns translating OS
    /// signals into the token.
    pub async fn run_until_cancelled(&self, token: CancellationToken) {
        if let Err(e) = self.ensure_started(true).await {
            tracing::error!(error = %e, "failed to start scheduler");
        }
        token.cancelled().await;
        tracing::info!("cancellation received; stopping scheduler");
        self.shutdown(true).await;
    }

    async fn build_and_start(&self, timezone: Tz) -> Result<Arc<ActiveScheduler>, SchedulerError> {
        let scheduler = JobScheduler::new().await?;
        let active = Arc::new(ActiveScheduler {
            scheduler,
            registered: Mutex::new(Registered {
                timezone,
                entries: HashMap::new(),
            }),
            tracker: TaskTracker::new(),
            running: AtomicBool::new(false),
        });
        self.register_jobs(&active, timezone).await?;
        active.scheduler.start().await?;
        active.running.store(true, Ordering::SeqCst);
        Ok(active)
    }

    /// Replace the registration of every known job (never appends).
    async fn register_jobs(
        &self,
        active: &ActiveScheduler,
        timezone: Tz,
    ) -> Result<(), SchedulerError> {
        active.registered.lock().timezone = timezone;
        for definition in self.registry.definitions() {
            let id = definition.id;
            let resolved = cron::resolve_cron_expression(
                |var| std::env::var(var),
                id.cron_env_var(),
                id.default_cron(),
            );
            let expression = cron::effective_cron_expression(&resolved, id, timezone);

            let previous = active
                .registered
                .lock()
                .entries
                .get(&id)
                .and_then(|entry| entry.registration);
            if let Some(previous) = previous {
                if let Err(e) = active.scheduler.remove(&previous).await {
                    tracing::warn!(job = %id, error = %e, "failed to remove superseded registration");
                }
            }

            let job = build_job(
                id,
                &cron::to_seconds_cron(&expression),
                timezone,
                Arc::clone(&definition.handler),
                active.tracker.clone(),
            )?;
            let registration = active.scheduler.add(job).await?;
            active.registered.lock().entries.insert(
                id,
                JobEntry {
                    expression: expression.clone(),
                    registration: Some(registration),
                },
            );
            tracing::info!(job = %id, cron = %expression, timezone = %timezone, "registered job");
        }
        Ok(())
    }

    fn require_running(&self) -> Result<Arc<ActiveScheduler>, SchedulerError> {
        let active = self
            .active
            .read()
            .clone()
            .ok_or(SchedulerError::NotRunning)?;
        if !active.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }
        Ok(active)
    }
}

/// Build a timer job for `schedule` (seconds-first cron form).
///
/// Each fire takes a per-registration guard before running: if the
/// previous run of the same job is still executing, the fire is skipped
/// and logged, so missed fires coalesce instead of overlapping.
fn build_job(
    id: JobId,
    schedule: &str,
    timezone: Tz,
    handler: JobHandler,
    tracker: TaskTracker,
) -> Result<Job, SchedulerError> {
    let busy = Arc::new(tokio::sync::Mutex::new(()));
    let job = Job::new_async_tz(schedule, timezone, move |_uuid, _lock| {
        let handler = Arc::clone(&handler);
        let tracker = tracker.clone();
        let busy = Arc::clone(&busy);
        Box::pin(async move {
            let Ok(_running) = busy.try_lock_owned() else {
                tracing::warn!(job = %id, "previous run still in progress; skipping this fire");
                return;
            };
            tracker.track_future(run_handler(id, handler)).await;
        })
    })?;
    Ok(job)
}

async fn run_handler(id: JobId, handler: JobHandler) {
    tracing::info!(job = %id, "job run starting");
    match handler().await {
        Ok(()) => tracing::info!(job = %id, "job run finished"),
        Err(e) => tracing::error!(job = %id, error = %e, "job run failed"),
    }
}
