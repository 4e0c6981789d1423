//! Timer-driven scheduling of booking jobs.
//!
//! The scheduler owns one timer task per pending job. When a timer fires the
//! job moves to `running`, the injected [`JobExecutor`] runs on its own task,
//! and whatever it returns (or a panic) becomes the job's terminal state.

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::executor::{ExecutionContext, JobExecutor, JobLogger};
use crate::job::{JobStatus, JobSummary};
use crate::schedule::OpeningRule;
use crate::secret::SecretStore;
use crate::store::JobStore;
use chrono::{DateTime, NaiveDate, Utc};
use passbook_core::{BookingError, BookingOutcome, BookingRequest, Credentials, JobId};
use rootcause::prelude::{Report, ResultExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

/// A request to book a pass when its window opens.
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub request: BookingRequest,
    pub credentials: Credentials,
    /// Overrides the computed opening time.
    pub custom_time: Option<DateTime<Utc>>,
}

/// An armed timer, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTimer {
    pub job_id: JobId,
    pub resource_id: String,
    pub target_date: NaiveDate,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub next_invocation: DateTime<Utc>,
}

/// What startup recovery found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RehydrateSummary {
    pub total: usize,
    /// Pending jobs whose timers were armed.
    pub rearmed: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Jobs left `running` by a previous process, now failed.
    pub orphaned: usize,
}

struct ArmedTimer {
    fire_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Arc<JobStore>,
    secrets: Arc<dyn SecretStore>,
    executor: Arc<dyn JobExecutor>,
    rule: OpeningRule,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<JobId, ArmedTimer>>,
}

/// Schedules, runs, cancels and recovers booking jobs.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        store: Arc<JobStore>,
        secrets: Arc<dyn SecretStore>,
        executor: Arc<dyn JobExecutor>,
        rule: OpeningRule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                secrets,
                executor,
                rule,
                clock,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<JobId, ArmedTimer>> {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn logger(&self, job_id: JobId) -> JobLogger {
        JobLogger::new(job_id, self.inner.store.clone())
    }

    /// Creates a job and arms its timer, or starts it right away if its time
    /// has already passed. An immediate job is `running` when this returns.
    ///
    /// # Errors
    ///
    /// Fails before creating anything if the request is invalid; fails if the
    /// credentials or the job record cannot be stored.
    #[tracing::instrument(skip(self, request), fields(resource_id = %request.request.resource_id))]
    pub async fn schedule(
        &self,
        request: ScheduleRequest,
    ) -> Result<JobSummary, Report<SchedulerError>> {
        let ScheduleRequest {
            request,
            credentials,
            custom_time,
        } = request;
        request.validate().map_err(SchedulerError::Validation)?;
        credentials.validate().map_err(SchedulerError::Validation)?;

        let scheduled_for = match custom_time {
            Some(at) => at,
            None => self
                .inner
                .rule
                .opens_at(request.target_date)
                .map_err(SchedulerError::Schedule)?,
        };

        let job_id = JobId::new();
        let now = self.inner.clock.now();
        let secret = self
            .inner
            .secrets
            .put(job_id, &credentials)
            .await
            .map_err(SchedulerError::Secret)?;

        let job = crate::job::Job::new(job_id, request, secret.clone(), scheduled_for, now);
        let created = self
            .inner
            .store
            .create(job)
            .await
            .context(SchedulerError::JobOperation { job_id });
        if created.is_err()
            && let Err(e) = self.inner.secrets.remove(&secret).await
        {
            tracing::warn!(job_id = %job_id, error = %e, "failed to discard credentials of unsaved job");
        }
        let job = created?;

        let logger = self.logger(job_id);
        logger
            .log(format!("Booking scheduled for {}", scheduled_for.to_rfc3339()))
            .await;
        logger
            .log(format!(
                "Museum: {}, Date: {}, Pass: {}",
                job.request.resource_id, job.request.target_date, job.request.pass_id
            ))
            .await;
        tracing::info!(job_id = %job_id, %scheduled_for, "booking scheduled");

        if scheduled_for <= now {
            logger
                .log("Scheduled time has passed, executing immediately")
                .await;
            let running = self
                .inner
                .store
                .start(job_id, now)
                .await
                .context(SchedulerError::JobOperation { job_id })?;
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run(job_id).await });
            return Ok(JobSummary::from(&running));
        }

        self.arm(job_id, scheduled_for);
        Ok(JobSummary::from(&job))
    }

    /// Arms a timer unless one is already armed for the job.
    fn arm(&self, job_id: JobId, fire_at: DateTime<Utc>) -> bool {
        let mut timers = self.timers();
        if timers.contains_key(&job_id) {
            return false;
        }
        let delay = (fire_at - self.inner.clock.now())
            .to_std()
            .unwrap_or_default();
        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.fire(job_id).await;
        });
        timers.insert(job_id, ArmedTimer { fire_at, handle });
        tracing::debug!(job_id = %job_id, %fire_at, "timer armed");
        true
    }

    async fn fire(&self, job_id: JobId) {
        self.timers().remove(&job_id);
        let now = self.inner.clock.now();
        if let Err(e) = self.inner.store.start(job_id, now).await {
            tracing::info!(job_id = %job_id, error = %e, "timer fired for a job that is no longer pending");
            return;
        }
        self.run(job_id).await;
    }

    /// Executes a job that is already `running` and records its outcome.
    #[tracing::instrument(skip(self))]
    async fn run(&self, job_id: JobId) {
        let logger = self.logger(job_id);
        logger.log("=== STARTING BOOKING EXECUTION ===").await;
        tracing::info!(job_id = %job_id, "booking execution started");

        let result = match self.context_for(job_id, logger.clone()).await {
            Ok(ctx) => {
                let executor = self.inner.executor.clone();
                match tokio::spawn(async move { executor.execute(ctx).await }).await {
                    Ok(result) => result,
                    Err(join) => Err(BookingError::Aborted {
                        reason: if join.is_panic() {
                            "booking task panicked".to_string()
                        } else {
                            "booking task was cancelled".to_string()
                        },
                    }),
                }
            }
            Err(err) => Err(err),
        };

        match &result {
            Ok(confirmation) => {
                logger.log("=== BOOKING COMPLETED SUCCESSFULLY ===").await;
                tracing::info!(
                    job_id = %job_id,
                    confirmation = %confirmation.confirmation_id,
                    "booking completed"
                );
            }
            Err(err) => {
                logger.log(format!("=== BOOKING FAILED: {err} ===")).await;
                tracing::warn!(job_id = %job_id, error = %err, "booking failed");
            }
        }

        if let Err(e) = self
            .inner
            .store
            .finish(job_id, BookingOutcome::from(&result))
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "failed to record booking outcome");
        }
    }

    async fn context_for(
        &self,
        job_id: JobId,
        logger: JobLogger,
    ) -> Result<ExecutionContext, BookingError> {
        let job = self
            .inner
            .store
            .get(job_id)
            .await
            .ok_or_else(|| BookingError::Aborted {
                reason: format!("job {job_id} disappeared"),
            })?;
        let credentials = self
            .inner
            .secrets
            .get(&job.credentials)
            .await
            .map_err(|e| BookingError::Aborted {
                reason: format!("credentials unavailable: {e}"),
            })?;
        Ok(ExecutionContext {
            job_id,
            request: job.request,
            credentials,
            logger,
        })
    }

    /// Cancels a pending job and disarms its timer. Returns `false` for any
    /// job that is not pending.
    ///
    /// # Errors
    ///
    /// Fails if the cancellation cannot be persisted.
    pub async fn cancel(&self, job_id: JobId) -> Result<bool, Report<SchedulerError>> {
        let cancelled = self
            .inner
            .store
            .cancel(job_id)
            .await
            .context(SchedulerError::JobOperation { job_id })?;
        if cancelled {
            if let Some(timer) = self.timers().remove(&job_id) {
                timer.handle.abort();
            }
            self.logger(job_id).log("Booking cancelled").await;
            tracing::info!(job_id = %job_id, "booking cancelled");
        }
        Ok(cancelled)
    }

    /// Sanitized view of one job.
    pub async fn get(&self, job_id: JobId) -> Option<JobSummary> {
        self.inner
            .store
            .get(job_id)
            .await
            .map(|job| JobSummary::from(&job))
    }

    /// Sanitized views of all jobs, newest first.
    pub async fn list(&self) -> Vec<JobSummary> {
        self.inner
            .store
            .list()
            .await
            .iter()
            .map(JobSummary::from)
            .collect()
    }

    /// The job's log lines, durable copy first.
    ///
    /// # Errors
    ///
    /// Fails if the durable log cannot be read.
    pub async fn logs(&self, job_id: JobId) -> Result<Option<Vec<String>>, Report<SchedulerError>> {
        self.inner
            .store
            .logs(job_id)
            .await
            .context(SchedulerError::JobOperation { job_id })
    }

    /// Timers that have not fired yet, soonest first.
    pub async fn active_timers(&self) -> Vec<ActiveTimer> {
        let armed: Vec<(JobId, DateTime<Utc>)> = self
            .timers()
            .iter()
            .map(|(job_id, timer)| (*job_id, timer.fire_at))
            .collect();

        let mut active = Vec::with_capacity(armed.len());
        for (job_id, next_invocation) in armed {
            if let Some(job) = self.inner.store.get(job_id).await {
                active.push(ActiveTimer {
                    job_id,
                    resource_id: job.request.resource_id,
                    target_date: job.request.target_date,
                    scheduled_for: job.scheduled_for,
                    status: job.status,
                    next_invocation,
                });
            }
        }
        active.sort_by_key(|timer| timer.next_invocation);
        active
    }

    /// Loads persisted jobs and re-arms every pending one. Terminal jobs are
    /// left alone; jobs a previous process left `running` are failed.
    ///
    /// Call once, at startup.
    ///
    /// # Errors
    ///
    /// Fails if the persisted jobs cannot be listed.
    pub async fn rehydrate(&self) -> Result<RehydrateSummary, Report<SchedulerError>> {
        let jobs = self
            .inner
            .store
            .load_all()
            .await
            .context(SchedulerError::RehydrationFailed)?;

        let mut summary = RehydrateSummary {
            total: jobs.len(),
            ..RehydrateSummary::default()
        };
        for job in jobs {
            match job.status {
                JobStatus::Pending => {
                    if self.arm(job.id, job.scheduled_for) {
                        summary.rearmed += 1;
                    }
                }
                JobStatus::Running => {
                    self.abandon(job.id).await;
                    summary.orphaned += 1;
                }
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Cancelled => summary.cancelled += 1,
            }
        }

        tracing::info!(
            total = summary.total,
            pending = summary.rearmed,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            orphaned = summary.orphaned,
            "loaded scheduled bookings"
        );
        Ok(summary)
    }

    async fn abandon(&self, job_id: JobId) {
        let err = BookingError::Aborted {
            reason: "interrupted by restart".to_string(),
        };
        self.logger(job_id)
            .log(format!("=== BOOKING FAILED: {err} ==="))
            .await;
        if let Err(e) = self
            .inner
            .store
            .finish(job_id, BookingOutcome::failed(&err))
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "failed to fail interrupted job");
        } else {
            tracing::warn!(job_id = %job_id, "job was interrupted by restart");
        }
    }

    /// Deletes a finished job, its log and its stored credentials.
    ///
    /// # Errors
    ///
    /// Fails if the job's files cannot be removed.
    pub async fn purge(&self, job_id: JobId) -> Result<bool, Report<SchedulerError>> {
        let Some(job) = self
            .inner
            .store
            .purge(job_id)
            .await
            .context(SchedulerError::JobOperation { job_id })?
        else {
            return Ok(false);
        };
        if let Err(e) = self.inner.secrets.remove(&job.credentials).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to remove credentials of purged job");
        }
        tracing::info!(job_id = %job_id, "job purged");
        Ok(true)
    }

    /// Disarms every timer without touching job records; they re-arm on the
    /// next [`rehydrate`](Self::rehydrate).
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}
