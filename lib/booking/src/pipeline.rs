//! Login followed by booking, as one scheduled execution.

use crate::auth::{AuthPolicy, AuthWorkflow};
use crate::reservation::{BookingPolicy, BookingWorkflow};
use crate::session::SessionRegistry;
use crate::site::SiteClient;
use async_trait::async_trait;
use passbook_automation::AutomationDriver;
use passbook_core::{BookingError, Confirmation};
use passbook_scheduler::{ExecutionContext, JobExecutor};
use std::sync::Arc;

/// Runs [`AuthWorkflow`] then [`BookingWorkflow`] for each fired job.
pub struct BookingPipeline {
    auth: AuthWorkflow,
    booking: BookingWorkflow,
    registry: Arc<SessionRegistry>,
}

impl BookingPipeline {
    #[must_use]
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        site: Arc<dyn SiteClient>,
        registry: Arc<SessionRegistry>,
        auth_policy: AuthPolicy,
        booking_policy: BookingPolicy,
    ) -> Self {
        Self {
            auth: AuthWorkflow::new(
                driver.clone(),
                site.clone(),
                registry.clone(),
                auth_policy,
            ),
            booking: BookingWorkflow::new(driver, site, registry.clone(), booking_policy),
            registry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

#[async_trait]
impl JobExecutor for BookingPipeline {
    async fn execute(&self, ctx: ExecutionContext) -> Result<Confirmation, BookingError> {
        let ExecutionContext {
            job_id,
            request,
            credentials,
            logger,
        } = ctx;

        logger.log("Logging in...").await;
        let session_id = match self.auth.login(&request, &credentials).await {
            Ok(id) => id,
            Err(err) => {
                logger.log(format!("Login failed: {err}")).await;
                return Err(err);
            }
        };
        logger
            .log(format!("Login successful, sessionId: {session_id}"))
            .await;

        logger.log("Attempting to book pass...").await;
        let result = self.booking.run(session_id, &request).await;
        let summary = match &result {
            Ok(confirmation) => format!(
                "Booking result: success, confirmation {} ({})",
                confirmation.confirmation_id, confirmation.matched
            ),
            Err(err) => format!("Booking result: failure, {err}"),
        };
        logger.log(summary).await;
        tracing::debug!(job_id = %job_id, open_sessions = self.registry.len(), "execution finished");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::LibCalSite;
    use crate::testing::{FakeDriver, SiteScript, SubmitOutcome};
    use chrono::{Duration, NaiveDate, Utc};
    use passbook_automation::{Locator, PollPolicy};
    use passbook_core::{BookingRequest, Credentials, JobId};
    use passbook_scheduler::{
        Clock, JobStatus, JobStore, JobSummary, MemoryPersistence, MemorySecretStore,
        OpeningRule, ScheduleRequest, Scheduler, SystemClock,
    };

    struct Harness {
        driver: Arc<FakeDriver>,
        registry: Arc<SessionRegistry>,
        scheduler: Scheduler,
    }

    fn harness(script: SiteScript) -> Harness {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let driver = Arc::new(FakeDriver::new(script));
        let registry = Arc::new(SessionRegistry::new(driver.clone(), clock.clone()));
        let site = Arc::new(LibCalSite::new(LibCalSite::DEFAULT_BASE_URL).expect("site"));
        let pipeline = BookingPipeline::new(
            driver.clone(),
            site,
            registry.clone(),
            AuthPolicy {
                settle_delay: std::time::Duration::ZERO,
                form_wait: PollPolicy::millis(1, 5),
                ..AuthPolicy::default()
            },
            BookingPolicy {
                page_ready: PollPolicy::millis(1, 5),
                consent_wait: PollPolicy::millis(1, 5),
                outcome_wait: PollPolicy::millis(1, 5),
                ..BookingPolicy::default()
            },
        );
        let store = Arc::new(JobStore::new(
            Arc::new(MemoryPersistence::new()),
            clock.clone(),
        ));
        let scheduler = Scheduler::new(
            store,
            Arc::new(MemorySecretStore::new()),
            Arc::new(pipeline),
            OpeningRule::default(),
            clock,
        );
        Harness {
            driver,
            registry,
            scheduler,
        }
    }

    fn due_now() -> ScheduleRequest {
        ScheduleRequest {
            request: BookingRequest::new(
                "7521",
                NaiveDate::from_ymd_opt(2030, 12, 1).expect("date"),
                "52",
            ),
            credentials: Credentials::new("27777000111", "pin-4321"),
            custom_time: Some(Utc::now() - Duration::minutes(1)),
        }
    }

    async fn wait_for_terminal(scheduler: &Scheduler, job_id: JobId) -> JobSummary {
        for _ in 0..200 {
            if let Some(job) = scheduler.get(job_id).await
                && job.status.is_terminal()
            {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never finished");
    }

    async fn logs(scheduler: &Scheduler, job_id: JobId) -> Vec<String> {
        scheduler
            .logs(job_id)
            .await
            .expect("logs")
            .expect("job exists")
    }

    #[tokio::test]
    async fn successful_booking_completes_job() {
        let h = harness(SiteScript {
            booking_elements: vec![Locator::css("input[type='submit']")],
            submit_outcome: SubmitOutcome::Redirect(
                "https://rooms.kcls.org/passes/7521/confirmation".to_string(),
            ),
            ..SiteScript::default()
        });

        let job = h.scheduler.schedule(due_now()).await.expect("schedule");
        let job = wait_for_terminal(&h.scheduler, job.id).await;

        assert_eq!(job.status, JobStatus::Completed);
        let outcome = job.result.expect("result");
        assert!(outcome.success);
        assert!(
            outcome
                .confirmation_id
                .is_some_and(|id| id.starts_with("PB-"))
        );
        assert!(h.registry.is_empty());
        assert_eq!(h.driver.open_browsers(), 0);

        let lines = logs(&h.scheduler, job.id).await;
        for expected in [
            "Logging in...",
            "Login successful, sessionId: sess_",
            "Attempting to book pass...",
            "Booking result: success, confirmation PB-",
            "=== BOOKING COMPLETED SUCCESSFULLY ===",
        ] {
            assert!(
                lines.iter().any(|line| line.contains(expected)),
                "missing {expected:?} in {lines:?}"
            );
        }
        assert!(
            lines
                .iter()
                .all(|line| !line.contains("27777000111") && !line.contains("pin-4321"))
        );
    }

    #[tokio::test]
    async fn rejected_login_fails_job() {
        let h = harness(SiteScript {
            accept_login: false,
            ..SiteScript::default()
        });

        let job = h.scheduler.schedule(due_now()).await.expect("schedule");
        let job = wait_for_terminal(&h.scheduler, job.id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.result.and_then(|r| r.error).as_deref(),
            Some("login rejected: login failed")
        );
        assert!(h.registry.is_empty());
        assert_eq!(h.driver.open_browsers(), 0);
        let lines = logs(&h.scheduler, job.id).await;
        assert!(lines.iter().any(|l| l.contains("Login failed: login rejected")));
        assert!(!lines.iter().any(|l| l.contains("Attempting to book pass...")));
    }

    #[tokio::test]
    async fn missing_control_fails_job() {
        let h = harness(SiteScript::default());

        let job = h.scheduler.schedule(due_now()).await.expect("schedule");
        let job = wait_for_terminal(&h.scheduler, job.id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.result.and_then(|r| r.error).as_deref(),
            Some("could not find booking control")
        );
        assert_eq!(h.driver.launches(), 1);
        assert_eq!(h.driver.open_browsers(), 0);
        let lines = logs(&h.scheduler, job.id).await;
        assert!(
            lines
                .iter()
                .any(|l| l.contains("Booking result: failure, could not find booking control")),
            "{lines:?}"
        );
    }

    #[tokio::test]
    async fn stalled_site_fails_job_with_timeout() {
        let h = harness(SiteScript {
            stall_navigation: true,
            ..SiteScript::default()
        });

        let job = h.scheduler.schedule(due_now()).await.expect("schedule");
        let job = wait_for_terminal(&h.scheduler, job.id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.result.and_then(|r| r.error).as_deref(),
            Some("timed out waiting for network idle")
        );
        assert_eq!(h.driver.open_browsers(), 0);
    }

    #[tokio::test]
    async fn launch_failure_fails_job() {
        let h = harness(SiteScript {
            fail_launch: true,
            ..SiteScript::default()
        });

        let job = h.scheduler.schedule(due_now()).await.expect("schedule");
        let job = wait_for_terminal(&h.scheduler, job.id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(
            job.result
                .and_then(|r| r.error)
                .is_some_and(|e| e.starts_with("browser automation failed"))
        );
    }
}
