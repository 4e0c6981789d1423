//! The seam between the scheduler and the booking pipeline.

use crate::store::JobStore;
use async_trait::async_trait;
use passbook_core::{BookingError, BookingRequest, Confirmation, Credentials, JobId};
use std::sync::Arc;

/// Appends human-readable progress lines to one job's durable log.
#[derive(Clone)]
pub struct JobLogger {
    job_id: JobId,
    store: Arc<JobStore>,
}

impl JobLogger {
    #[must_use]
    pub fn new(job_id: JobId, store: Arc<JobStore>) -> Self {
        Self { job_id, store }
    }

    #[must_use]
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Appends a line. A failed append is traced, never fatal to the booking.
    pub async fn log(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if let Err(e) = self.store.append_log(self.job_id, message).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "failed to append job log");
        }
    }
}

/// Everything one execution needs.
pub struct ExecutionContext {
    pub job_id: JobId,
    pub request: BookingRequest,
    pub credentials: Credentials,
    pub logger: JobLogger,
}

/// Runs the booking for a job whose timer fired.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Performs the booking. Every failure is reported as a [`BookingError`];
    /// the scheduler records it on the job.
    async fn execute(&self, ctx: ExecutionContext) -> Result<Confirmation, BookingError>;
}
