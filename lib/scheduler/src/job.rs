//! The scheduled booking job and its lifecycle.

use crate::error::StoreError;
use crate::secret::SecretRef;
use chrono::{DateTime, SecondsFormat, Utc};
use passbook_core::{BookingOutcome, BookingRequest, JobId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job.
///
/// `pending -> running -> completed | failed`, or `pending -> cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its timer.
    Pending,
    /// The booking pipeline is executing.
    Running,
    /// Booked.
    Completed,
    /// Execution ended without a booking.
    Failed,
    /// Cancelled before it ran.
    Cancelled,
}

impl JobStatus {
    /// Whether the status can never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    /// Lowercase name, as persisted.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested future booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub request: BookingRequest,
    /// Where the card number and PIN are kept; never the values themselves.
    pub credentials: SecretRef,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BookingOutcome>,
    /// Kept in the job's log file, not in the record.
    #[serde(skip)]
    pub logs: Vec<String>,
}

impl Job {
    /// Creates a pending job.
    #[must_use]
    pub fn new(
        id: JobId,
        request: BookingRequest,
        credentials: SecretRef,
        scheduled_for: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            request,
            credentials,
            scheduled_for,
            status: JobStatus::Pending,
            created_at,
            executed_at: None,
            result: None,
            logs: Vec::new(),
        }
    }

    /// Moves to `next` if the transition is legal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` and leaves the job untouched otherwise.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Formats a log entry the way it is stored.
#[must_use]
pub fn log_line(at: DateTime<Utc>, message: &str) -> String {
    format!(
        "[{}] {message}",
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Read view of a job: no credentials, no logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub request: BookingRequest,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub result: Option<BookingOutcome>,
    pub has_credentials: bool,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            request: job.request.clone(),
            scheduled_for: job.scheduled_for,
            status: job.status,
            created_at: job.created_at,
            executed_at: job.executed_at,
            result: job.result.clone(),
            has_credentials: !job.credentials.as_str().is_empty(),
        }
    }
}
