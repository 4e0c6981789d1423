//! Error types for the scheduler crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `StoreError`: job persistence and state transitions
//! - `SecretError`: the credential storage boundary
//! - `ScheduleError`: opening-time calculation
//! - `SchedulerError`: what the scheduler's public API reports

use crate::job::JobStatus;
use passbook_core::{JobId, ValidationError};
use std::fmt;

/// Errors from job store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No job with this id.
    NotFound { job_id: JobId },
    /// A job with this id already exists.
    AlreadyExists { job_id: JobId },
    /// The requested status change is not allowed.
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    /// Reading or writing durable state failed.
    Persistence { reason: String },
    /// A persisted record could not be decoded.
    CorruptRecord { path: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { job_id } => write!(f, "job not found: {job_id}"),
            Self::AlreadyExists { job_id } => write!(f, "job already exists: {job_id}"),
            Self::InvalidTransition { job_id, from, to } => {
                write!(f, "job {job_id} cannot move from {from} to {to}")
            }
            Self::Persistence { reason } => write!(f, "job persistence failed: {reason}"),
            Self::CorruptRecord { path, reason } => {
                write!(f, "corrupt job record {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from secret storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// Nothing is stored under this reference.
    NotFound { reference: String },
    /// The backend failed.
    Storage { reason: String },
}

impl fmt::Display for SecretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { reference } => write!(f, "no secret stored for {reference}"),
            Self::Storage { reason } => write!(f, "secret storage failed: {reason}"),
        }
    }
}

impl std::error::Error for SecretError {}

/// Errors from opening-time calculation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Not an IANA timezone name.
    InvalidTimezone { timezone: String },
    /// Opening hour outside 0..=23.
    InvalidOpeningTime { hour: u32 },
    /// The opening date falls outside the representable range.
    DateOutOfRange { date: String },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimezone { timezone } => write!(f, "invalid timezone: {timezone}"),
            Self::InvalidOpeningTime { hour } => write!(f, "invalid opening hour: {hour}"),
            Self::DateOutOfRange { date } => {
                write!(f, "cannot compute opening time for {date}")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

/// High-level scheduler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The booking request was rejected; no job was created.
    Validation(ValidationError),
    /// The opening time could not be computed.
    Schedule(ScheduleError),
    /// Credentials could not be stored or read.
    Secret(SecretError),
    /// A store operation on this job failed (use as context wrapper).
    JobOperation { job_id: JobId },
    /// Loading persisted jobs failed.
    RehydrationFailed,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid booking request: {err}"),
            Self::Schedule(err) => write!(f, "scheduling failed: {err}"),
            Self::Secret(err) => write!(f, "{err}"),
            Self::JobOperation { job_id } => write!(f, "job operation failed for {job_id}"),
            Self::RehydrationFailed => write!(f, "failed to load persisted jobs"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display() {
        let err = StoreError::InvalidTransition {
            job_id: JobId::new(),
            from: JobStatus::Completed,
            to: JobStatus::Running,
        };
        assert!(err.to_string().contains("cannot move from completed to running"));
    }

    #[test]
    fn schedule_error_display() {
        let err = ScheduleError::InvalidTimezone {
            timezone: "Mars/Olympus".to_string(),
        };
        assert_eq!(err.to_string(), "invalid timezone: Mars/Olympus");
    }

    #[test]
    fn validation_is_wrapped() {
        let err = SchedulerError::Validation(ValidationError::MissingField { field: "pass_id" });
        assert!(err.to_string().contains("missing required field: pass_id"));
    }
}
