//! Error types shared across passbook.
//!
//! `BookingError` is the taxonomy every booking execution ends in; its
//! `Display` text is what lands in a failed job's `result.error`. The store
//! and scheduler layer their own errors with rootcause reports.

use std::fmt;

/// A booking request was rejected before any job was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required request field was empty.
    MissingField { field: &'static str },
    /// A credential component was empty.
    MissingCredential { field: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing required field: {field}"),
            Self::MissingCredential { field } => {
                write!(f, "credentials must include {field}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// How a booking execution failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The request was malformed.
    Validation(ValidationError),
    /// The site refused the credentials.
    AuthRejected { reason: String },
    /// The session was unknown, expired or already released.
    SessionExpired,
    /// No selector strategy matched a required control.
    ControlNotFound { control: String },
    /// A bounded wait ran out.
    Timeout { operation: String },
    /// The browser or protocol connection failed.
    DriverFailure { message: String },
    /// The form was submitted but no success signal was observed.
    Ambiguous,
    /// The execution task died before reporting an outcome.
    Aborted { reason: String },
}

impl BookingError {
    /// Wraps a driver failure that is not a timeout.
    #[must_use]
    pub fn driver(err: impl fmt::Display) -> Self {
        Self::DriverFailure {
            message: err.to_string(),
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid request: {err}"),
            Self::AuthRejected { reason } => write!(f, "login rejected: {reason}"),
            Self::SessionExpired => write!(f, "session expired"),
            Self::ControlNotFound { control } => write!(f, "could not find {control}"),
            Self::Timeout { operation } => write!(f, "timed out waiting for {operation}"),
            Self::DriverFailure { message } => write!(f, "browser automation failed: {message}"),
            Self::Ambiguous => write!(f, "booking may have failed; verify manually"),
            Self::Aborted { reason } => write!(f, "execution aborted: {reason}"),
        }
    }
}

impl std::error::Error for BookingError {}

impl From<ValidationError> for BookingError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err)
    }
}
