//! Error types for the booking crate.
//!
//! Workflow failures are reported as [`passbook_core::BookingError`]; this
//! module covers setup mistakes and how driver errors map onto that taxonomy.

use passbook_automation::DriverError;
use passbook_core::BookingError;
use std::fmt;

/// The configured booking site cannot be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    /// The base URL did not parse or has no host.
    InvalidBaseUrl { url: String, reason: String },
}

impl fmt::Display for SiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl { url, reason } => {
                write!(f, "invalid booking site url {url}: {reason}")
            }
        }
    }
}

impl std::error::Error for SiteError {}

/// A driver wait that ran out is a `Timeout`; anything else the browser did
/// wrong is a `DriverFailure`.
pub(crate) fn driver_error(err: DriverError) -> BookingError {
    match err {
        DriverError::Timeout { operation } => BookingError::Timeout { operation },
        other => BookingError::driver(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_base_url_display() {
        let err = SiteError::InvalidBaseUrl {
            url: "rooms".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid booking site url rooms: relative URL without a base"
        );
    }

    #[test]
    fn driver_timeout_stays_a_timeout() {
        let err = driver_error(DriverError::Timeout {
            operation: "navigation".to_string(),
        });
        assert_eq!(
            err,
            BookingError::Timeout {
                operation: "navigation".to_string()
            }
        );
        assert_eq!(err.to_string(), "timed out waiting for navigation");
    }

    #[test]
    fn other_driver_errors_are_failures() {
        let err = driver_error(DriverError::Launch {
            reason: "no such file or directory".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "browser automation failed: browser launch failed: no such file or directory"
        );
    }
}
