//! Error types for the automation crate.

use std::fmt;

/// Errors raised by an [`AutomationDriver`](crate::AutomationDriver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The browser process could not be started or reached.
    Launch { reason: String },
    /// The protocol connection dropped or refused a message.
    Connection { reason: String },
    /// The browser answered a command with an error.
    Protocol { method: String, message: String },
    /// A navigation failed outright.
    Navigation { url: String, reason: String },
    /// A bounded driver-level wait ran out.
    Timeout { operation: String },
    /// The locator matched nothing.
    ElementNotFound { locator: String },
    /// The handle does not refer to a live page or browser.
    UnknownHandle { id: String },
    /// In-page script threw.
    Script { message: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Launch { reason } => write!(f, "browser launch failed: {reason}"),
            Self::Connection { reason } => write!(f, "devtools connection failed: {reason}"),
            Self::Protocol { method, message } => write!(f, "{method} failed: {message}"),
            Self::Navigation { url, reason } => write!(f, "navigation to {url} failed: {reason}"),
            Self::Timeout { operation } => write!(f, "timed out waiting for {operation}"),
            Self::ElementNotFound { locator } => write!(f, "no element matches {locator}"),
            Self::UnknownHandle { id } => write!(f, "unknown browser handle: {id}"),
            Self::Script { message } => write!(f, "page script failed: {message}"),
        }
    }
}

impl std::error::Error for DriverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_names_method() {
        let err = DriverError::Protocol {
            method: "Page.navigate".to_string(),
            message: "Cannot navigate to invalid URL".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Page.navigate failed: Cannot navigate to invalid URL"
        );
    }

    #[test]
    fn timeout_display() {
        let err = DriverError::Timeout {
            operation: "page load".to_string(),
        };
        assert!(err.to_string().contains("page load"));
    }
}
