//! Booking request and outcome types.

use crate::error::{BookingError, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// What to book: one pass for one resource on one date.
///
/// Immutable once a job is created from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Site identifier of the resource (museum).
    pub resource_id: String,
    /// The day the pass is for.
    pub target_date: NaiveDate,
    /// Site identifier of the pass type.
    pub pass_id: String,
    /// Request a digital pass.
    #[serde(default = "default_digital")]
    pub digital: bool,
    /// Request a physical pass.
    #[serde(default)]
    pub physical: bool,
    /// Pickup location code; `"0"` means any.
    #[serde(default = "default_location")]
    pub location: String,
}

fn default_digital() -> bool {
    true
}

fn default_location() -> String {
    "0".to_string()
}

impl BookingRequest {
    /// Creates a request with the default pass options (digital, any location).
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        target_date: NaiveDate,
        pass_id: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            target_date,
            pass_id: pass_id.into(),
            digital: default_digital(),
            physical: false,
            location: default_location(),
        }
    }

    /// Checks that every required field is present.
    ///
    /// # Errors
    ///
    /// Returns the first missing field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.resource_id.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "resource_id",
            });
        }
        if self.pass_id.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "pass_id" });
        }
        Ok(())
    }
}

/// Library card number and PIN.
///
/// `Debug` never prints either value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    library_card: String,
    pin: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(library_card: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            library_card: library_card.into(),
            pin: pin.into(),
        }
    }

    /// Returns the library card number.
    #[must_use]
    pub fn library_card(&self) -> &str {
        &self.library_card
    }

    /// Returns the PIN.
    #[must_use]
    pub fn pin(&self) -> &str {
        &self.pin
    }

    /// Checks that both components are non-empty.
    ///
    /// # Errors
    ///
    /// Returns the first missing component.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.library_card.trim().is_empty() {
            return Err(ValidationError::MissingCredential {
                field: "library_card",
            });
        }
        if self.pin.is_empty() {
            return Err(ValidationError::MissingCredential { field: "pin" });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("library_card", &"<redacted>")
            .field("pin", &"<redacted>")
            .finish()
    }
}

/// Evidence that a booking went through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Locally generated confirmation identifier.
    pub confirmation_id: String,
    /// Which success signal was observed.
    pub matched: String,
}

impl Confirmation {
    /// Generates a confirmation for the given success signal.
    #[must_use]
    pub fn generate(matched: impl Into<String>) -> Self {
        Self {
            confirmation_id: format!("PB-{}", Ulid::new()),
            matched: matched.into(),
        }
    }
}

/// Terminal result recorded on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingOutcome {
    /// Whether the booking succeeded.
    pub success: bool,
    /// Present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    /// Present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BookingOutcome {
    /// Outcome of a successful booking.
    #[must_use]
    pub fn succeeded(confirmation: &Confirmation) -> Self {
        Self {
            success: true,
            confirmation_id: Some(confirmation.confirmation_id.clone()),
            error: None,
        }
    }

    /// Outcome of a failed booking.
    #[must_use]
    pub fn failed(error: &BookingError) -> Self {
        Self {
            success: false,
            confirmation_id: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<&Result<Confirmation, BookingError>> for BookingOutcome {
    fn from(result: &Result<Confirmation, BookingError>) -> Self {
        match result {
            Ok(confirmation) => Self::succeeded(confirmation),
            Err(err) => Self::failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date")
    }

    #[test]
    fn request_defaults_when_deserialized() {
        let json = r#"{"resource_id":"7521","target_date":"2025-12-01","pass_id":"52"}"#;
        let request: BookingRequest = serde_json::from_str(json).expect("deserialize");
        assert!(request.digital);
        assert!(!request.physical);
        assert_eq!(request.location, "0");
        assert_eq!(request.target_date, date());
    }

    #[test]
    fn request_requires_resource_and_pass() {
        let mut request = BookingRequest::new("7521", date(), "52");
        assert!(request.validate().is_ok());

        request.pass_id = "  ".to_string();
        assert_eq!(
            request.validate(),
            Err(ValidationError::MissingField { field: "pass_id" })
        );
    }

    #[test]
    fn credentials_require_both_parts() {
        assert!(Credentials::new("1234", "9999").validate().is_ok());
        assert_eq!(
            Credentials::new("", "9999").validate(),
            Err(ValidationError::MissingCredential {
                field: "library_card"
            })
        );
        assert_eq!(
            Credentials::new("1234", "").validate(),
            Err(ValidationError::MissingCredential { field: "pin" })
        );
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = Credentials::new("27777000111", "4321");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("27777000111"));
        assert!(!debug.contains("4321"));
    }

    #[test]
    fn outcome_from_result() {
        let ok: Result<Confirmation, BookingError> = Ok(Confirmation::generate("url"));
        let outcome = BookingOutcome::from(&ok);
        assert!(outcome.success);
        assert!(outcome.confirmation_id.is_some_and(|c| c.starts_with("PB-")));

        let err: Result<Confirmation, BookingError> = Err(BookingError::SessionExpired);
        let outcome = BookingOutcome::from(&err);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("session expired"));
    }
}
