//! Core domain types and utilities for passbook.
//!
//! This crate provides the identifiers, booking request/outcome types and the
//! booking error taxonomy shared by the scheduler and the booking workflows.

pub mod booking;
pub mod error;
pub mod id;

pub use booking::{BookingOutcome, BookingRequest, Confirmation, Credentials};
pub use error::{BookingError, ValidationError};
pub use id::{JobId, ParseIdError, SessionId};
