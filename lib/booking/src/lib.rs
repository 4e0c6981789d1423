//! Booking execution.
//!
//! This crate provides:
//!
//! - **SiteClient**: the booking site's URLs
//! - **SessionRegistry**: live authenticated browser sessions
//! - **AuthWorkflow**: logs in and hands a session to the registry
//! - **BookingWorkflow**: takes the session and drives the reservation form
//! - **BookingPipeline**: the two workflows as the scheduler's job executor

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod reservation;
pub mod session;
pub mod site;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use auth::{AuthPolicy, AuthState, AuthWorkflow};
pub use error::SiteError;
pub use pipeline::BookingPipeline;
pub use reservation::{BookingPolicy, BookingState, BookingWorkflow};
pub use session::{AuthenticatedSession, SessionRegistry};
pub use site::{LibCalSite, SiteClient};
