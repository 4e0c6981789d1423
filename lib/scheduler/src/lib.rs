//! Durable scheduling of booking jobs.
//!
//! This crate provides:
//!
//! - **JobStore**: jobs and their append-only logs, persisted per job
//! - **SecretStore**: the boundary credentials live behind
//! - **OpeningRule**: when a booking window opens for a target date
//! - **Scheduler**: one timer per pending job, execution, cancellation and
//!   restart recovery
//!
//! The booking pipeline itself is injected through [`JobExecutor`].

pub mod clock;
pub mod error;
pub mod executor;
pub mod job;
pub mod manager;
pub mod schedule;
pub mod secret;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{ScheduleError, SchedulerError, SecretError, StoreError};
pub use executor::{ExecutionContext, JobExecutor, JobLogger};
pub use job::{Job, JobStatus, JobSummary};
pub use manager::{ActiveTimer, RehydrateSummary, ScheduleRequest, Scheduler};
pub use schedule::OpeningRule;
pub use secret::{MemorySecretStore, PlaintextFileSecretStore, SecretRef, SecretStore};
pub use store::{FilePersistence, JobPersistence, JobStore, MemoryPersistence};
