//! Browser automation for passbook.
//!
//! This crate provides:
//!
//! - **AutomationDriver**: the capability the booking workflows drive
//! - **CdpDriver**: an implementation over the Chrome DevTools Protocol
//! - **Locators**: element lookup strategies, evaluated in priority order
//! - **Polling**: the single bounded wait primitive used by every workflow

pub mod cdp;
pub mod driver;
pub mod error;
pub mod locator;
pub mod poll;

pub use cdp::{CdpConfig, CdpDriver};
pub use driver::{AutomationDriver, BrowserHandle, Cookie, PageHandle, WaitUntil};
pub use error::DriverError;
pub use locator::{Locator, Strategy, first_match};
pub use poll::{PollPolicy, poll_until};
