//! The automation capability consumed by the booking workflows.

use crate::error::DriverError;
use crate::locator::Locator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An exclusively owned browser instance.
///
/// Not `Clone`: closing consumes the handle, so a browser is released at most
/// once.
#[derive(Debug, PartialEq, Eq)]
pub struct BrowserHandle {
    id: String,
}

impl BrowserHandle {
    /// Wraps a driver-assigned browser id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the driver-assigned id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An exclusively owned page (tab) inside a browser.
#[derive(Debug, PartialEq, Eq)]
pub struct PageHandle {
    id: String,
    browser_id: String,
}

impl PageHandle {
    /// Wraps a driver-assigned page id.
    #[must_use]
    pub fn new(id: impl Into<String>, browser_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            browser_id: browser_id.into(),
        }
    }

    /// Returns the driver-assigned id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the id of the browser the page lives in.
    #[must_use]
    pub fn browser_id(&self) -> &str {
        &self.browser_id
    }
}

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    /// The document finished loading.
    #[default]
    Load,
    /// The document loaded and network activity settled.
    NetworkIdle,
}

/// A browser cookie, as reported by the DevTools protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default)]
    pub path: String,
    /// Unix seconds; negative for session cookies.
    #[serde(default)]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// Drives a real (or fake) browser.
///
/// Every method that takes a handle by reference leaves ownership with the
/// caller; `close_page` and `close_browser` consume theirs.
#[async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Starts a fresh, isolated browser.
    async fn launch_browser(&self) -> Result<BrowserHandle, DriverError>;

    /// Opens a blank page in the browser.
    async fn open_page(&self, browser: &BrowserHandle) -> Result<PageHandle, DriverError>;

    /// Navigates and waits according to `wait`, bounded by `timeout`.
    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Waits until the page has left `from_url` and finished loading.
    async fn wait_for_navigation(
        &self,
        page: &PageHandle,
        from_url: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Returns the page's current location.
    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError>;

    /// Replaces the value of an input.
    async fn fill(&self, page: &PageHandle, locator: &Locator, value: &str)
    -> Result<(), DriverError>;

    /// Clicks an element with a synthesized pointer event.
    async fn click(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError>;

    /// Activates an element from inside the page (`element.click()`).
    async fn activate(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError>;

    /// Whether any element matches.
    async fn exists(&self, page: &PageHandle, locator: &Locator) -> Result<bool, DriverError>;

    /// Whether a matching element is rendered and visible.
    async fn is_visible(&self, page: &PageHandle, locator: &Locator)
    -> Result<bool, DriverError>;

    /// Whether the first match is enabled and can be used: it is visible
    /// itself, or one of its labels is (styled checkboxes hide the input).
    async fn is_interactable(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<bool, DriverError>;

    /// Trimmed text of the first match, if any.
    async fn text_of(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<Option<String>, DriverError>;

    /// Serialized page HTML.
    async fn content(&self, page: &PageHandle) -> Result<String, DriverError>;

    /// Every cookie the browser holds, HttpOnly ones included.
    async fn extract_all_cookies(&self, page: &PageHandle) -> Result<Vec<Cookie>, DriverError>;

    /// Closes a page.
    async fn close_page(&self, page: PageHandle) -> Result<(), DriverError>;

    /// Closes a browser and anything still open in it.
    async fn close_browser(&self, browser: BrowserHandle) -> Result<(), DriverError>;
}
