//! Reservation workflow.
//!
//! Takes a session out of the [`SessionRegistry`], brings its page to the
//! booking form, accepts the terms if the form has them, submits, and looks
//! for a success signal. The session is released exactly once whichever way
//! the attempt ends.

use crate::error::driver_error;
use crate::session::{AuthenticatedSession, SessionRegistry};
use crate::site::SiteClient;
use futures::FutureExt;
use passbook_automation::{
    AutomationDriver, DriverError, Locator, PageHandle, PollPolicy, Strategy, WaitUntil,
    first_match, poll_until,
};
use passbook_core::{BookingError, BookingRequest, Confirmation, SessionId};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Selectors, success signals, and time bounds for the booking form.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Terms-acceptance control; optional on the page.
    pub terms: Locator,
    /// Submit controls, most specific first.
    pub submit_strategies: Vec<Strategy>,
    /// Case-insensitive URL fragments that mean the booking went through.
    pub success_url_patterns: Vec<String>,
    /// Case-insensitive page text that means the booking went through.
    pub success_terms: Vec<String>,
    /// How long to wait for a reused page to report its location.
    pub page_ready: PollPolicy,
    pub navigation_timeout: Duration,
    /// Wait for the submit control to become visible after accepting terms.
    pub consent_wait: PollPolicy,
    /// Wait for a success signal after submitting.
    pub outcome_wait: PollPolicy,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            terms: Locator::css("#terms_accept, input[name='terms_accept'], input[type='checkbox'][name*='terms']"),
            submit_strategies: vec![
                Strategy::new("libcal submit", Locator::css("#s-lc-submit, #btn-form-submit")),
                Strategy::new("form submit button", Locator::css("form button[type='submit']")),
                Strategy::new("submit input", Locator::css("input[type='submit']")),
                Strategy::new("book button", Locator::text("button", "Book")),
                Strategy::new("reserve button", Locator::text("button", "Reserve")),
                Strategy::new(
                    "submit text",
                    Locator::xpath(
                        "//button[contains(translate(normalize-space(.), 'SUBMIT', 'submit'), 'submit')]",
                    ),
                ),
            ],
            success_url_patterns: ["confirm", "success", "thank"]
                .into_iter()
                .map(String::from)
                .collect(),
            success_terms: [
                "booking confirmed",
                "reservation confirmed",
                "successfully booked",
                "your pass has been reserved",
                "confirmation number",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            page_ready: PollPolicy::millis(200, 5_000),
            navigation_timeout: Duration::from_secs(30),
            consent_wait: PollPolicy::millis(250, 5_000),
            outcome_wait: PollPolicy::millis(500, 15_000),
        }
    }
}

/// Where a booking attempt is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingState {
    Ready,
    ConsentCheck,
    AwaitingBookingForm,
    Submitting(Strategy),
    AwaitingOutcome,
    Success(Confirmation),
    Failure(BookingError),
}

impl fmt::Display for BookingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ready => "ready",
            Self::ConsentCheck => "consent_check",
            Self::AwaitingBookingForm => "awaiting_booking_form",
            Self::Submitting(_) => "submitting",
            Self::AwaitingOutcome => "awaiting_outcome",
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
        };
        f.write_str(name)
    }
}

/// Books a pass with an authenticated session.
pub struct BookingWorkflow {
    driver: Arc<dyn AutomationDriver>,
    site: Arc<dyn SiteClient>,
    registry: Arc<SessionRegistry>,
    policy: BookingPolicy,
}

impl BookingWorkflow {
    #[must_use]
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        site: Arc<dyn SiteClient>,
        registry: Arc<SessionRegistry>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            driver,
            site,
            registry,
            policy,
        }
    }

    /// Books `request` using the session registered under `session_id`.
    ///
    /// # Errors
    ///
    /// - `SessionExpired` if the session is unknown or expired; nothing is
    ///   navigated
    /// - `ControlNotFound` if no submit strategy matched
    /// - `Ambiguous` if the form was submitted but no success signal appeared
    /// - `Timeout` if the booking page never settled
    /// - `DriverFailure` if the browser could not be driven
    #[tracing::instrument(skip(self, request), fields(resource_id = %request.resource_id))]
    pub async fn run(
        &self,
        session_id: SessionId,
        request: &BookingRequest,
    ) -> Result<Confirmation, BookingError> {
        let mut session = self.registry.checkout(session_id).await?;
        let result = AssertUnwindSafe(self.drive(&mut session, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(BookingError::Aborted {
                    reason: "booking workflow panicked".to_string(),
                })
            });
        session.release(self.driver.as_ref()).await;
        result
    }

    async fn drive(
        &self,
        session: &mut AuthenticatedSession,
        request: &BookingRequest,
    ) -> Result<Confirmation, BookingError> {
        let session_id = session.id();
        tracing::debug!(session_id = %session_id, state = %BookingState::Ready, "booking step");
        let page = self.ready(session, request).await?;

        let mut state = BookingState::ConsentCheck;
        loop {
            tracing::debug!(session_id = %session_id, state = %state, "booking step");
            state = match state {
                BookingState::Ready | BookingState::ConsentCheck => {
                    self.accept_terms(page).await?;
                    BookingState::AwaitingBookingForm
                }
                BookingState::AwaitingBookingForm => {
                    match first_match(self.driver.as_ref(), page, &self.policy.submit_strategies)
                        .await
                        .map_err(driver_error)?
                    {
                        Some(strategy) => BookingState::Submitting(strategy.clone()),
                        None => BookingState::Failure(BookingError::ControlNotFound {
                            control: "booking control".to_string(),
                        }),
                    }
                }
                BookingState::Submitting(strategy) => {
                    tracing::info!(session_id = %session_id, strategy = %strategy.name, "submitting booking form");
                    self.driver
                        .click(page, &strategy.locator)
                        .await
                        .map_err(driver_error)?;
                    BookingState::AwaitingOutcome
                }
                BookingState::AwaitingOutcome => match self.observe_outcome(page).await? {
                    Some(signal) => BookingState::Success(Confirmation::generate(signal)),
                    None => BookingState::Failure(BookingError::Ambiguous),
                },
                BookingState::Success(confirmation) => {
                    tracing::info!(
                        session_id = %session_id,
                        confirmation_id = %confirmation.confirmation_id,
                        matched = %confirmation.matched,
                        "booking confirmed"
                    );
                    return Ok(confirmation);
                }
                BookingState::Failure(err) => {
                    tracing::info!(session_id = %session_id, error = %err, "booking failed");
                    return Err(err);
                }
            };
        }
    }

    /// Brings the session's page to the booking form, reusing the login page
    /// when it still answers.
    async fn ready<'s>(
        &self,
        session: &'s mut AuthenticatedSession,
        request: &BookingRequest,
    ) -> Result<&'s PageHandle, BookingError> {
        let target = self.site.booking_url(request);
        let current = match session.page() {
            Some(page) => self.readable_url(page).await?,
            None => None,
        };
        if current.is_none() {
            if let Some(stale) = session.take_page()
                && let Err(e) = self.driver.close_page(stale).await
            {
                tracing::debug!(error = %e, "failed to close unresponsive page");
            }
            let page = self
                .driver
                .open_page(session.browser())
                .await
                .map_err(driver_error)?;
            session.set_page(page);
        }

        let session: &'s AuthenticatedSession = session;
        let page = session
            .page()
            .ok_or_else(|| BookingError::driver("session has no page"))?;
        if current.as_deref() != Some(target.as_str()) {
            self.driver
                .navigate(
                    page,
                    &target,
                    WaitUntil::NetworkIdle,
                    self.policy.navigation_timeout,
                )
                .await
                .map_err(driver_error)?;
        }
        Ok(page)
    }

    async fn readable_url(&self, page: &PageHandle) -> Result<Option<String>, BookingError> {
        let driver = self.driver.as_ref();
        poll_until(self.policy.page_ready, || async move {
            match driver.current_url(page).await {
                Ok(url) if !url.is_empty() => Ok(Some(url)),
                Ok(_) => Ok(None),
                Err(e) => transient(e),
            }
        })
        .await
        .map_err(driver_error)
    }

    async fn accept_terms(&self, page: &PageHandle) -> Result<(), BookingError> {
        let driver = self.driver.as_ref();
        let terms = &self.policy.terms;
        if !driver.exists(page, terms).await.map_err(driver_error)? {
            return Ok(());
        }
        if !driver
            .is_interactable(page, terms)
            .await
            .map_err(driver_error)?
        {
            tracing::warn!(locator = %terms, "terms control is present but cannot be used");
            return Ok(());
        }
        driver
            .activate(page, terms)
            .await
            .map_err(driver_error)?;

        let strategies = &self.policy.submit_strategies;
        let visible = poll_until(self.policy.consent_wait, || async move {
            for strategy in strategies {
                match driver.is_visible(page, &strategy.locator).await {
                    Ok(true) => return Ok(Some(())),
                    Ok(false) => {}
                    Err(e) => return transient(e),
                }
            }
            Ok(None)
        })
        .await
        .map_err(driver_error)?;
        if visible.is_none() {
            tracing::warn!("no booking control became visible after accepting terms");
        }
        Ok(())
    }

    /// Polls for a success URL or success text. `None` means neither showed.
    async fn observe_outcome(&self, page: &PageHandle) -> Result<Option<String>, BookingError> {
        let driver = self.driver.as_ref();
        let policy = &self.policy;
        poll_until(policy.outcome_wait, || async move {
            let url = match driver.current_url(page).await {
                Ok(url) => url.to_lowercase(),
                Err(e) => return transient(e),
            };
            if let Some(pattern) = policy
                .success_url_patterns
                .iter()
                .find(|pattern| url.contains(&pattern.to_lowercase()))
            {
                return Ok(Some(format!("url:{pattern}")));
            }
            let content = match driver.content(page).await {
                Ok(content) => content.to_lowercase(),
                Err(e) => return transient(e),
            };
            Ok(policy
                .success_terms
                .iter()
                .find(|term| content.contains(&term.to_lowercase()))
                .map(|term| format!("text:{term}")))
        })
        .await
        .map_err(driver_error)
    }
}

/// Script and protocol errors happen while a page is mid-navigation; keep
/// polling through them.
fn transient<T>(err: DriverError) -> Result<Option<T>, DriverError> {
    match err {
        DriverError::Script { .. } | DriverError::Protocol { .. } => Ok(None),
        other => Err(other),
    }
}
