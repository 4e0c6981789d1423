//! Login workflow.
//!
//! Launches a fresh browser, opens the resource's booking page (which sends a
//! logged-out visitor to the library's login form), submits the card number
//! and PIN, and decides the result from where the browser lands. On success
//! the browser stays open and moves into the [`SessionRegistry`]; on any
//! other result it is closed before returning.

use crate::error::driver_error;
use crate::session::{AuthenticatedSession, SessionRegistry};
use crate::site::SiteClient;
use chrono::Duration as SessionTtl;
use passbook_automation::{
    AutomationDriver, BrowserHandle, Cookie, DriverError, Locator, PageHandle, PollPolicy,
    WaitUntil, poll_until,
};
use passbook_core::{BookingError, BookingRequest, Credentials, SessionId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Selectors and time bounds for the login form.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub form: Locator,
    pub username: Locator,
    pub password: Locator,
    pub submit: Locator,
    /// Checked in order after a rejected login; the first with text wins.
    pub error_messages: Vec<Locator>,
    pub entry_timeout: Duration,
    /// Pause after the entry page loads, before looking for the form.
    pub settle_delay: Duration,
    pub form_wait: PollPolicy,
    pub redirect_timeout: Duration,
    pub session_ttl: SessionTtl,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            form: Locator::css("#s-libapps-libauth-form"),
            username: Locator::css("#username"),
            password: Locator::css("#password"),
            submit: Locator::css("#s-libapps-login-button"),
            error_messages: [
                ".alert-danger",
                ".error",
                "#form-msg-username",
                "#form-msg-password",
                ".s-lib-form-msg",
            ]
            .into_iter()
            .map(Locator::css)
            .collect(),
            entry_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            form_wait: PollPolicy::millis(250, 10_000),
            redirect_timeout: Duration::from_secs(15),
            session_ttl: SessionTtl::minutes(AuthenticatedSession::DEFAULT_TTL_MINUTES),
        }
    }
}

/// Where a login attempt is.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    NavigatingToEntry,
    WaitingForForm,
    SubmittingCredentials,
    AwaitingRedirect,
    Authenticated(Vec<Cookie>),
    Rejected(String),
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NavigatingToEntry => "navigating_to_entry",
            Self::WaitingForForm => "waiting_for_form",
            Self::SubmittingCredentials => "submitting_credentials",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::Authenticated(_) => "authenticated",
            Self::Rejected(_) => "rejected",
        };
        f.write_str(name)
    }
}

/// Logs in to the booking site.
pub struct AuthWorkflow {
    driver: Arc<dyn AutomationDriver>,
    site: Arc<dyn SiteClient>,
    registry: Arc<SessionRegistry>,
    policy: AuthPolicy,
}

impl AuthWorkflow {
    #[must_use]
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        site: Arc<dyn SiteClient>,
        registry: Arc<SessionRegistry>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            driver,
            site,
            registry,
            policy,
        }
    }

    /// Logs in and registers the resulting session.
    ///
    /// # Errors
    ///
    /// - `AuthRejected` if the site refused the credentials or never showed
    ///   its login form
    /// - `Timeout` if the entry page never settled
    /// - `DriverFailure` if the browser could not be driven
    #[tracing::instrument(skip(self, request, credentials), fields(resource_id = %request.resource_id))]
    pub async fn login(
        &self,
        request: &BookingRequest,
        credentials: &Credentials,
    ) -> Result<SessionId, BookingError> {
        let browser = self
            .driver
            .launch_browser()
            .await
            .map_err(driver_error)?;
        let page = match self.driver.open_page(&browser).await {
            Ok(page) => page,
            Err(e) => {
                self.discard(None, browser).await;
                return Err(driver_error(e));
            }
        };

        match self.authenticate(&page, request, credentials).await {
            Ok(cookies) => {
                let session = AuthenticatedSession::new(
                    credentials.library_card(),
                    cookies,
                    browser,
                    Some(page),
                    self.registry.now(),
                    self.policy.session_ttl,
                );
                Ok(self.registry.insert(session))
            }
            Err(err) => {
                self.discard(Some(page), browser).await;
                Err(err)
            }
        }
    }

    async fn authenticate(
        &self,
        page: &PageHandle,
        request: &BookingRequest,
        credentials: &Credentials,
    ) -> Result<Vec<Cookie>, BookingError> {
        let mut state = AuthState::NavigatingToEntry;
        loop {
            tracing::debug!(resource_id = %request.resource_id, state = %state, "login step");
            state = match state {
                AuthState::NavigatingToEntry => {
                    let url = self.site.booking_entry_url(request);
                    self.driver
                        .navigate(
                            page,
                            &url,
                            WaitUntil::NetworkIdle,
                            self.policy.entry_timeout,
                        )
                        .await
                        .map_err(driver_error)?;
                    tokio::time::sleep(self.policy.settle_delay).await;
                    AuthState::WaitingForForm
                }
                AuthState::WaitingForForm => {
                    if self.wait_for_form(page).await? {
                        AuthState::SubmittingCredentials
                    } else {
                        AuthState::Rejected("login form did not appear".to_string())
                    }
                }
                AuthState::SubmittingCredentials => {
                    self.submit(page, credentials).await?;
                    AuthState::AwaitingRedirect
                }
                AuthState::AwaitingRedirect => {
                    let landed = self
                        .driver
                        .current_url(page)
                        .await
                        .map_err(driver_error)?;
                    if self.site.is_site_url(&landed) {
                        let cookies = self
                            .driver
                            .extract_all_cookies(page)
                            .await
                            .map_err(driver_error)?;
                        AuthState::Authenticated(cookies)
                    } else {
                        AuthState::Rejected(self.rejection_reason(page).await)
                    }
                }
                AuthState::Authenticated(cookies) => {
                    tracing::info!(
                        resource_id = %request.resource_id,
                        cookies = cookies.len(),
                        "login succeeded"
                    );
                    return Ok(cookies);
                }
                AuthState::Rejected(reason) => {
                    tracing::info!(resource_id = %request.resource_id, reason = %reason, "login rejected");
                    return Err(BookingError::AuthRejected { reason });
                }
            };
        }
    }

    async fn wait_for_form(&self, page: &PageHandle) -> Result<bool, BookingError> {
        let driver = self.driver.as_ref();
        let form = &self.policy.form;
        let found = poll_until(self.policy.form_wait, || async move {
            driver
                .exists(page, form)
                .await
                .map(|present| present.then_some(()))
        })
        .await
        .map_err(driver_error)?;
        Ok(found.is_some())
    }

    async fn submit(
        &self,
        page: &PageHandle,
        credentials: &Credentials,
    ) -> Result<(), BookingError> {
        let driver = self.driver.as_ref();
        driver
            .fill(page, &self.policy.username, credentials.library_card())
            .await
            .map_err(driver_error)?;
        driver
            .fill(page, &self.policy.password, credentials.pin())
            .await
            .map_err(driver_error)?;
        let before = driver
            .current_url(page)
            .await
            .map_err(driver_error)?;
        driver
            .click(page, &self.policy.submit)
            .await
            .map_err(driver_error)?;
        match driver
            .wait_for_navigation(page, &before, self.policy.redirect_timeout)
            .await
        {
            // A rejected login can re-render in place; the redirect check decides.
            Ok(()) | Err(DriverError::Timeout { .. }) => Ok(()),
            Err(e) => Err(driver_error(e)),
        }
    }

    async fn rejection_reason(&self, page: &PageHandle) -> String {
        for locator in &self.policy.error_messages {
            match self.driver.text_of(page, locator).await {
                Ok(Some(text)) if !text.trim().is_empty() => return text.trim().to_string(),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(locator = %locator, error = %e, "error message lookup failed");
                }
            }
        }
        "login failed".to_string()
    }

    async fn discard(&self, page: Option<PageHandle>, browser: BrowserHandle) {
        if let Some(page) = page
            && let Err(e) = self.driver.close_page(page).await
        {
            tracing::warn!(error = %e, "failed to close login page");
        }
        if let Err(e) = self.driver.close_browser(browser).await {
            tracing::warn!(error = %e, "failed to close login browser");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::LibCalSite;
    use crate::testing::{FakeDriver, LOGIN_URL, SiteScript};
    use chrono::{NaiveDate, Utc};
    use passbook_scheduler::FixedClock;

    struct Fixture {
        driver: Arc<FakeDriver>,
        registry: Arc<SessionRegistry>,
        workflow: AuthWorkflow,
    }

    fn fixture(script: SiteScript) -> Fixture {
        let driver = Arc::new(FakeDriver::new(script));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = Arc::new(SessionRegistry::new(driver.clone(), clock));
        let site = Arc::new(LibCalSite::new(LibCalSite::DEFAULT_BASE_URL).expect("site"));
        let policy = AuthPolicy {
            settle_delay: Duration::ZERO,
            form_wait: PollPolicy::millis(1, 5),
            ..AuthPolicy::default()
        };
        let workflow = AuthWorkflow::new(driver.clone(), site, registry.clone(), policy);
        Fixture {
            driver,
            registry,
            workflow,
        }
    }

    fn request() -> BookingRequest {
        BookingRequest::new(
            "7521",
            NaiveDate::from_ymd_opt(2025, 12, 1).expect("valid date"),
            "1234",
        )
    }

    fn credentials() -> Credentials {
        Credentials::new("1234567890", "4321")
    }

    #[tokio::test]
    async fn successful_login_registers_open_session() {
        let f = fixture(SiteScript::default());

        let id = f
            .workflow
            .login(&request(), &credentials())
            .await
            .expect("login");

        assert!(f.registry.contains(id));
        assert_eq!(f.driver.open_browsers(), 1);
        assert_eq!(f.driver.open_pages(), 1);
        assert_eq!(
            f.driver.fills(),
            vec![
                (Locator::css("#username"), "1234567890".to_string()),
                (Locator::css("#password"), "4321".to_string()),
            ]
        );
        assert_eq!(
            f.driver.navigations(),
            vec![
                "https://rooms.kcls.org/passes/7521/book?digital=true&physical=false&location=0&date=2025-12-01"
                    .to_string()
            ]
        );

        let session = f.registry.checkout(id).await.expect("checkout");
        assert_eq!(session.owner_card(), "1234567890");
        assert_eq!(session.cookies().len(), 1);
        assert!(session.page().is_some());
        session.release(f.driver.as_ref()).await;
    }

    #[tokio::test]
    async fn rejected_login_reports_first_error_message() {
        let mut script = SiteScript {
            accept_login: false,
            ..SiteScript::default()
        };
        script.login_errors.insert(
            Locator::css("#form-msg-password"),
            "  Invalid PIN  ".to_string(),
        );
        script
            .login_errors
            .insert(Locator::css(".s-lib-form-msg"), "Try again".to_string());
        let f = fixture(script);

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BookingError::AuthRejected {
                reason: "Invalid PIN".to_string()
            }
        );
        assert!(f.registry.is_empty());
        assert_eq!(f.driver.open_browsers(), 0);
        assert_eq!(f.driver.closed_browsers(), 1);
    }

    #[tokio::test]
    async fn rejection_without_message_uses_default_reason() {
        let f = fixture(SiteScript {
            accept_login: false,
            ..SiteScript::default()
        });

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "login rejected: login failed");
        assert_eq!(f.driver.open_browsers(), 0);
    }

    #[tokio::test]
    async fn missing_form_is_rejection() {
        let f = fixture(SiteScript {
            login_elements: Vec::new(),
            ..SiteScript::default()
        });

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BookingError::AuthRejected {
                reason: "login form did not appear".to_string()
            }
        );
        assert!(f.driver.fills().is_empty());
        assert_eq!(f.driver.open_browsers(), 0);
    }

    #[tokio::test]
    async fn missing_input_is_driver_failure_and_cleans_up() {
        let f = fixture(SiteScript {
            login_elements: vec![Locator::css("#s-libapps-libauth-form")],
            ..SiteScript::default()
        });

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert!(matches!(err, BookingError::DriverFailure { .. }));
        assert_eq!(f.driver.open_browsers(), 0);
        assert_eq!(f.driver.open_pages(), 0);
    }

    #[tokio::test]
    async fn launch_failure_is_driver_failure() {
        let f = fixture(SiteScript {
            fail_launch: true,
            ..SiteScript::default()
        });

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "browser automation failed: browser launch failed: no such file or directory"
        );
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn stalled_entry_page_is_timeout() {
        let f = fixture(SiteScript {
            stall_navigation: true,
            ..SiteScript::default()
        });

        let err = f
            .workflow
            .login(&request(), &credentials())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BookingError::Timeout {
                operation: "network idle".to_string()
            }
        );
        assert_eq!(err.to_string(), "timed out waiting for network idle");
        assert!(f.driver.fills().is_empty());
        assert_eq!(f.driver.open_browsers(), 0);
        assert_eq!(f.driver.closed_browsers(), 1);
    }

    #[test]
    fn login_page_is_off_site() {
        let site = LibCalSite::new(LibCalSite::DEFAULT_BASE_URL).expect("site");
        assert!(!site.is_site_url(LOGIN_URL));
    }

    #[test]
    fn state_names() {
        assert_eq!(AuthState::WaitingForForm.to_string(), "waiting_for_form");
        assert_eq!(AuthState::Rejected(String::new()).to_string(), "rejected");
    }
}
