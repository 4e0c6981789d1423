//! A scripted in-memory browser for exercising the workflows.
//!
//! [`FakeDriver`] models a booking site with one login page and one booking
//! page. Navigating to the site while logged out lands on the login page;
//! submitting the login form either returns to the requested page or stays
//! put with an error message, depending on the script.

use async_trait::async_trait;
use passbook_automation::{
    AutomationDriver, BrowserHandle, Cookie, DriverError, Locator, PageHandle, WaitUntil,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

pub const SITE_ORIGIN: &str = "https://rooms.kcls.org";
pub const LOGIN_URL: &str = "https://kcls.libapps.com/libapps/libauth?auth_id=1963";

/// What the booking page does when its submit control is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Redirects to this URL.
    Redirect(String),
    /// Re-renders with this text in the page.
    Render(String),
    /// Nothing recognizable happens.
    Nothing,
}

/// How the fake site behaves.
#[derive(Debug, Clone)]
pub struct SiteScript {
    /// Login page elements.
    pub login_elements: Vec<Locator>,
    /// The login submit control.
    pub login_submit: Locator,
    /// Whether submitted credentials are accepted.
    pub accept_login: bool,
    /// Messages shown after a rejected login, by locator.
    pub login_errors: HashMap<Locator, String>,
    /// Booking page elements.
    pub booking_elements: Vec<Locator>,
    /// Terms control that gates the submit control's visibility, if any.
    pub terms: Option<Locator>,
    /// Whether the terms control can be used; a disabled one still exists.
    pub terms_enabled: bool,
    /// Result of clicking any booking element.
    pub submit_outcome: SubmitOutcome,
    /// Fail every browser launch.
    pub fail_launch: bool,
    /// Navigations never settle and time out.
    pub stall_navigation: bool,
    /// Panic when a booking element is clicked.
    pub panic_on_submit: bool,
}

impl Default for SiteScript {
    /// A site that accepts the login and has a form with no controls.
    fn default() -> Self {
        Self {
            login_elements: [
                "#s-libapps-libauth-form",
                "#username",
                "#password",
                "#s-libapps-login-button",
            ]
            .into_iter()
            .map(Locator::css)
            .collect(),
            login_submit: Locator::css("#s-libapps-login-button"),
            accept_login: true,
            login_errors: HashMap::new(),
            booking_elements: Vec::new(),
            terms: None,
            terms_enabled: true,
            submit_outcome: SubmitOutcome::Nothing,
            fail_launch: false,
            stall_navigation: false,
            panic_on_submit: false,
        }
    }
}

#[derive(Debug)]
struct FakePage {
    browser: String,
    url: String,
    content: String,
    return_to: Option<String>,
    login_attempted: bool,
    terms_accepted: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    logged_in: HashSet<String>,
    browsers: HashSet<String>,
    pages: HashMap<String, FakePage>,
    launches: usize,
    pages_opened: usize,
    navigations: Vec<String>,
    fills: Vec<(Locator, String)>,
    clicks: Vec<Locator>,
    activations: Vec<Locator>,
    closed_pages: usize,
    closed_browsers: usize,
}

impl FakeState {
    fn page(&mut self, page: &PageHandle) -> Result<&mut FakePage, DriverError> {
        self.pages
            .get_mut(page.id())
            .ok_or_else(|| DriverError::UnknownHandle {
                id: page.id().to_string(),
            })
    }

    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// An [`AutomationDriver`] backed by a [`SiteScript`].
#[derive(Debug)]
pub struct FakeDriver {
    script: Mutex<SiteScript>,
    state: Mutex<FakeState>,
}

impl FakeDriver {
    #[must_use]
    pub fn new(script: SiteScript) -> Self {
        Self {
            script: Mutex::new(script),
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Replaces the script for subsequent calls.
    pub fn set_script(&self, script: SiteScript) {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
    }

    fn script(&self) -> SiteScript {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    #[must_use]
    pub fn launches(&self) -> usize {
        self.with_state(|s| s.launches)
    }

    #[must_use]
    pub fn pages_opened(&self) -> usize {
        self.with_state(|s| s.pages_opened)
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.with_state(|s| s.navigations.clone())
    }

    #[must_use]
    pub fn fills(&self) -> Vec<(Locator, String)> {
        self.with_state(|s| s.fills.clone())
    }

    #[must_use]
    pub fn clicks(&self) -> Vec<Locator> {
        self.with_state(|s| s.clicks.clone())
    }

    #[must_use]
    pub fn activations(&self) -> Vec<Locator> {
        self.with_state(|s| s.activations.clone())
    }

    #[must_use]
    pub fn open_browsers(&self) -> usize {
        self.with_state(|s| s.browsers.len())
    }

    #[must_use]
    pub fn open_pages(&self) -> usize {
        self.with_state(|s| s.pages.len())
    }

    #[must_use]
    pub fn closed_pages(&self) -> usize {
        self.with_state(|s| s.closed_pages)
    }

    #[must_use]
    pub fn closed_browsers(&self) -> usize {
        self.with_state(|s| s.closed_browsers)
    }

    /// Elements present on the page's current document.
    fn elements(script: &SiteScript, page: &FakePage) -> Vec<Locator> {
        if page.url.starts_with(LOGIN_URL) {
            let mut elements = script.login_elements.clone();
            if page.login_attempted {
                elements.extend(script.login_errors.keys().cloned());
            }
            elements
        } else if page.url.starts_with(SITE_ORIGIN) {
            let mut elements = script.booking_elements.clone();
            elements.extend(script.terms.iter().cloned());
            elements
        } else {
            Vec::new()
        }
    }
}

#[async_trait]
impl AutomationDriver for FakeDriver {
    async fn launch_browser(&self) -> Result<BrowserHandle, DriverError> {
        if self.script().fail_launch {
            return Err(DriverError::Launch {
                reason: "no such file or directory".to_string(),
            });
        }
        Ok(self.with_state(|s| {
            s.launches += 1;
            let id = s.allocate("browser");
            s.browsers.insert(id.clone());
            BrowserHandle::new(id)
        }))
    }

    async fn open_page(&self, browser: &BrowserHandle) -> Result<PageHandle, DriverError> {
        self.with_state(|s| {
            if !s.browsers.contains(browser.id()) {
                return Err(DriverError::UnknownHandle {
                    id: browser.id().to_string(),
                });
            }
            s.pages_opened += 1;
            let id = s.allocate("page");
            s.pages.insert(
                id.clone(),
                FakePage {
                    browser: browser.id().to_string(),
                    url: "about:blank".to_string(),
                    content: String::new(),
                    return_to: None,
                    login_attempted: false,
                    terms_accepted: false,
                },
            );
            Ok(PageHandle::new(id, browser.id()))
        })
    }

    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        _wait: WaitUntil,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        let stall = self.script().stall_navigation;
        self.with_state(|s| {
            s.navigations.push(url.to_string());
            if stall {
                return Err(DriverError::Timeout {
                    operation: "network idle".to_string(),
                });
            }
            let logged_in = s.logged_in.contains(page.browser_id());
            let fake = s.page(page)?;
            fake.content = String::new();
            fake.terms_accepted = false;
            if url.starts_with(SITE_ORIGIN) && !logged_in {
                fake.url = LOGIN_URL.to_string();
                fake.return_to = Some(url.to_string());
                fake.login_attempted = false;
            } else {
                fake.url = url.to_string();
            }
            Ok(())
        })
    }

    async fn wait_for_navigation(
        &self,
        page: &PageHandle,
        from_url: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        self.with_state(|s| {
            if s.page(page)?.url == from_url {
                Err(DriverError::Timeout {
                    operation: "navigation".to_string(),
                })
            } else {
                Ok(())
            }
        })
    }

    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError> {
        self.with_state(|s| Ok(s.page(page)?.url.clone()))
    }

    async fn fill(
        &self,
        page: &PageHandle,
        locator: &Locator,
        value: &str,
    ) -> Result<(), DriverError> {
        let script = self.script();
        self.with_state(|s| {
            if !Self::elements(&script, s.page(page)?).contains(locator) {
                return Err(DriverError::ElementNotFound {
                    locator: locator.to_string(),
                });
            }
            s.fills.push((locator.clone(), value.to_string()));
            Ok(())
        })
    }

    async fn click(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError> {
        let script = self.script();
        let on_booking_page = self.with_state(|s| {
            let fake = s.page(page)?;
            if !Self::elements(&script, fake).contains(locator) {
                return Err(DriverError::ElementNotFound {
                    locator: locator.to_string(),
                });
            }
            let on_booking_page = script.booking_elements.contains(locator);
            s.clicks.push(locator.clone());
            Ok(on_booking_page)
        })?;
        if on_booking_page && script.panic_on_submit {
            panic!("scripted panic on submit");
        }
        self.with_state(|s| {
            if *locator == script.login_submit {
                if script.accept_login {
                    s.logged_in.insert(page.browser_id().to_string());
                    let fake = s.page(page)?;
                    fake.url = fake
                        .return_to
                        .take()
                        .unwrap_or_else(|| format!("{SITE_ORIGIN}/"));
                } else {
                    s.page(page)?.login_attempted = true;
                }
            } else if on_booking_page {
                let fake = s.page(page)?;
                match &script.submit_outcome {
                    SubmitOutcome::Redirect(url) => fake.url.clone_from(url),
                    SubmitOutcome::Render(text) => fake.content.clone_from(text),
                    SubmitOutcome::Nothing => {}
                }
            }
            Ok(())
        })
    }

    async fn activate(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError> {
        let script = self.script();
        self.with_state(|s| {
            let fake = s.page(page)?;
            if !Self::elements(&script, fake).contains(locator) {
                return Err(DriverError::ElementNotFound {
                    locator: locator.to_string(),
                });
            }
            if script.terms.as_ref() == Some(locator) {
                fake.terms_accepted = true;
            }
            s.activations.push(locator.clone());
            Ok(())
        })
    }

    async fn exists(&self, page: &PageHandle, locator: &Locator) -> Result<bool, DriverError> {
        let script = self.script();
        self.with_state(|s| Ok(Self::elements(&script, s.page(page)?).contains(locator)))
    }

    async fn is_visible(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<bool, DriverError> {
        let script = self.script();
        self.with_state(|s| {
            let fake = s.page(page)?;
            let gated = script.terms.is_some()
                && !fake.terms_accepted
                && script.booking_elements.contains(locator);
            Ok(!gated && Self::elements(&script, fake).contains(locator))
        })
    }

    async fn is_interactable(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<bool, DriverError> {
        let script = self.script();
        if script.terms.as_ref() == Some(locator) && !script.terms_enabled {
            return Ok(false);
        }
        self.is_visible(page, locator).await
    }

    async fn text_of(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<Option<String>, DriverError> {
        let script = self.script();
        self.with_state(|s| {
            let fake = s.page(page)?;
            if Self::elements(&script, fake).contains(locator) {
                Ok(script.login_errors.get(locator).cloned())
            } else {
                Ok(None)
            }
        })
    }

    async fn content(&self, page: &PageHandle) -> Result<String, DriverError> {
        self.with_state(|s| Ok(s.page(page)?.content.clone()))
    }

    async fn extract_all_cookies(&self, page: &PageHandle) -> Result<Vec<Cookie>, DriverError> {
        self.with_state(|s| {
            s.page(page)?;
            let cookies = if s.logged_in.contains(page.browser_id()) {
                vec![Cookie {
                    name: "lc_session".to_string(),
                    value: "opaque".to_string(),
                    domain: "rooms.kcls.org".to_string(),
                    path: "/".to_string(),
                    expires: -1.0,
                    http_only: true,
                    secure: true,
                }]
            } else {
                Vec::new()
            };
            Ok(cookies)
        })
    }

    async fn close_page(&self, page: PageHandle) -> Result<(), DriverError> {
        self.with_state(|s| {
            s.pages
                .remove(page.id())
                .ok_or_else(|| DriverError::UnknownHandle {
                    id: page.id().to_string(),
                })?;
            s.closed_pages += 1;
            Ok(())
        })
    }

    async fn close_browser(&self, browser: BrowserHandle) -> Result<(), DriverError> {
        self.with_state(|s| {
            if !s.browsers.remove(browser.id()) {
                return Err(DriverError::UnknownHandle {
                    id: browser.id().to_string(),
                });
            }
            s.pages.retain(|_, page| page.browser != browser.id());
            s.logged_in.remove(browser.id());
            s.closed_browsers += 1;
            Ok(())
        })
    }
}
