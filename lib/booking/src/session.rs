//! Authenticated browser sessions.
//!
//! An [`AuthenticatedSession`] owns the browser the login ran in. The
//! [`SessionRegistry`] holds sessions between the login and booking steps;
//! taking one out with [`SessionRegistry::checkout`] transfers ownership, so
//! exactly one holder can release it.

use chrono::{DateTime, Duration, Utc};
use passbook_automation::{AutomationDriver, BrowserHandle, Cookie, PageHandle};
use passbook_core::{BookingError, SessionId};
use passbook_scheduler::Clock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A logged-in browser and the page the login finished on.
pub struct AuthenticatedSession {
    id: SessionId,
    owner_card: String,
    cookies: Vec<Cookie>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    browser: BrowserHandle,
    page: Option<PageHandle>,
}

impl AuthenticatedSession {
    /// Default lifetime of a session.
    pub const DEFAULT_TTL_MINUTES: i64 = 120;

    #[must_use]
    pub fn new(
        owner_card: impl Into<String>,
        cookies: Vec<Cookie>,
        browser: BrowserHandle,
        page: Option<PageHandle>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: SessionId::new(),
            owner_card: owner_card.into(),
            cookies,
            created_at,
            expires_at: created_at + ttl,
            browser,
            page,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Library card the session was opened with.
    #[must_use]
    pub fn owner_card(&self) -> &str {
        &self.owner_card
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn browser(&self) -> &BrowserHandle {
        &self.browser
    }

    #[must_use]
    pub fn page(&self) -> Option<&PageHandle> {
        self.page.as_ref()
    }

    /// Removes the page from the session, leaving it to the caller to close.
    pub fn take_page(&mut self) -> Option<PageHandle> {
        self.page.take()
    }

    /// Hands a page to the session. Any page already held is returned.
    pub fn set_page(&mut self, page: PageHandle) -> Option<PageHandle> {
        self.page.replace(page)
    }

    /// Closes the page, then the browser. Failures are traced and ignored:
    /// the handles are gone either way.
    pub async fn release<D>(self, driver: &D)
    where
        D: AutomationDriver + ?Sized,
    {
        let Self {
            id, browser, page, ..
        } = self;
        if let Some(page) = page
            && let Err(e) = driver.close_page(page).await
        {
            tracing::warn!(session_id = %id, error = %e, "failed to close session page");
        }
        if let Err(e) = driver.close_browser(browser).await {
            tracing::warn!(session_id = %id, error = %e, "failed to close session browser");
        }
        tracing::debug!(session_id = %id, "session released");
    }
}

impl fmt::Debug for AuthenticatedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedSession")
            .field("id", &self.id)
            .field("cookies", &self.cookies.len())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("browser", &self.browser)
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

/// Live sessions keyed by id.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, AuthenticatedSession>>,
    driver: Arc<dyn AutomationDriver>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(driver: Arc<dyn AutomationDriver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            driver,
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, AuthenticatedSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current time on the registry's clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stores a session and returns its id.
    pub fn insert(&self, session: AuthenticatedSession) -> SessionId {
        let id = session.id();
        tracing::debug!(session_id = %id, expires_at = %session.expires_at(), "session registered");
        self.lock().insert(id, session);
        id
    }

    /// Takes a live session out of the registry.
    ///
    /// # Errors
    ///
    /// Returns `SessionExpired` if the id is unknown or the session is past
    /// its expiry. An expired session is released before returning.
    pub async fn checkout(&self, id: SessionId) -> Result<AuthenticatedSession, BookingError> {
        let session = self.lock().remove(&id).ok_or(BookingError::SessionExpired)?;
        if session.is_expired_at(self.clock.now()) {
            tracing::info!(session_id = %id, "session expired before use");
            session.release(self.driver.as_ref()).await;
            return Err(BookingError::SessionExpired);
        }
        Ok(session)
    }

    /// Whether a session is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Releases every expired session. Returns how many were released.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<AuthenticatedSession> = {
            let mut sessions = self.lock();
            let ids: Vec<SessionId> = sessions
                .values()
                .filter(|session| session.is_expired_at(now))
                .map(AuthenticatedSession::id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        let count = expired.len();
        for session in expired {
            session.release(self.driver.as_ref()).await;
        }
        if count > 0 {
            tracing::info!(count, "released expired sessions");
        }
        count
    }

    /// Releases every session, expired or not.
    pub async fn release_all(&self) -> usize {
        let sessions: Vec<AuthenticatedSession> =
            self.lock().drain().map(|(_, session)| session).collect();
        let count = sessions.len();
        for session in sessions {
            session.release(self.driver.as_ref()).await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, SiteScript};
    use passbook_scheduler::FixedClock;

    struct Fixture {
        driver: Arc<FakeDriver>,
        clock: Arc<FixedClock>,
        registry: SessionRegistry,
    }

    fn fixture() -> Fixture {
        let driver = Arc::new(FakeDriver::new(SiteScript::default()));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let registry = SessionRegistry::new(driver.clone(), clock.clone());
        Fixture {
            driver,
            clock,
            registry,
        }
    }

    async fn session(f: &Fixture) -> AuthenticatedSession {
        let browser = f.driver.launch_browser().await.expect("launch");
        let page = f.driver.open_page(&browser).await.expect("page");
        AuthenticatedSession::new(
            "1234567890",
            Vec::new(),
            browser,
            Some(page),
            f.clock.now(),
            Duration::minutes(AuthenticatedSession::DEFAULT_TTL_MINUTES),
        )
    }

    #[tokio::test]
    async fn checkout_transfers_ownership() {
        let f = fixture();
        let id = f.registry.insert(session(&f).await);
        assert!(f.registry.contains(id));

        let session = f.registry.checkout(id).await.expect("checkout");
        assert_eq!(session.id(), id);
        assert!(f.registry.is_empty());
        assert_eq!(
            f.registry.checkout(id).await.unwrap_err(),
            BookingError::SessionExpired
        );

        session.release(f.driver.as_ref()).await;
        assert_eq!(f.driver.open_browsers(), 0);
        assert_eq!(f.driver.closed_pages(), 1);
        assert_eq!(f.driver.closed_browsers(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_expired() {
        let f = fixture();
        assert_eq!(
            f.registry.checkout(SessionId::new()).await.unwrap_err(),
            BookingError::SessionExpired
        );
        assert_eq!(f.driver.launches(), 0);
    }

    #[tokio::test]
    async fn expired_session_is_released_on_checkout() {
        let f = fixture();
        let id = f.registry.insert(session(&f).await);
        f.clock.advance(Duration::minutes(121));

        assert_eq!(
            f.registry.checkout(id).await.unwrap_err(),
            BookingError::SessionExpired
        );
        assert!(f.registry.is_empty());
        assert_eq!(f.driver.open_browsers(), 0);
    }

    #[tokio::test]
    async fn sweep_releases_only_expired() {
        let f = fixture();
        let old = f.registry.insert(session(&f).await);
        f.clock.advance(Duration::minutes(90));
        let fresh = f.registry.insert(session(&f).await);
        f.clock.advance(Duration::minutes(31));

        assert_eq!(f.registry.sweep_expired().await, 1);
        assert!(!f.registry.contains(old));
        assert!(f.registry.contains(fresh));
        assert_eq!(f.driver.open_browsers(), 1);

        assert_eq!(f.registry.release_all().await, 1);
        assert_eq!(f.driver.open_browsers(), 0);
    }

    #[tokio::test]
    async fn release_without_page_closes_browser() {
        let f = fixture();
        let mut session = session(&f).await;
        let page = session.take_page().expect("page");
        f.driver.close_page(page).await.expect("close page");

        session.release(f.driver.as_ref()).await;
        assert_eq!(f.driver.closed_pages(), 1);
        assert_eq!(f.driver.closed_browsers(), 1);
    }

    #[test]
    fn debug_hides_cookie_values() {
        let session = AuthenticatedSession::new(
            "1234567890",
            vec![Cookie {
                name: "lc_session".to_string(),
                value: "secret-cookie".to_string(),
                domain: "rooms.kcls.org".to_string(),
                path: "/".to_string(),
                expires: -1.0,
                http_only: true,
                secure: true,
            }],
            BrowserHandle::new("b1"),
            None,
            Utc::now(),
            Duration::minutes(5),
        );
        let debug = format!("{session:?}");
        assert!(!debug.contains("secret-cookie"));
        assert!(!debug.contains("1234567890"));
    }
}
