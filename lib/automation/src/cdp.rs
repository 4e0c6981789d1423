//! Chrome DevTools Protocol driver.
//!
//! Each [`CdpDriver::launch_browser`] call starts its own Chrome process with
//! a throwaway profile, discovers the DevTools websocket through the
//! `/json/version` endpoint and keeps one multiplexed connection to it. Pages
//! are attached targets addressed by their flattened session id.

use crate::driver::{AutomationDriver, BrowserHandle, Cookie, PageHandle, WaitUntil};
use crate::error::DriverError;
use crate::locator::Locator;
use crate::poll::{PollPolicy, poll_until};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// Flags passed to every launched browser.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-first-run",
    "--no-default-browser-check",
];

/// Installed on every new document so the page cannot see the automation flag.
const MASK_WEBDRIVER: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

const DOCUMENT_STATE: &str = "({ href: location.href, readyState: document.readyState, timeOrigin: performance.timeOrigin })";

const RESOURCE_COUNT: &str = "performance.getEntriesByType('resource').length";

const LOAD_PROBE: Duration = Duration::from_millis(100);
const IDLE_PROBE: Duration = Duration::from_millis(250);
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// How browsers are launched.
#[derive(Debug, Clone)]
pub struct CdpConfig {
    /// Chrome or Chromium binary.
    pub executable: PathBuf,
    /// Run without a window.
    pub headless: bool,
    /// Maximum time for the DevTools endpoint to come up.
    pub launch_timeout: Duration,
    /// Maximum time for any single protocol command.
    pub command_timeout: Duration,
    /// Page viewport (width, height).
    pub viewport: (u32, u32),
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("chromium"),
            headless: true,
            launch_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            viewport: (1280, 720),
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One websocket to a browser, shared by the browser and all its pages.
#[derive(Clone)]
struct Connection {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    next_id: Arc<AtomicU64>,
    command_timeout: Duration,
}

impl Connection {
    async fn open(ws_url: &str, command_timeout: Duration) -> Result<Self, DriverError> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| DriverError::Connection {
                reason: e.to_string(),
            })?;
        let (mut sink, mut source) = stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<Message>();
        let pending: Pending = Arc::default();

        tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                if let Err(e) = sink.send(message).await {
                    tracing::debug!(error = %e, "devtools writer stopped");
                    break;
                }
            }
        });

        let replies = pending.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => dispatch(&replies, &text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "devtools reader stopped");
                        break;
                    }
                }
            }
            // Dropping the senders fails every in-flight call.
            lock(&replies).clear();
        });

        Ok(Self {
            outgoing,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            command_timeout,
        })
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        session: Option<&str>,
    ) -> Result<Value, DriverError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session {
            message["sessionId"] = Value::String(session.to_string());
        }

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        if self
            .outgoing
            .send(Message::Text(message.to_string().into()))
            .is_err()
        {
            lock(&self.pending).remove(&id);
            return Err(DriverError::Connection {
                reason: format!("connection closed before {method}"),
            });
        }

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(DriverError::Protocol {
                method: method.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(DriverError::Connection {
                reason: format!("connection closed during {method}"),
            }),
            Err(_) => {
                lock(&self.pending).remove(&id);
                Err(DriverError::Timeout {
                    operation: method.to_string(),
                })
            }
        }
    }
}

/// Routes a command reply to its waiting caller. Events are ignored.
fn dispatch(pending: &Pending, text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        return;
    };
    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        return;
    };
    let Some(tx) = lock(pending).remove(&id) else {
        return;
    };
    let reply = match frame.get("error") {
        Some(error) => Err(error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown protocol error")
            .to_string()),
        None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
    };
    let _ = tx.send(reply);
}

struct Browser {
    connection: Connection,
    process: tokio::sync::Mutex<Child>,
    _profile: TempDir,
}

struct Page {
    browser_id: String,
    target_id: String,
    session_id: String,
    connection: Connection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    web_socket_debugger_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentState {
    href: String,
    ready_state: String,
    time_origin: f64,
}

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

/// [`AutomationDriver`] over a locally launched Chrome.
pub struct CdpDriver {
    config: CdpConfig,
    http: reqwest::Client,
    next_handle: AtomicU64,
    browsers: Mutex<HashMap<String, Arc<Browser>>>,
    pages: Mutex<HashMap<String, Arc<Page>>>,
}

impl CdpDriver {
    /// Creates a driver; no browser is started until `launch_browser`.
    #[must_use]
    pub fn new(config: CdpConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            next_handle: AtomicU64::new(1),
            browsers: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Number of browsers currently open.
    #[must_use]
    pub fn open_browsers(&self) -> usize {
        lock(&self.browsers).len()
    }

    fn launch_command(&self, port: u16, profile: &TempDir) -> Command {
        let (width, height) = self.config.viewport;
        let mut command = Command::new(&self.config.executable);
        command
            .args(LAUNCH_ARGS)
            .arg(format!("--remote-debugging-port={port}"))
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg(format!("--window-size={width},{height}"));
        if self.config.headless {
            command.arg("--headless=new");
        }
        command
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn discover(&self, port: u16) -> Result<Option<String>, DriverError> {
        let endpoint = format!("http://127.0.0.1:{port}/json/version");
        let http = &self.http;
        let endpoint = &endpoint;
        poll_until(
            PollPolicy::new(LOAD_PROBE, self.config.launch_timeout),
            || async move {
                let Ok(response) = http.get(endpoint.as_str()).send().await else {
                    return Ok(None);
                };
                Ok(response
                    .json::<VersionInfo>()
                    .await
                    .ok()
                    .map(|info| info.web_socket_debugger_url))
            },
        )
        .await
    }

    fn browser(&self, id: &str) -> Result<Arc<Browser>, DriverError> {
        lock(&self.browsers)
            .get(id)
            .cloned()
            .ok_or_else(|| DriverError::UnknownHandle { id: id.to_string() })
    }

    fn page(&self, handle: &PageHandle) -> Result<Arc<Page>, DriverError> {
        lock(&self.pages)
            .get(handle.id())
            .cloned()
            .ok_or_else(|| DriverError::UnknownHandle {
                id: handle.id().to_string(),
            })
    }

    async fn page_call(
        &self,
        handle: &PageHandle,
        method: &str,
        params: Value,
    ) -> Result<Value, DriverError> {
        let page = self.page(handle)?;
        page.connection
            .call(method, params, Some(&page.session_id))
            .await
    }

    async fn evaluate(&self, handle: &PageHandle, expression: &str) -> Result<Value, DriverError> {
        let reply = self
            .page_call(
                handle,
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true, "awaitPromise": true }),
            )
            .await?;
        if let Some(details) = reply.get("exceptionDetails") {
            let message = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception")
                .to_string();
            return Err(DriverError::Script { message });
        }
        Ok(reply.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Current document state, or `None` while the execution context is being
    /// replaced by a navigation.
    async fn document_state(
        &self,
        handle: &PageHandle,
    ) -> Result<Option<DocumentState>, DriverError> {
        match self.evaluate(handle, DOCUMENT_STATE).await {
            Ok(value) => Ok(serde_json::from_value(value).ok()),
            Err(DriverError::Script { .. } | DriverError::Protocol { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn wait_for_network_idle(
        &self,
        handle: &PageHandle,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        let mut window = QuietWindow::new(Instant::now());
        loop {
            let count = match self.evaluate(handle, RESOURCE_COUNT).await {
                Ok(value) => Some(value.as_u64().unwrap_or_default()),
                // The execution context is being replaced by a redirect.
                Err(DriverError::Script { .. } | DriverError::Protocol { .. }) => None,
                Err(e) => return Err(e),
            };
            let now = Instant::now();
            if window.observe(count, now) {
                return Ok(());
            }
            if now >= deadline {
                return Err(DriverError::Timeout {
                    operation: "network idle".to_string(),
                });
            }
            tokio::time::sleep(IDLE_PROBE).await;
        }
    }

    /// Evaluates `body` with `el` bound to the locator's first match.
    async fn with_element(
        &self,
        handle: &PageHandle,
        locator: &Locator,
        body: &str,
    ) -> Result<Value, DriverError> {
        let script = format!("(() => {{ const el = {}; {body} }})()", locator.to_js());
        self.evaluate(handle, &script).await
    }

    async fn require_element(
        &self,
        handle: &PageHandle,
        locator: &Locator,
        body: &str,
    ) -> Result<(), DriverError> {
        match self.with_element(handle, locator, body).await? {
            Value::Bool(true) => Ok(()),
            _ => Err(DriverError::ElementNotFound {
                locator: locator.to_string(),
            }),
        }
    }
}

/// How long a page's resource count has held still.
#[derive(Debug)]
struct QuietWindow {
    last: Option<u64>,
    since: Instant,
}

impl QuietWindow {
    fn new(now: Instant) -> Self {
        Self { last: None, since: now }
    }

    /// Records one probe; `None` is a page that could not be read. Returns
    /// `true` once the count has been unchanged for [`NETWORK_QUIET`].
    fn observe(&mut self, count: Option<u64>, now: Instant) -> bool {
        match count {
            Some(count) if self.last == Some(count) => now - self.since >= NETWORK_QUIET,
            other => {
                self.last = other;
                self.since = now;
                false
            }
        }
    }
}

async fn free_port() -> Result<u16, DriverError> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| DriverError::Launch {
            reason: format!("no free debugging port: {e}"),
        })?;
    listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| DriverError::Launch {
            reason: format!("no free debugging port: {e}"),
        })
}

fn string_field(reply: &Value, field: &str, method: &str) -> Result<String, DriverError> {
    reply
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol {
            method: method.to_string(),
            message: format!("reply is missing {field}"),
        })
}

#[async_trait]
impl AutomationDriver for CdpDriver {
    async fn launch_browser(&self) -> Result<BrowserHandle, DriverError> {
        let port = free_port().await?;
        let profile = tempfile::Builder::new()
            .prefix("passbook-chrome-")
            .tempdir()
            .map_err(|e| DriverError::Launch {
                reason: format!("profile directory: {e}"),
            })?;

        let mut child = self
            .launch_command(port, &profile)
            .spawn()
            .map_err(|e| DriverError::Launch {
                reason: format!("{}: {e}", self.config.executable.display()),
            })?;

        let ws_url = match self.discover(port).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                let _ = child.kill().await;
                return Err(DriverError::Launch {
                    reason: format!(
                        "devtools endpoint did not come up within {:?}",
                        self.config.launch_timeout
                    ),
                });
            }
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let connection = match Connection::open(&ws_url, self.config.command_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let id = format!("browser-{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock(&self.browsers).insert(
            id.clone(),
            Arc::new(Browser {
                connection,
                process: tokio::sync::Mutex::new(child),
                _profile: profile,
            }),
        );
        tracing::debug!(browser = %id, port, "browser launched");
        Ok(BrowserHandle::new(id))
    }

    async fn open_page(&self, browser: &BrowserHandle) -> Result<PageHandle, DriverError> {
        let owner = self.browser(browser.id())?;
        let connection = &owner.connection;

        let created = connection
            .call("Target.createTarget", json!({ "url": "about:blank" }), None)
            .await?;
        let target_id = string_field(&created, "targetId", "Target.createTarget")?;
        let attached = connection
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "sessionId", "Target.attachToTarget")?;

        let (width, height) = self.config.viewport;
        let session = Some(session_id.as_str());
        connection.call("Page.enable", json!({}), session).await?;
        connection
            .call(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": MASK_WEBDRIVER }),
                session,
            )
            .await?;
        connection
            .call(
                "Emulation.setDeviceMetricsOverride",
                json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": false }),
                session,
            )
            .await?;

        let id = format!("page-{}", self.next_handle.fetch_add(1, Ordering::Relaxed));
        lock(&self.pages).insert(
            id.clone(),
            Arc::new(Page {
                browser_id: browser.id().to_string(),
                target_id,
                session_id,
                connection: connection.clone(),
            }),
        );
        Ok(PageHandle::new(id, browser.id()))
    }

    async fn navigate(
        &self,
        page: &PageHandle,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let started = Instant::now();
        let before = self.document_state(page).await?;
        let reply = self
            .page_call(page, "Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(reason) = reply
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }

        let before = &before;
        let loaded = poll_until(PollPolicy::new(LOAD_PROBE, timeout), || async move {
            let state = self.document_state(page).await?;
            Ok::<_, DriverError>(state.filter(|now| {
                now.ready_state == "complete"
                    && before
                        .as_ref()
                        .is_none_or(|old| old.time_origin != now.time_origin)
            }))
        })
        .await?;
        if loaded.is_none() {
            return Err(DriverError::Timeout {
                operation: format!("load of {url}"),
            });
        }

        if wait == WaitUntil::NetworkIdle {
            let remaining = timeout.saturating_sub(started.elapsed());
            self.wait_for_network_idle(page, remaining).await?;
        }
        Ok(())
    }

    async fn wait_for_navigation(
        &self,
        page: &PageHandle,
        from_url: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let arrived = poll_until(PollPolicy::new(LOAD_PROBE, timeout), || async move {
            let state = self.document_state(page).await?;
            Ok::<_, DriverError>(
                state.filter(|now| now.href != from_url && now.ready_state == "complete"),
            )
        })
        .await?;
        match arrived {
            Some(_) => Ok(()),
            None => Err(DriverError::Timeout {
                operation: format!("navigation away from {from_url}"),
            }),
        }
    }

    async fn current_url(&self, page: &PageHandle) -> Result<String, DriverError> {
        match self.evaluate(page, "location.href").await? {
            Value::String(href) => Ok(href),
            other => Err(DriverError::Script {
                message: format!("location.href returned {other}"),
            }),
        }
    }

    async fn fill(
        &self,
        page: &PageHandle,
        locator: &Locator,
        value: &str,
    ) -> Result<(), DriverError> {
        self.require_element(
            page,
            locator,
            "if (!el) return false; el.focus(); if ('value' in el) el.value = ''; return true;",
        )
        .await?;
        self.page_call(page, "Input.insertText", json!({ "text": value }))
            .await?;
        Ok(())
    }

    async fn click(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError> {
        let center = self
            .with_element(
                page,
                locator,
                "if (!el) return null; el.scrollIntoView({ block: 'center' }); \
                 const r = el.getBoundingClientRect(); \
                 return { x: r.left + r.width / 2, y: r.top + r.height / 2 };",
            )
            .await?;
        let Point { x, y } =
            serde_json::from_value(center).map_err(|_| DriverError::ElementNotFound {
                locator: locator.to_string(),
            })?;

        for (kind, button, clicks) in [
            ("mouseMoved", "none", 0),
            ("mousePressed", "left", 1),
            ("mouseReleased", "left", 1),
        ] {
            self.page_call(
                page,
                "Input.dispatchMouseEvent",
                json!({ "type": kind, "x": x, "y": y, "button": button, "clickCount": clicks }),
            )
            .await?;
        }
        Ok(())
    }

    async fn activate(&self, page: &PageHandle, locator: &Locator) -> Result<(), DriverError> {
        self.require_element(page, locator, "if (!el) return false; el.click(); return true;")
            .await
    }

    async fn exists(&self, page: &PageHandle, locator: &Locator) -> Result<bool, DriverError> {
        let found = self
            .with_element(page, locator, "return el !== null;")
            .await?;
        Ok(found.as_bool().unwrap_or(false))
    }

    async fn is_visible(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<bool, DriverError> {
        let visible = self
            .with_element(
                page,
                locator,
                "if (!el) return false; const s = getComputedStyle(el); \
                 const r = el.getBoundingClientRect(); \
                 return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0;",
            )
            .await?;
        Ok(visible.as_bool().unwrap_or(false))
    }

    async fn is_interactable(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<bool, DriverError> {
        let usable = self
            .with_element(
                page,
                locator,
                "if (!el || !el.isConnected || el.disabled) return false; \
                 const shown = (n) => { const s = getComputedStyle(n); \
                 const r = n.getBoundingClientRect(); \
                 return s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0; }; \
                 return shown(el) || Array.from(el.labels || []).some(shown);",
            )
            .await?;
        Ok(usable.as_bool().unwrap_or(false))
    }

    async fn text_of(
        &self,
        page: &PageHandle,
        locator: &Locator,
    ) -> Result<Option<String>, DriverError> {
        let text = self
            .with_element(
                page,
                locator,
                "return el ? (el.textContent || '').trim() : null;",
            )
            .await?;
        Ok(text.as_str().map(str::to_string))
    }

    async fn content(&self, page: &PageHandle) -> Result<String, DriverError> {
        let html = self
            .evaluate(page, "document.documentElement.outerHTML")
            .await?;
        Ok(html.as_str().unwrap_or_default().to_string())
    }

    async fn extract_all_cookies(&self, page: &PageHandle) -> Result<Vec<Cookie>, DriverError> {
        let reply = self
            .page_call(page, "Network.getAllCookies", json!({}))
            .await?;
        serde_json::from_value(reply.get("cookies").cloned().unwrap_or(Value::Null)).map_err(|e| {
            DriverError::Protocol {
                method: "Network.getAllCookies".to_string(),
                message: e.to_string(),
            }
        })
    }

    async fn close_page(&self, page: PageHandle) -> Result<(), DriverError> {
        let target = lock(&self.pages)
            .remove(page.id())
            .ok_or_else(|| DriverError::UnknownHandle {
                id: page.id().to_string(),
            })?;
        target
            .connection
            .call(
                "Target.closeTarget",
                json!({ "targetId": target.target_id }),
                None,
            )
            .await?;
        Ok(())
    }

    async fn close_browser(&self, browser: BrowserHandle) -> Result<(), DriverError> {
        let owned = lock(&self.browsers)
            .remove(browser.id())
            .ok_or_else(|| DriverError::UnknownHandle {
                id: browser.id().to_string(),
            })?;
        lock(&self.pages).retain(|_, page| page.browser_id != browser.id());

        if let Err(e) = owned.connection.call("Browser.close", json!({}), None).await {
            tracing::debug!(browser = %browser.id(), error = %e, "Browser.close failed, killing process");
        }
        let mut child = owned.process.lock().await;
        if tokio::time::timeout(EXIT_GRACE, child.wait()).await.is_err() {
            child.kill().await.map_err(|e| DriverError::Launch {
                reason: format!("failed to kill browser: {e}"),
            })?;
        }
        tracing::debug!(browser = %browser.id(), "browser closed");
        Ok(())
    }
}
