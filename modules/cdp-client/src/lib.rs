//! Browser pool over the Chrome DevTools Protocol.
//!
//! Drives an already-running, user-visible Chrome (started with
//! `--remote-debugging-port`) so that the operator's cookies and login
//! sessions are reused. No browser is ever launched here.
//!
//! Tab management:
//! - fresh tab per fetch, always closed afterwards, except when a bot check
//!   is detected, in which case the tab is preserved for the operator
//! - stale `about:blank` tabs are swept at most once a minute, and only while
//!   no fetch is in flight

mod detect;
pub mod error;

pub use error::{CdpError, Result};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

const NAV_TIMEOUT: Duration = Duration::from_secs(30);
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(20);
const SELECTOR_POLL: Duration = Duration::from_millis(500);
const RENDER_SETTLE: Duration = Duration::from_secs(2);
const FORM_SETTLE: Duration = Duration::from_secs(4);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Concurrent tabs. One shared browser instance degrades badly past two
/// simultaneous automated pages.
const MAX_CONCURRENT_FETCHES: usize = 2;

/// Description of a POST-style search that must be driven through a form.
#[derive(Debug, Clone)]
pub struct FormPlan {
    pub source_name: String,
    /// Page carrying the form.
    pub url: String,
    /// Selector that must be present before filling starts.
    pub form_selector: String,
    /// Checkboxes to ensure are checked (by selector).
    pub checkboxes: Vec<String>,
    /// `(input selector, value)` pairs, filled in order.
    pub fills: Vec<(String, String)>,
    /// Element clicked to submit.
    pub submit_selector: String,
}

pub struct BrowserPool {
    browser: Browser,
    endpoint: String,
    semaphore: Semaphore,
    in_flight: AtomicUsize,
    last_sweep: Mutex<Option<Instant>>,
}

impl BrowserPool {
    /// Connect to the external browser's debug endpoint, joining the existing
    /// session. The websocket URL is discovered via `/json/version`.
    pub async fn connect(debug_host: &str, debug_port: u16) -> Result<Arc<Self>> {
        let endpoint = format!("http://{debug_host}:{debug_port}");
        let version_url = format!("{endpoint}/json/version");

        let body = reqwest::get(&version_url)
            .await
            .map_err(|e| CdpError::Connect { endpoint: endpoint.clone(), message: e.to_string() })?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| CdpError::Connect { endpoint: endpoint.clone(), message: e.to_string() })?;

        let ws_url = body
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CdpError::Connect {
                endpoint: endpoint.clone(),
                message: "no webSocketDebuggerUrl in /json/version response".to_string(),
            })?;

        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| CdpError::Connect { endpoint: endpoint.clone(), message: e.to_string() })?;

        // The handler must be polled for the connection to make progress.
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        info!(endpoint = endpoint.as_str(), "Connected to browser");

        Ok(Arc::new(Self {
            browser,
            endpoint,
            semaphore: Semaphore::new(MAX_CONCURRENT_FETCHES),
            in_flight: AtomicUsize::new(0),
            last_sweep: Mutex::new(None),
        }))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch rendered HTML from `url` in a fresh tab.
    ///
    /// Fails with [`CdpError::BotCheck`] when a blocking challenge cannot be
    /// auto-dismissed (the tab stays open for the operator), and with
    /// [`CdpError::DailyLimit`] on quota messages.
    pub async fn fetch(
        &self,
        url: &str,
        source_name: &str,
        wait_for_selector: Option<&str>,
    ) -> Result<String> {
        self.sweep_stale_tabs(false).await;

        let _flight = FlightGuard::enter(&self.in_flight);
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CdpError::Protocol(e.to_string()))?;

        let page = self.new_page().await?;

        match self.fetch_on_page(&page, url, source_name, wait_for_selector).await {
            Ok(html) => {
                close_page(page).await;
                Ok(html)
            }
            Err(CdpError::BotCheck { source_name: source }) => {
                warn!(source = source.as_str(), "Tab left open for operator verification");
                Err(CdpError::BotCheck { source_name: source })
            }
            Err(err) => {
                close_page(page).await;
                Err(err)
            }
        }
    }

    /// Fill and submit a search form in a fresh tab, returning the rendered
    /// results page. Obeys the same semaphore, dialog, and sweeper rules as
    /// [`BrowserPool::fetch`].
    pub async fn fetch_with_form(&self, plan: &FormPlan) -> Result<String> {
        self.sweep_stale_tabs(false).await;

        let _flight = FlightGuard::enter(&self.in_flight);
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| CdpError::Protocol(e.to_string()))?;

        let page = self.new_page().await?;
        let result = self.submit_form_on_page(&page, plan).await;
        close_page(page).await;
        result
    }

    async fn fetch_on_page(
        &self,
        page: &Page,
        url: &str,
        source_name: &str,
        wait_for_selector: Option<&str>,
    ) -> Result<String> {
        navigate(page, url).await?;

        if let Some(selector) = wait_for_selector {
            // Missing selector is non-fatal; the page may still hold results.
            if !wait_for_element(page, selector, SELECTOR_TIMEOUT).await {
                debug!(source = source_name, selector, "Selector never appeared, continuing");
            }
        }

        tokio::time::sleep(RENDER_SETTLE).await;

        detect::handle_bot_check(page, source_name).await?;

        let content = page.content().await?;

        if let Some(phrase) = detect::daily_limit_indicator(&content) {
            warn!(source = source_name, phrase, "Daily limit detected");
            return Err(CdpError::DailyLimit { source_name: source_name.to_string() });
        }

        Ok(content)
    }

    async fn submit_form_on_page(&self, page: &Page, plan: &FormPlan) -> Result<String> {
        debug!(source = plan.source_name.as_str(), url = plan.url.as_str(), "Submitting search form");
        navigate(page, &plan.url).await?;

        if !wait_for_element(page, &plan.form_selector, Duration::from_secs(10)).await {
            return Err(CdpError::Navigation {
                url: plan.url.clone(),
                message: format!("search form '{}' never appeared", plan.form_selector),
            });
        }

        for checkbox in &plan.checkboxes {
            ensure_checked(page, checkbox).await?;
        }

        for (selector, value) in &plan.fills {
            let element = page.find_element(selector.as_str()).await?;
            element.click().await?;
            element.type_str(value).await?;
        }

        page.find_element(plan.submit_selector.as_str()).await?.click().await?;
        tokio::time::sleep(FORM_SETTLE).await;

        Ok(page.content().await?)
    }

    async fn new_page(&self) -> Result<Page> {
        let page = self.browser.new_page("about:blank").await?;
        install_dialog_handler(&page).await;
        Ok(page)
    }

    /// Close orphaned `about:blank` tabs, keeping at least one. Runs at most
    /// once per [`CLEANUP_INTERVAL`] and never while a fetch is in flight:
    /// a freshly created tab is `about:blank` until its navigation starts.
    pub async fn sweep_stale_tabs(&self, force: bool) -> usize {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return 0;
        }

        {
            let mut last = self.last_sweep.lock().await;
            if !force {
                if let Some(at) = *last {
                    if at.elapsed() < CLEANUP_INTERVAL {
                        return 0;
                    }
                }
            }
            *last = Some(Instant::now());
        }

        let pages = match self.browser.pages().await {
            Ok(pages) => pages,
            Err(e) => {
                debug!(error = %e, "Tab sweep skipped, could not list pages");
                return 0;
            }
        };

        let total = pages.len();
        let mut blank = Vec::new();
        for page in pages {
            match page.url().await {
                Ok(Some(url)) if url == "about:blank" => blank.push(page),
                _ => {}
            }
        }

        // Keep one tab so the browser window survives.
        if blank.len() == total && !blank.is_empty() {
            blank.remove(0);
        }

        let mut closed = 0usize;
        for page in blank {
            if page.close().await.is_ok() {
                closed += 1;
            }
        }
        if closed > 0 {
            info!(closed, "Swept stale about:blank tabs");
        }
        closed
    }
}

/// RAII in-flight marker gating the sweeper.
struct FlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> FlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn navigate(page: &Page, url: &str) -> Result<()> {
    let nav = async {
        page.goto(url).await?;
        page.wait_for_navigation().await?;
        Ok::<_, chromiumoxide::error::CdpError>(())
    };
    match tokio::time::timeout(NAV_TIMEOUT, nav).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CdpError::Navigation { url: url.to_string(), message: e.to_string() }),
        Err(_) => Err(CdpError::Timeout { what: format!("navigation to {url}") }),
    }
}

/// Poll for a selector until it appears or the deadline passes.
async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if page.find_element(selector).await.is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL).await;
    }
}

/// Check a checkbox only if it is not already checked; clicking a checked
/// box would toggle it off.
async fn ensure_checked(page: &Page, selector: &str) -> Result<()> {
    let js = format!(
        "(function() {{ var el = document.querySelector('{selector}'); \
         if (el && !el.checked) {{ el.click(); }} return el !== null; }})()"
    );
    let found: bool = page.evaluate(js).await?.into_value().unwrap_or(false);
    if !found {
        return Err(CdpError::Protocol(format!("checkbox '{selector}' not found")));
    }
    Ok(())
}

/// Auto-accept JavaScript dialogs so a stray `alert()` cannot stall a fetch.
async fn install_dialog_handler(page: &Page) {
    let Ok(mut dialogs) = page.event_listener::<EventJavascriptDialogOpening>().await else {
        return;
    };
    let page = page.clone();
    tokio::spawn(async move {
        while dialogs.next().await.is_some() {
            if let Ok(params) = HandleJavaScriptDialogParams::builder().accept(true).build() {
                let _ = page.execute(params).await;
            }
        }
    });
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        debug!(error = %e, "Failed to close tab");
    }
}
