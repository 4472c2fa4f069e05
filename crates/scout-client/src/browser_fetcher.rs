use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use scout_core::error::AppError;
use scout_core::traits::Fetcher;

use crate::fetcher::BROWSER_USER_AGENT;

/// Hides `navigator.webdriver` before any page script runs.
const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });";

/// Headless-browser fetcher using Chromium via the Chrome DevTools Protocol.
///
/// Renders JavaScript before returning the HTML, for listing sites whose
/// search results are built client-side. Launch flags and an init script
/// hide the usual automation fingerprints.
///
/// A single Chromium process is shared across all clones; each
/// [`Fetcher::fetch`] call opens a new tab, grabs the rendered HTML and closes
/// the tab.
#[derive(Clone)]
pub struct BrowserFetcher {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl BrowserFetcher {
    /// Launches headless Chromium with a 30 s navigation timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .window_size(1366, 900);

        // The snap wrapper at /snap/bin/chromium drops unknown flags, so prefer
        // the real binary when one is found.
        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .arg("--lang=en-US")
            .arg(format!("--user-agent={BROWSER_USER_AGENT}"))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::ConfigError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    /// `$CHROME_BIN`, then well-known install locations.
    fn find_chrome_binary() -> Option<PathBuf> {
        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(p);
            if path.exists() {
                return Some(path);
            }
        }

        [
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    async fn render(&self, url: &str) -> Result<String, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to open tab: {e}")))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to install init script: {e}")))?;

        let result = async {
            page.goto(url)
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to navigate to {url}: {e}")))?;
            page.find_element("body")
                .await
                .map_err(|e| AppError::HttpError(format!("Page did not render body: {e}")))?;
            page.content()
                .await
                .map_err(|e| AppError::HttpError(format!("Failed to read page content: {e}")))
        }
        .await;

        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "Failed to close tab");
        }
        result
    }
}

impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        match tokio::time::timeout(self.timeout, self.render(url)).await {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}
