use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use scout_core::error::AppError;
use scout_core::traits::Fetcher;
use url::Url;

/// Desktop Chrome user agent sent by every HTTP request.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// HTTP fetcher using reqwest.
///
/// Sends the headers a desktop browser would, so listing sites serve their
/// regular search pages. A 403 is reported as [`AppError::Blocked`] and a 429
/// as [`AppError::RateLimitExceeded`], letting the fallback chain move on.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout_secs))?;

        check_status(response.status(), url)?;

        response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))
    }
}

/// Map a reqwest transport error onto the error taxonomy.
pub(crate) fn map_send_error(e: reqwest::Error, timeout_secs: u64) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(timeout_secs)
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {e}"))
    } else {
        AppError::HttpError(e.to_string())
    }
}

/// Turn a non-success status into an error. 403 means the site is blocking
/// us; 429 means we are going too fast.
pub(crate) fn check_status(status: StatusCode, url: &str) -> Result<(), AppError> {
    if status.is_success() {
        return Ok(());
    }
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    Err(match status {
        StatusCode::FORBIDDEN => AppError::Blocked {
            site: host,
            reason: "HTTP 403 Forbidden".to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => {
            AppError::RateLimitExceeded(format!("HTTP 429 from {host}"))
        }
        _ => AppError::HttpError(format!("HTTP {} for {}", status.as_u16(), url)),
    })
}
