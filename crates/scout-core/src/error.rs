use thiserror::Error;

/// Application-wide error types for Scout.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed query or request parameters. Rejected before any fetch.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// HTTP request failed (non-success status, bad body, navigation failure).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The target site served a bot-detection page (CAPTCHA, access denied, ...).
    #[error("Blocked by {site}: {reason}")]
    Blocked { site: String, reason: String },

    /// Rate limit exceeded (HTTP 429 or provider quota).
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// The page or API response did not have the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Storage rejected a record.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Storage already holds a record with this fingerprint.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// No job with this id exists in the job table.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for failures that the fallback chain moves past by trying
    /// the next tool (network, timeout, bot-block, rate limit, parse).
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            AppError::HttpError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::Blocked { .. }
                | AppError::RateLimitExceeded(_)
                | AppError::ParseError(_)
        )
    }

    /// Returns true if this error should count against a tool's circuit breaker.
    ///
    /// Validation and configuration errors say nothing about the tool's health.
    pub fn should_trip_circuit(&self) -> bool {
        self.is_fetch_failure()
    }

    /// Returns true if the failure indicates the remote side is throttling us.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, AppError::RateLimitExceeded(_))
    }
}
