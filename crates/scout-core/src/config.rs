use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchConfig;
use crate::error::AppError;
use crate::fallback::ChainConfig;
use crate::models::ToolKind;
use crate::throttle::ThrottleConfig;

/// Scraper settings, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ScraperConfig {
    /// Fallback order of the scraping tools.
    pub tool_order: Vec<ToolKind>,
    pub firecrawl_api_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub apify_api_key: Option<String>,
    pub jina_api_key: Option<String>,
    pub fetch_timeout: Duration,
    pub max_concurrency: usize,
    pub throttle: ThrottleConfig,
    pub job_timeout: Duration,
    /// Where to write HTML that yielded no listings. Unset disables dumps.
    pub debug_dump_dir: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            tool_order: ToolKind::DEFAULT_ORDER.to_vec(),
            firecrawl_api_key: None,
            brave_api_key: None,
            apify_api_key: None,
            jina_api_key: None,
            fetch_timeout: Duration::from_secs(30),
            max_concurrency: 2,
            throttle: ThrottleConfig::default(),
            job_timeout: Duration::from_secs(600),
            debug_dump_dir: None,
        }
    }
}

impl ScraperConfig {
    /// Read configuration from environment variables.
    ///
    /// - `SCOUT_TOOL_ORDER` (comma-separated, defaults to `http,firecrawl,brave,apify,jina,browser`)
    /// - `FIRECRAWL_API_KEY`, `BRAVE_API_KEY`, `APIFY_API_KEY`, `JINA_API_KEY` (optional)
    /// - `SCOUT_FETCH_TIMEOUT_SECS` (30), `SCOUT_MAX_CONCURRENCY` (2)
    /// - `SCOUT_SITE_DELAY_MS` (3000), `SCOUT_SITE_JITTER_MS` (5000)
    /// - `SCOUT_JOB_TIMEOUT_SECS` (600), `SCOUT_DEBUG_DUMP_DIR` (optional)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or blank keys take defaults;
    /// malformed values are errors.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let tool_order = match get("SCOUT_TOOL_ORDER") {
            None => defaults.tool_order,
            Some(raw) => parse_tool_order(&raw)?,
        };

        let delay_ms = parse_num(&get, "SCOUT_SITE_DELAY_MS", 3000u64, 0)?;
        let jitter_ms = parse_num(&get, "SCOUT_SITE_JITTER_MS", 5000u64, 0)?;

        Ok(Self {
            tool_order,
            firecrawl_api_key: get("FIRECRAWL_API_KEY"),
            brave_api_key: get("BRAVE_API_KEY"),
            apify_api_key: get("APIFY_API_KEY"),
            jina_api_key: get("JINA_API_KEY"),
            fetch_timeout: Duration::from_secs(parse_num(&get, "SCOUT_FETCH_TIMEOUT_SECS", 30u64, 1)?),
            max_concurrency: parse_num(&get, "SCOUT_MAX_CONCURRENCY", 2usize, 1)?,
            throttle: ThrottleConfig::new(Duration::from_millis(delay_ms))
                .with_jitter(Duration::from_millis(jitter_ms)),
            job_timeout: Duration::from_secs(parse_num(&get, "SCOUT_JOB_TIMEOUT_SECS", 600u64, 1)?),
            debug_dump_dir: get("SCOUT_DEBUG_DUMP_DIR").map(PathBuf::from),
        })
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            fetch_timeout: self.fetch_timeout,
            ..ChainConfig::default()
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.max_concurrency,
            job_timeout: self.job_timeout,
        }
    }
}

fn parse_tool_order(raw: &str) -> Result<Vec<ToolKind>, AppError> {
    let mut order = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let tool = ToolKind::from_str(name)
            .map_err(|e| AppError::ConfigError(format!("Invalid SCOUT_TOOL_ORDER: {e}")))?;
        if !order.contains(&tool) {
            order.push(tool);
        }
    }
    if order.is_empty() {
        return Err(AppError::ConfigError(
            "SCOUT_TOOL_ORDER must name at least one tool".into(),
        ));
    }
    Ok(order)
}

fn parse_num<T, G>(get: &G, key: &str, default: T, min: T) -> Result<T, AppError>
where
    T: FromStr + PartialOrd + std::fmt::Display + Copy,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => {
            let parsed: T = raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}': must be a non-negative integer"))
            })?;
            if parsed < min {
                return Err(AppError::ConfigError(format!("{key} must be at least {min}")));
            }
            Ok(parsed)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_map(pairs: &[(&str, &str)]) -> Result<ScraperConfig, AppError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ScraperConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from_map(&[]).unwrap();
        assert_eq!(config, ScraperConfig::default());
        assert_eq!(config.tool_order, ToolKind::DEFAULT_ORDER.to_vec());
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.throttle.delay, Duration::from_millis(3000));
        assert_eq!(config.throttle.jitter, Duration::from_millis(5000));
    }

    #[test]
    fn reads_keys_and_overrides() {
        let config = from_map(&[
            ("SCOUT_TOOL_ORDER", "brave, http ,brave,apify"),
            ("BRAVE_API_KEY", "bsa-123"),
            ("APIFY_API_KEY", "apify_api_abc"),
            ("JINA_API_KEY", "  "),
            ("SCOUT_MAX_CONCURRENCY", "4"),
            ("SCOUT_SITE_DELAY_MS", "0"),
            ("SCOUT_DEBUG_DUMP_DIR", "/tmp/scout"),
        ])
        .unwrap();
        assert_eq!(
            config.tool_order,
            vec![ToolKind::Brave, ToolKind::Http, ToolKind::Apify]
        );
        assert_eq!(config.brave_api_key.as_deref(), Some("bsa-123"));
        assert_eq!(config.apify_api_key.as_deref(), Some("apify_api_abc"));
        assert!(config.jina_api_key.is_none());
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.throttle.delay, Duration::ZERO);
        assert_eq!(config.debug_dump_dir, Some(PathBuf::from("/tmp/scout")));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            from_map(&[("SCOUT_MAX_CONCURRENCY", "many")]),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            from_map(&[("SCOUT_MAX_CONCURRENCY", "0")]),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            from_map(&[("SCOUT_TOOL_ORDER", "http,carrier-pigeon")]),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            from_map(&[("SCOUT_FETCH_TIMEOUT_SECS", "-5")]),
            Err(AppError::ConfigError(_))
        ));
    }
}
