//! Ordered fallback across scraping strategies.
//!
//! The chain walks its strategies in configured order. A strategy is skipped
//! when it is not configured, supports none of the query's sites, or its
//! circuit breaker is open. Otherwise it fetches every supported target site
//! (throttled per host); the first strategy that returns at least one record
//! serves the query. There are no retries inside a strategy: the retry budget
//! is the list of strategies itself.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};
use crate::error::AppError;
use crate::fetch::fetch_attempt;
use crate::models::{ScrapeMetadata, ScrapeQuery, ScrapeResult, ScrapedRecord, ToolAttempt, ToolKind};
use crate::normalize::normalize_record;
use crate::site::Site;
use crate::throttle::HostThrottle;
use crate::traits::SiteFetcher;

/// Chain-wide settings.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Budget for a single tool/site fetch.
    pub fetch_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Counters for one strategy, as reported by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub tool: ToolKind,
    pub configured: bool,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub circuit: CircuitBreakerStats,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    attempts: u64,
    successes: u64,
    failures: u64,
    last_error: Option<String>,
}

struct ToolSlot<S> {
    fetcher: S,
    breaker: CircuitBreaker,
    counters: Mutex<Counters>,
}

impl<S: SiteFetcher> ToolSlot<S> {
    fn count(&self, f: impl FnOnce(&mut Counters)) {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut counters);
    }
}

/// Outcome of running one strategy over its supported sites.
enum ToolRun {
    Served(Vec<ScrapedRecord>),
    Failed(String),
}

pub struct FallbackChain<S> {
    tools: Vec<ToolSlot<S>>,
    throttle: HostThrottle,
    config: ChainConfig,
}

impl<S: SiteFetcher> FallbackChain<S> {
    /// Build a chain that tries `strategies` in the given order.
    pub fn new(strategies: Vec<S>, throttle: HostThrottle, config: ChainConfig) -> Self {
        let tools = strategies
            .into_iter()
            .map(|fetcher| ToolSlot {
                breaker: CircuitBreaker::new(fetcher.tool().as_str(), config.breaker.clone()),
                fetcher,
                counters: Mutex::new(Counters::default()),
            })
            .collect();
        Self {
            tools,
            throttle,
            config,
        }
    }

    /// Tools in fallback order.
    pub fn tools(&self) -> Vec<ToolKind> {
        self.tools.iter().map(|t| t.fetcher.tool()).collect()
    }

    pub fn stats(&self) -> Vec<ToolStats> {
        self.tools
            .iter()
            .map(|slot| {
                let counters = slot
                    .counters
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                ToolStats {
                    tool: slot.fetcher.tool(),
                    configured: slot.fetcher.is_configured(),
                    attempts: counters.attempts,
                    successes: counters.successes,
                    failures: counters.failures,
                    circuit: slot.breaker.stats(),
                    last_error: counters.last_error.clone(),
                }
            })
            .collect()
    }

    /// Scrape with fallback, truncating `data` to the query's `max_results`.
    pub async fn scrape_with_fallback(&self, query: &ScrapeQuery) -> ScrapeResult {
        let max = query.max_results;
        self.collect(query).await.capped(max)
    }

    /// Scrape with fallback without truncating: `data` holds everything the
    /// winning strategy returned across the target sites.
    pub async fn collect(&self, query: &ScrapeQuery) -> ScrapeResult {
        let started = Instant::now();
        let mut metadata = ScrapeMetadata::new(query);

        if let Err(e) = query.validate() {
            return ScrapeResult::failed(None, e.to_string(), metadata);
        }

        let sites = query.target_sites();
        let mut last_failure: Option<String> = None;

        for slot in &self.tools {
            let tool = slot.fetcher.tool();
            if !slot.fetcher.is_configured() {
                tracing::debug!(%tool, "Skipping unconfigured tool");
                continue;
            }
            let supported: Vec<_> = sites
                .iter()
                .copied()
                .filter(|s| slot.fetcher.supports(*s))
                .collect();
            if supported.is_empty() {
                tracing::debug!(%tool, ?sites, "Tool supports none of the target sites");
                continue;
            }
            if let Err(retry_after) = slot.breaker.allow() {
                let msg = format!("{tool}: circuit open, retry after {}s", retry_after.as_secs());
                tracing::debug!(%tool, retry_after_secs = retry_after.as_secs(), "Skipping tool with open circuit");
                metadata.attempts.push(ToolAttempt {
                    tool,
                    site: None,
                    success: false,
                    records: 0,
                    error: Some(msg.clone()),
                    elapsed_ms: 0,
                });
                last_failure = Some(msg);
                continue;
            }

            match self.run_tool(slot, &supported, query, &mut metadata).await {
                ToolRun::Served(records) => {
                    tracing::info!(
                        %tool,
                        query = %query.query,
                        records = records.len(),
                        "Query served"
                    );
                    metadata.total_found = records.len();
                    metadata.execution_time_ms = started.elapsed().as_millis() as u64;
                    return ScrapeResult::succeeded(tool, records, metadata);
                }
                ToolRun::Failed(msg) => last_failure = Some(msg),
            }
        }

        metadata.execution_time_ms = started.elapsed().as_millis() as u64;
        let error = match last_failure {
            Some(last) => format!("All scraping tools failed; last error: {last}"),
            None => format!(
                "No configured scraping tool supports {}",
                sites
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        tracing::warn!(query = %query.query, %error, "Fallback chain exhausted");
        ScrapeResult::failed(None, error, metadata)
    }

    async fn run_tool(
        &self,
        slot: &ToolSlot<S>,
        sites: &[Site],
        query: &ScrapeQuery,
        metadata: &mut ScrapeMetadata,
    ) -> ToolRun {
        let tool = slot.fetcher.tool();
        slot.count(|c| c.attempts += 1);

        let mut records = Vec::new();
        let mut last_error: Option<AppError> = None;

        for &site in sites {
            self.throttle.wait(&slot.fetcher.request_host(site)).await;
            let (outcome, attempt) = fetch_attempt(
                &slot.fetcher,
                site,
                query,
                query.max_results,
                self.config.fetch_timeout,
            )
            .await;
            metadata.attempts.push(attempt);
            match outcome {
                Ok(found) => records.extend(found.into_iter().map(normalize_record)),
                Err(e) => last_error = Some(e),
            }
        }

        if !records.is_empty() {
            slot.breaker.record_success();
            slot.count(|c| c.successes += 1);
            return ToolRun::Served(records);
        }

        let msg = match &last_error {
            Some(e) => {
                slot.breaker.record_failure(e);
                format!("{tool}: {e}")
            }
            None => format!("{tool}: no records found"),
        };
        slot.count(|c| {
            c.failures += 1;
            c.last_error = Some(msg.clone());
        });
        ToolRun::Failed(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::models::QueryType;
    use crate::testutil::{MockSiteFetcher, make_listings};
    use crate::throttle::ThrottleConfig;

    fn chain(tools: Vec<MockSiteFetcher>) -> FallbackChain<MockSiteFetcher> {
        FallbackChain::new(
            tools,
            HostThrottle::new(ThrottleConfig::disabled()),
            ChainConfig::default(),
        )
    }

    fn mustang() -> ScrapeQuery {
        ScrapeQuery::new("1967 Mustang", QueryType::Vehicle).with_sites(vec![Site::ClassicCars])
    }

    #[tokio::test]
    async fn falls_back_to_next_tool_on_failure() {
        let a = MockSiteFetcher::new(ToolKind::Http)
            .with_error(AppError::NetworkError("connection reset".into()));
        let b = MockSiteFetcher::new(ToolKind::Firecrawl).with_records(make_listings(0, 3));

        let result = chain(vec![a, b]).scrape_with_fallback(&mustang()).await;

        assert!(result.success);
        assert_eq!(result.tool, Some(ToolKind::Firecrawl));
        assert_eq!(result.data.len(), 3);
        let first = &result.metadata.attempts[0];
        assert_eq!(first.tool, ToolKind::Http);
        assert!(!first.success);
        assert!(first.error.as_ref().unwrap().contains("connection reset"));
        assert_eq!(result.metadata.attempts.len(), 2);
    }

    #[tokio::test]
    async fn empty_result_moves_to_next_tool() {
        let a = MockSiteFetcher::new(ToolKind::Http);
        let b = MockSiteFetcher::new(ToolKind::Brave).with_records(make_listings(0, 1));

        let result = chain(vec![a, b]).scrape_with_fallback(&mustang()).await;
        assert_eq!(result.tool, Some(ToolKind::Brave));
    }

    #[tokio::test]
    async fn exhausted_chain_reports_last_failure() {
        let a = MockSiteFetcher::new(ToolKind::Http)
            .with_error(AppError::HttpError("HTTP 500".into()));
        let b = MockSiteFetcher::new(ToolKind::Browser).with_error(AppError::Blocked {
            site: "ClassicCars.com".into(),
            reason: "captcha".into(),
        });

        let result = chain(vec![a, b]).scrape_with_fallback(&mustang()).await;

        assert!(!result.success);
        assert!(result.tool.is_none());
        assert!(result.data.is_empty());
        let error = result.error.unwrap();
        assert!(error.contains("browser: Blocked by ClassicCars.com: captcha"), "{error}");
        assert_eq!(result.metadata.attempts.len(), 2);
    }

    #[tokio::test]
    async fn skips_unconfigured_and_unsupported_tools() {
        let unconfigured = MockSiteFetcher::new(ToolKind::Firecrawl)
            .with_records(make_listings(0, 1))
            .unconfigured();
        let web_only = MockSiteFetcher::new(ToolKind::Jina)
            .with_records(make_listings(0, 1))
            .with_sites(&[Site::Web]);
        let browser = MockSiteFetcher::new(ToolKind::Browser).with_records(make_listings(0, 2));

        let result = chain(vec![unconfigured.clone(), web_only.clone(), browser])
            .scrape_with_fallback(&mustang())
            .await;

        assert_eq!(result.tool, Some(ToolKind::Browser));
        assert_eq!(unconfigured.call_count(), 0);
        assert_eq!(web_only.call_count(), 0);
        assert_eq!(result.metadata.attempts.len(), 1);
    }

    #[tokio::test]
    async fn no_capable_tool_is_a_failure() {
        let web_only = MockSiteFetcher::new(ToolKind::Brave).with_sites(&[Site::Web]);
        let result = chain(vec![web_only]).scrape_with_fallback(&mustang()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("classiccars"));
    }

    #[tokio::test]
    async fn data_never_exceeds_max_results() {
        let a = MockSiteFetcher::new(ToolKind::Http).with_records(make_listings(0, 30));
        let chain = chain(vec![a]);

        for max in [1, 7, 30, 100] {
            let q = mustang().with_max_results(max);
            let result = chain.scrape_with_fallback(&q).await;
            assert!(result.data.len() <= max);
            assert_eq!(result.metadata.total_found, 30);
        }
    }

    #[tokio::test]
    async fn invalid_query_is_rejected_before_fetching() {
        let a = MockSiteFetcher::new(ToolKind::Http).with_records(make_listings(0, 1));
        let chain = chain(vec![a.clone()]);

        let result = chain.scrape_with_fallback(&mustang().with_max_results(0)).await;
        assert!(!result.success);
        assert!(result.error.unwrap().starts_with("Validation error"));
        assert_eq!(a.call_count(), 0);
    }

    #[tokio::test]
    async fn aggregates_records_across_sites() {
        let a = MockSiteFetcher::new(ToolKind::Http).with_handler(|site, _| {
            Ok(match site {
                Site::ClassicCars => make_listings(0, 2),
                Site::Hemmings => make_listings(10, 1),
                _ => Vec::new(),
            })
        });
        let q = ScrapeQuery::new("Mustang", QueryType::Vehicle);
        let result = chain(vec![a.clone()]).collect(&q).await;

        assert!(result.success);
        assert_eq!(result.data.len(), 3);
        assert_eq!(a.call_count(), 3);
        assert_eq!(result.metadata.attempts.len(), 3);
    }

    #[tokio::test]
    async fn records_are_normalized() {
        let mut raw = make_listings(0, 1);
        raw[0].title = "  1969   Chevrolet Camaro Z/28 ".into();
        let a = MockSiteFetcher::new(ToolKind::Http).with_records(raw);

        let result = chain(vec![a]).scrape_with_fallback(&mustang()).await;
        let record = &result.data[0];
        assert_eq!(record.title, "1969 Chevrolet Camaro Z/28");
        assert_eq!(record.year, Some(1969));
        assert_eq!(record.make.as_deref(), Some("Chevrolet"));
    }

    #[tokio::test]
    async fn open_circuit_skips_tool_and_is_listed() {
        let a = MockSiteFetcher::new(ToolKind::Http)
            .with_error(AppError::NetworkError("down".into()));
        let b = MockSiteFetcher::new(ToolKind::Jina).with_records(make_listings(0, 1));
        let chain = FallbackChain::new(
            vec![a.clone(), b],
            HostThrottle::new(ThrottleConfig::disabled()),
            ChainConfig {
                breaker: CircuitBreakerConfig {
                    failure_threshold: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        chain.scrape_with_fallback(&mustang()).await;
        chain.scrape_with_fallback(&mustang()).await;
        let result = chain.scrape_with_fallback(&mustang()).await;

        assert_eq!(a.call_count(), 2);
        assert_eq!(result.tool, Some(ToolKind::Jina));
        assert!(result.metadata.attempts[0]
            .error
            .as_ref()
            .unwrap()
            .contains("circuit open"));

        let stats = chain.stats();
        assert_eq!(stats[0].tool, ToolKind::Http);
        assert_eq!(stats[0].attempts, 2);
        assert_eq!(stats[0].failures, 2);
        assert_eq!(stats[0].circuit.state, CircuitState::Open);
        assert_eq!(stats[1].successes, 3);
    }
}
