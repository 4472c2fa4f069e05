//! Per-host request spacing for polite scraping.
//!
//! Successive requests to the same host are spaced by a minimum delay plus
//! random jitter. Concurrent callers for one host are serialized: each caller
//! reserves the next free slot under the lock and only then sleeps until it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use scout_core::throttle::{HostThrottle, ThrottleConfig};
//!
//! # async fn run() {
//! let throttle = HostThrottle::new(
//!     ThrottleConfig::new(Duration::from_secs(3)).with_jitter(Duration::from_secs(5)),
//! );
//! throttle.wait("classiccars.com").await;
//! // ... fetch ...
//! throttle.wait("classiccars.com").await; // sleeps 3-8s
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Spacing between consecutive requests to one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive requests to the same host.
    pub delay: Duration,

    /// Maximum random jitter added on top of `delay` (uniform [0, jitter)).
    /// `Duration::ZERO` disables it.
    pub jitter: Duration,
}

impl ThrottleConfig {
    /// Create a new config with the given per-host delay and no jitter.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// No spacing at all. Used in tests and for hosts we do not need to be
    /// polite to (our own mocks).
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Delay plus a fresh random jitter sample.
    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let jitter_ms = rand_jitter_ms(self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(jitter_ms)
    }
}

impl Default for ThrottleConfig {
    /// 3 second delay with up to 5 seconds of jitter (3-8s between requests).
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            jitter: Duration::from_secs(5),
        }
    }
}

/// Per-host throttle shared by every strategy and query of an orchestrator.
#[derive(Debug, Clone)]
pub struct HostThrottle {
    config: ThrottleConfig,
    /// Earliest instant the next request to each host may start.
    next_slot: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HostThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            next_slot: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Reserve the next slot for `host` and return when it starts.
    ///
    /// The first request to a host goes immediately; later ones are pushed
    /// `delay + jitter` past the previous reservation.
    fn reserve(&self, host: &str) -> Instant {
        let now = Instant::now();
        let mut slots = self.next_slot.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned throttle mutex");
            poisoned.into_inner()
        });
        let start = match slots.get(host) {
            Some(&next) if next > now => next,
            _ => now,
        };
        slots.insert(host.to_string(), start + self.config.effective_delay());
        start
    }

    /// Wait until a request to `host` is allowed.
    pub async fn wait(&self, host: &str) {
        if self.config.delay.is_zero() && self.config.jitter.is_zero() {
            return;
        }
        let start = self.reserve(host);
        let now = Instant::now();
        if start > now {
            tracing::debug!(
                host = %host,
                sleep_ms = %(start - now).as_millis(),
                "Throttling request"
            );
            tokio::time::sleep_until(start).await;
        }
    }
}

impl Default for HostThrottle {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

// Xorshift seeded from the clock; enough for jitter without the `rand` crate.
fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_delay_without_jitter() {
        let config = ThrottleConfig::new(Duration::from_secs(1));
        assert_eq!(config.effective_delay(), Duration::from_secs(1));
    }

    #[test]
    fn effective_delay_with_jitter_is_bounded() {
        let config =
            ThrottleConfig::new(Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..100 {
            let d = config.effective_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[test]
    fn default_spacing_is_three_to_eight_seconds() {
        let config = ThrottleConfig::default();
        assert_eq!(config.delay, Duration::from_secs(3));
        assert_eq!(config.jitter, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_requests_to_the_same_host() {
        let throttle = HostThrottle::new(ThrottleConfig::new(Duration::from_millis(100)));

        let start = Instant::now();
        throttle.wait("classiccars.com").await;
        throttle.wait("classiccars.com").await;
        throttle.wait("classiccars.com").await;

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn different_hosts_do_not_wait_on_each_other() {
        let throttle = HostThrottle::new(ThrottleConfig::new(Duration::from_millis(200)));

        let start = Instant::now();
        throttle.wait("classiccars.com").await;
        throttle.wait("www.hemmings.com").await;

        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_get_distinct_slots() {
        let throttle = HostThrottle::new(ThrottleConfig::new(Duration::from_millis(100)));

        let start = Instant::now();
        let waits = (0..3).map(|_| {
            let t = throttle.clone();
            async move {
                t.wait("bringatrailer.com").await;
                Instant::now()
            }
        });
        let mut finished = futures::future::join_all(waits).await;
        finished.sort();

        assert!(finished[1] - finished[0] >= Duration::from_millis(100));
        assert!(finished[2] - finished[1] >= Duration::from_millis(100));
        assert!(finished[2] - start >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn disabled_throttle_never_sleeps() {
        let throttle = HostThrottle::new(ThrottleConfig::disabled());
        let start = Instant::now();
        for _ in 0..10 {
            throttle.wait("classiccars.com").await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
