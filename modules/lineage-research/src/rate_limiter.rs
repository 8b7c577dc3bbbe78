//! Per-source rate limiting with retry.
//!
//! `wait` enforces a minimum spacing between requests to the same source;
//! `retry_with_backoff` layers Retry-After-aware retries on top. The lock
//! covers only the per-source map. Sleeps happen outside it, and each
//! caller reserves its slot before sleeping so concurrent workers space
//! out instead of stampeding when the lock releases.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
// tokio's Instant so paused-clock tests see the same time the sleeps do.
use tokio::time::Instant;
use tracing::warn;

use crate::fetch::FetchError;

const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Default)]
struct SourceState {
    last_request: Option<Instant>,
    request_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    pub request_count: u64,
}

pub struct RateLimiter {
    min_delay: Duration,
    max_retries: u32,
    backoff_factor: f64,
    state: Mutex<HashMap<String, SourceState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_MIN_DELAY, DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_FACTOR)
    }

    pub fn with_params(min_delay: Duration, max_retries: u32, backoff_factor: f64) -> Self {
        Self { min_delay, max_retries, backoff_factor, state: Mutex::new(HashMap::new()) }
    }

    /// Block until at least `min_delay` has passed since this source's
    /// previous request, then stamp the slot taken.
    pub async fn wait(&self, source: &str) {
        let delay = {
            let mut state = self.state.lock().await;
            let entry = state.entry(source.to_string()).or_default();
            let now = Instant::now();
            let slot = match entry.last_request {
                Some(last) if now.duration_since(last) < self.min_delay => last + self.min_delay,
                _ => now,
            };
            entry.last_request = Some(slot);
            entry.request_count += 1;
            slot.saturating_duration_since(now)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `op` under the rate gate, retrying rate-limit failures with
    /// either the server's `Retry-After` value or exponential backoff.
    /// Any other failure surfaces immediately.
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        source: &str,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            self.wait(source).await;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_rate_limit() {
                return Err(error);
            }

            let backoff =
                self.min_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32 + 1);
            let wait_secs = match &error {
                FetchError::RateLimited { retry_after: Some(seconds), .. } => {
                    warn!(source, seconds, "Rate limited, honoring Retry-After");
                    *seconds
                }
                _ => {
                    warn!(
                        source,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        wait_secs = backoff,
                        "Rate limited, backing off"
                    );
                    backoff
                }
            };
            tokio::time::sleep(Duration::from_secs_f64(wait_secs)).await;
            last_error = Some(error);
        }

        warn!(source, retries = self.max_retries, "All retries exhausted");
        Err(last_error
            .unwrap_or_else(|| FetchError::Other(format!("{source}: all retries exhausted"))))
    }

    pub async fn stats(&self, source: &str) -> SourceStats {
        let state = self.state.lock().await;
        SourceStats {
            request_count: state.get(source).map(|s| s.request_count).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn wait_spaces_requests() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.wait("geneanet").await;
        limiter.wait("geneanet").await;
        limiter.wait("geneanet").await;
        // Two spacings of 1s each under paused time.
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn request_counts_accumulate_per_source() {
        let limiter = RateLimiter::new();
        limiter.wait("geneanet").await;
        limiter.wait("geneanet").await;
        limiter.wait("anom").await;
        assert_eq!(limiter.stats("geneanet").await.request_count, 2);
        assert_eq!(limiter.stats("anom").await.request_count, 1);
        assert_eq!(limiter.stats("never-touched").await.request_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_are_independent() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.wait("geneanet").await;
        limiter.wait("findagrave").await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_then_succeeds() {
        let limiter = RateLimiter::new();
        let calls = AtomicU32::new(0);
        let result = limiter
            .retry_with_backoff("wikitree", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FetchError::RateLimited { retry_after: None, message: "429".into() })
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limitish_message_is_retried() {
        let limiter = RateLimiter::with_params(Duration::from_millis(10), 3, 2.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = limiter
            .retry_with_backoff("geni", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Other("server said too many requests".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_error_fails_fast() {
        let limiter = RateLimiter::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = limiter
            .retry_with_backoff("ancestry", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Other("connection refused".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_check_is_never_retried() {
        let limiter = RateLimiter::new();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = limiter
            .retry_with_backoff("ancestry", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::BotCheck { source_name: "Ancestry".into() }) }
            })
            .await;
        assert!(matches!(result, Err(FetchError::BotCheck { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
