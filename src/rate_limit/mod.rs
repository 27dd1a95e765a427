//! Token bucket rate limiting for outbound API calls
//!
//! Every key owns an independent bucket that refills continuously at
//! `capacity / window`. Refill is computed lazily on access, so there is no
//! background task. The `"global"` key is only special at call sites: the API
//! client consumes from it on every request.

use crate::error::{ProductboardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Key of the bucket shared by every outbound request
pub const GLOBAL_KEY: &str = "global";

// Absorbs float drift after sleeping exactly the computed refill time.
const TOKEN_EPSILON: f64 = 1e-9;

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Capacity of the global bucket and of any key without an override
    pub global_limit: u32,
    /// Refill window shared by all buckets (in seconds)
    pub window_seconds: u64,
    /// Per-tool capacity overrides
    pub tool_limits: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global_limit: 60,
            window_seconds: 60,
            tool_limits: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Refill window as a `Duration`
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }

    /// Reject configurations that would make `wait_for_slot` hang forever
    pub fn validate(&self) -> Result<()> {
        if self.window_seconds == 0 {
            return Err(ProductboardError::config("Rate limit window must be greater than zero"));
        }
        if self.global_limit == 0 {
            return Err(ProductboardError::config("Global rate limit must be greater than zero"));
        }
        if let Some((tool, _)) = self.tool_limits.iter().find(|(_, limit)| **limit == 0) {
            return Err(ProductboardError::config(format!(
                "Rate limit for tool '{}' must be greater than zero",
                tool
            )));
        }
        Ok(())
    }
}

/// Snapshot of a bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitUsage {
    /// Bucket capacity
    pub limit: u32,
    /// Whole tokens currently available
    pub remaining: u32,
    /// When the bucket will be full again
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    last_refill_at: Instant,
}

impl Bucket {
    fn new(capacity: u32, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            last_refill_at: now,
        }
    }

    fn refill(&mut self, now: Instant, window: Duration) {
        let elapsed = now.saturating_duration_since(self.last_refill_at);
        let capacity = self.capacity as f64;
        if window.is_zero() {
            self.tokens = capacity;
        } else {
            let added = elapsed.as_secs_f64() / window.as_secs_f64() * capacity;
            self.tokens = (self.tokens + added).clamp(0.0, capacity);
        }
        self.last_refill_at = now;
    }

    fn has_token(&self) -> bool {
        self.tokens + TOKEN_EPSILON >= 1.0
    }

    fn take(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Time until one token is available, `None` when it never will be
    fn time_until_token(&self, window: Duration) -> Option<Duration> {
        if self.has_token() {
            return Some(Duration::ZERO);
        }
        if self.capacity == 0 {
            return None;
        }
        let missing = 1.0 - self.tokens;
        Some(window.mul_f64(missing / self.capacity as f64))
    }

    fn time_until_full(&self, window: Duration) -> Duration {
        if self.capacity == 0 {
            return Duration::ZERO;
        }
        let missing = (self.capacity as f64 - self.tokens).max(0.0);
        window.mul_f64(missing / self.capacity as f64)
    }
}

/// Per-key token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimitConfig) -> Self {
        info!(
            global_limit = config.global_limit,
            window_seconds = config.window_seconds,
            tool_overrides = config.tool_limits.len(),
            "Rate limiter initialized"
        );
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Capacity used for `key`: its override if configured, else the global capacity
    pub fn capacity_for(&self, key: &str) -> u32 {
        self.config
            .tool_limits
            .get(key)
            .copied()
            .unwrap_or(self.config.global_limit)
    }

    /// Whether `key` has its own configured capacity
    pub fn has_override(&self, key: &str) -> bool {
        self.config.tool_limits.contains_key(key)
    }

    // Mutations never span an await, so a poisoned lock still holds a consistent map.
    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_bucket<R>(&self, key: &str, f: impl FnOnce(&mut Bucket, Duration) -> R) -> R {
        let now = Instant::now();
        let window = self.config.window();
        let capacity = self.capacity_for(key);
        let mut buckets = self.lock_buckets();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(capacity, now));
        bucket.refill(now, window);
        f(bucket, window)
    }

    /// Non-blocking peek: is a token available for `key`? Does not consume.
    pub fn check_limit(&self, key: &str) -> bool {
        self.with_bucket(key, |bucket, _| bucket.has_token())
    }

    /// Consume one token for `key`, sleeping until one is available
    ///
    /// Fails fast with a configuration error when the bucket can never refill.
    pub async fn wait_for_slot(&self, key: &str) -> Result<()> {
        loop {
            let wait = self.with_bucket(key, |bucket, window| {
                if bucket.has_token() {
                    bucket.take();
                    Ok(None)
                } else {
                    bucket.time_until_token(window).map(Some).ok_or_else(|| {
                        ProductboardError::config(format!(
                            "Rate limit for '{}' has zero capacity; no request can ever proceed",
                            key
                        ))
                    })
                }
            })?;

            match wait {
                None => return Ok(()),
                Some(delay) => {
                    debug!(key = key, delay_ms = delay.as_millis() as u64, "Waiting for rate limit slot");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Current usage for `key`
    pub fn usage(&self, key: &str) -> RateLimitUsage {
        let (limit, tokens, until_full) = self.with_bucket(key, |bucket, window| {
            (bucket.capacity, bucket.tokens, bucket.time_until_full(window))
        });
        let until_full = chrono::Duration::from_std(until_full).unwrap_or_else(|_| chrono::Duration::zero());
        RateLimitUsage {
            limit,
            remaining: (tokens + TOKEN_EPSILON).floor() as u32,
            reset_at: Utc::now() + until_full,
        }
    }

    /// Refill the bucket for `key` to capacity
    pub fn reset(&self, key: &str) {
        let now = Instant::now();
        let capacity = self.capacity_for(key);
        let mut buckets = self.lock_buckets();
        buckets.insert(key.to_string(), Bucket::new(capacity, now));
        debug!(key = key, "Rate limit bucket reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            global_limit: global,
            window_seconds,
            tool_limits: HashMap::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = limiter(5, 1);
        limiter.wait_for_slot(GLOBAL_KEY).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        let usage = limiter.usage(GLOBAL_KEY);
        assert_eq!(usage.limit, 5);
        assert_eq!(usage.remaining, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_capacity() {
        let limiter = limiter(3, 60);
        for _ in 0..3 {
            limiter.wait_for_slot(GLOBAL_KEY).await.unwrap();
        }
        assert_eq!(limiter.usage(GLOBAL_KEY).remaining, 0);
        assert!(!limiter.check_limit(GLOBAL_KEY));

        limiter.reset(GLOBAL_KEY);
        assert_eq!(limiter.usage(GLOBAL_KEY).remaining, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_limit_does_not_consume() {
        let limiter = limiter(1, 60);
        assert!(limiter.check_limit("pb_feature_list"));
        assert!(limiter.check_limit("pb_feature_list"));
        assert_eq!(limiter.usage("pb_feature_list").remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_sleeps_until_refill() {
        let limiter = limiter(2, 1);
        limiter.wait_for_slot(GLOBAL_KEY).await.unwrap();
        limiter.wait_for_slot(GLOBAL_KEY).await.unwrap();

        let start = Instant::now();
        limiter.wait_for_slot(GLOBAL_KEY).await.unwrap();
        let waited = start.elapsed();

        assert!(waited >= Duration::from_millis(499), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(600), "waited {:?}", waited);
        assert_eq!(limiter.usage(GLOBAL_KEY).remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_override_and_independent_buckets() {
        let mut tool_limits = HashMap::new();
        tool_limits.insert("pb_feature_create".to_string(), 1);
        let limiter = RateLimiter::new(RateLimitConfig {
            global_limit: 10,
            window_seconds: 60,
            tool_limits,
        });

        assert!(limiter.has_override("pb_feature_create"));
        assert_eq!(limiter.capacity_for("pb_feature_create"), 1);
        assert_eq!(limiter.capacity_for("pb_note_list"), 10);

        limiter.wait_for_slot("pb_feature_create").await.unwrap();
        assert!(!limiter.check_limit("pb_feature_create"));
        assert!(limiter.check_limit(GLOBAL_KEY));
        assert_eq!(limiter.usage(GLOBAL_KEY).remaining, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_capacity_fails_fast() {
        let mut tool_limits = HashMap::new();
        tool_limits.insert("blocked".to_string(), 0);
        let limiter = RateLimiter::new(RateLimitConfig {
            global_limit: 10,
            window_seconds: 60,
            tool_limits,
        });

        assert!(!limiter.check_limit("blocked"));
        let err = limiter.wait_for_slot("blocked").await.unwrap_err();
        assert!(matches!(err, ProductboardError::Config { .. }));
    }

    #[test]
    fn test_config_validation() {
        assert!(RateLimitConfig::default().validate().is_ok());

        let zero_global = RateLimitConfig {
            global_limit: 0,
            ..Default::default()
        };
        assert!(zero_global.validate().is_err());

        let mut tool_limits = HashMap::new();
        tool_limits.insert("pb_feature_list".to_string(), 0);
        let zero_tool = RateLimitConfig {
            tool_limits,
            ..Default::default()
        };
        assert!(zero_tool.validate().is_err());
    }
}
