//! TTL cache for idempotent GET responses
//!
//! Keys have the form `METHOD path?query`. Any successful mutating request
//! clears the whole cache, since one write can change many listings.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable/disable caching
    pub enabled: bool,
    /// Entry lifetime in seconds
    pub ttl_seconds: u64,
    /// Maximum number of cached responses
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: 300,
            max_entries: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Cache entry with expiration time
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Bounded TTL cache shared by all requests of one client
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
    /// Bumped by every invalidation
    generation: AtomicU64,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.max_entries > 0 && self.config.ttl_seconds > 0
    }

    /// Cache key for a request
    pub fn key(method: &str, path: &str, query: &[(String, String)]) -> String {
        let mut key = format!("{} {}", method.to_uppercase(), path);
        if !query.is_empty() {
            let encoded = query
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            key.push('?');
            key.push_str(&encoded);
        }
        key
    }

    /// Unexpired value for `key`
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.value.clone())
            }
        });
        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        } else {
            debug!(key = key, "Response cache hit");
        }
        hit
    }

    /// Generation to pass to [`ResponseCache::insert_if_current`] once the response arrives
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation happened after `generation` was read
    pub fn insert_if_current(&self, key: String, value: Value, generation: u64) -> bool {
        if self.generation() != generation {
            debug!(key = %key, "Response fetched before an invalidation, not cached");
            return false;
        }
        self.insert(key, value);
        true
    }

    /// Store `value`, evicting expired entries and then the oldest when full
    pub fn insert(&self, key: String, value: Value) {
        if !self.is_enabled() {
            return;
        }
        if self.entries.len() >= self.config.max_entries && !self.entries.contains_key(&key) {
            let now = Instant::now();
            self.entries.retain(|_, entry| !entry.is_expired(now));

            while self.entries.len() >= self.config.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.created_at)
                    .map(|entry| entry.key().clone());
                match oldest {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
        self.entries.insert(key, CacheEntry::new(value, self.config.ttl()));
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "Response cache invalidated");
            self.entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
