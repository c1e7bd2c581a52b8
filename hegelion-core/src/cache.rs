//! Bounded result cache with per-entry TTL.
//!
//! Keys are a stable SHA-256 hash over the normalized query text plus the
//! full option set, so logically identical queries with different options
//! occupy distinct entries. Expiry is checked lazily at read time; a
//! least-recently-used bound prevents unbounded growth. The cache tolerates
//! racing misses: two callers computing the same key in parallel is
//! duplicated work, not a correctness violation.

use crate::types::{HegelionResult, QueryOptions};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Configuration for the result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Enable result caching (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum number of entries before LRU eviction (default: 128).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Entry time-to-live in seconds (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_capacity() -> usize {
    128
}
fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheSettings {
    /// The configured TTL as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

struct CacheEntry {
    value: HegelionResult,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// Shared, bounded, TTL-aware store of completed results.
pub struct ResultCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    enabled: bool,
}

impl ResultCache {
    /// Create a cache with the given settings.
    pub fn new(settings: &CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            enabled: settings.enabled,
        }
    }

    /// Look up a key. Expired entries are evicted and reported as absent.
    pub fn get(&self, key: &str) -> Option<HegelionResult> {
        if !self.enabled {
            return None;
        }
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            // A poisoned lock is treated as cache-unavailable: proceed as a miss.
            Err(_) => return None,
        };
        match inner.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!(key, "Cache entry expired, evicting");
                inner.pop(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Insert a freshly computed result with the given TTL.
    pub fn put(&self, key: String, value: HegelionResult, ttl: Duration) {
        if !self.enabled {
            return;
        }
        // A poisoned lock makes the write a no-op; the run still succeeds.
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(
                key,
                CacheEntry {
                    value,
                    created_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    /// Current entry count (expired entries included until next read).
    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.len()).unwrap_or(0)
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compute the stable cache key for a query.
///
/// The text is normalized (trimmed, lowercased, inner whitespace collapsed)
/// so trivial reformattings of the same question share an entry; every
/// option field participates so differing option sets never collide.
pub fn cache_key(text: &str, options: &QueryOptions) -> String {
    let normalized = normalize(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update([options.use_council as u8]);
    hasher.update([options.use_judge as u8]);
    hasher.update([options.use_search as u8]);
    hasher.update(options.response_style.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(options.max_tokens_per_phase.to_le_bytes());
    hasher.update(options.iterations.to_le_bytes());
    hex_encode(&hasher.finalize())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
