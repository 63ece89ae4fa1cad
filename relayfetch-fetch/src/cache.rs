//! Classification cache.
//!
//! Identical failures against the same URL tend to repeat across retries and
//! across requests. The cache keeps recent classifications under a size bound
//! (least-recently-used eviction) and a per-entry time-to-live.
//!
//! All operations take one short lock and never perform I/O while holding it.

use lru::LruCache;
use relayfetch_core::ErrorClassification;
use ring::digest::{SHA256, digest};
use serde::Serialize;
use std::fmt::Write as _;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::classifier::ErrorClassifier;
use crate::error::FetchError;

/// Default number of cached classifications.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default time-to-live when a classification does not carry one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Characters of the error message that take part in the key.
const KEY_MESSAGE_CHARS: usize = 200;

// ============================================================================
// Cache Entry
// ============================================================================

/// A cached classification.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached verdict.
    pub classification: ErrorClassification,
    /// When the entry was stored.
    pub created_at: Instant,
    /// How long the entry stays valid.
    pub ttl: Duration,
}

impl CacheEntry {
    fn new(classification: ErrorClassification, ttl: Duration) -> Self {
        Self {
            classification,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Returns true once `now` is past the entry's lifetime.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    /// Returns true if the entry has outlived its ttl.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

// ============================================================================
// Cache Metrics
// ============================================================================

/// Counters for cache lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheMetrics {
    /// Number of `get` calls.
    pub total_requests: u64,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed or found an expired entry.
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
}

impl CacheMetrics {
    /// Hit rate as a percentage, 0 when nothing was looked up yet.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64 * 100.0
        }
    }
}

// ============================================================================
// Classification Cache
// ============================================================================

struct CacheState {
    entries: LruCache<String, CacheEntry>,
    metrics: CacheMetrics,
}

/// Size- and time-bounded store of classifications.
pub struct ClassificationCache {
    state: Mutex<CacheState>,
    max_size: NonZeroUsize,
    default_ttl: Duration,
}

impl ClassificationCache {
    /// Creates a cache holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        let max_size = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_size),
                metrics: CacheMetrics::default(),
            }),
            max_size,
            default_ttl,
        }
    }

    /// Stable key for a failure against a URL.
    ///
    /// SHA-256 over the error kind, the first 200 characters of the message
    /// and the URL, hex-encoded. A `Retry-After` value is part of the
    /// message, since it changes the verdict's wait.
    pub fn key(error: &FetchError, url: &str) -> String {
        let mut message = error.to_string();
        if let Some(secs) = error.retry_after() {
            let _ = write!(message, " retry-after={secs}");
        }
        Self::key_parts(error.kind_name(), &message, url)
    }

    /// Key from already-rendered parts.
    pub fn key_parts(kind: &str, message: &str, url: &str) -> String {
        let message: String = message.chars().take(KEY_MESSAGE_CHARS).collect();
        let material = format!("{kind}|{message}|{url}");
        let hash = digest(&SHA256, material.as_bytes());
        hash.as_ref()
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a classification.
    ///
    /// A hit marks the entry most recently used. An expired entry is removed
    /// and counted as a miss.
    pub fn get(&self, key: &str) -> Option<ErrorClassification> {
        let now = Instant::now();
        let mut state = self.lock();
        state.metrics.total_requests += 1;

        let expired = state.entries.peek(key).map(|e| e.is_expired_at(now));
        match expired {
            Some(false) => {
                state.metrics.hits += 1;
                state.entries.get(key).map(|e| e.classification.clone())
            }
            Some(true) => {
                state.entries.pop(key);
                state.metrics.misses += 1;
                trace!(key, "Cache entry expired");
                None
            }
            None => {
                state.metrics.misses += 1;
                None
            }
        }
    }

    /// Stores a classification.
    ///
    /// `ttl` defaults to the classification's own cache duration, then to the
    /// cache default. Inserting a new key into a full cache evicts the least
    /// recently used entry first.
    pub fn put(&self, key: impl Into<String>, classification: ErrorClassification, ttl: Option<Duration>) {
        let ttl = ttl
            .or_else(|| classification.cache_duration())
            .unwrap_or(self.default_ttl);
        let key = key.into();
        let mut state = self.lock();

        if !state.entries.contains(&key) && state.entries.len() >= self.max_size.get() {
            if let Some((evicted, _)) = state.entries.pop_lru() {
                state.metrics.evictions += 1;
                trace!(key = %evicted, "Evicted least recently used classification");
            }
        }
        state.entries.put(key, CacheEntry::new(classification, ttl));
    }

    /// Removes every expired entry regardless of recency. Returns how many.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        expired.len()
    }

    /// Snapshot of the counters.
    pub fn get_metrics(&self) -> CacheMetrics {
        self.lock().metrics
    }

    /// Drops all entries and resets the counters.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.metrics = CacheMetrics::default();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs [`cleanup_expired`](Self::cleanup_expired) every `interval` on the
    /// tokio runtime until the handle is aborted.
    pub fn spawn_cleanup(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            // First tick fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Removed expired classifications");
                }
            }
        })
    }
}

impl Default for ClassificationCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

impl std::fmt::Debug for ClassificationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassificationCache")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

// ============================================================================
// Cached Classifier
// ============================================================================

/// Classifier fronted by the cache.
#[derive(Debug, Clone)]
pub struct CachedClassifier {
    classifier: ErrorClassifier,
    cache: Arc<ClassificationCache>,
}

impl CachedClassifier {
    /// Creates a cached classifier.
    pub fn new(classifier: ErrorClassifier, cache: Arc<ClassificationCache>) -> Self {
        Self { classifier, cache }
    }

    /// Classifies a failure, answering from the cache when possible.
    pub fn classify(&self, error: &FetchError, url: &str) -> ErrorClassification {
        let key = ClassificationCache::key(error, url);
        if let Some(hit) = self.cache.get(&key) {
            trace!(error_type = %hit.error_type(), "Classification cache hit");
            return hit;
        }
        let classification = self.classifier.classify(error, url);
        self.cache.put(key, classification.clone(), None);
        classification
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<ClassificationCache> {
        &self.cache
    }

    /// Current hit rate of the underlying cache.
    pub fn hit_rate(&self) -> f64 {
        self.cache.get_metrics().hit_rate()
    }
}

impl Default for CachedClassifier {
    fn default() -> Self {
        Self::new(ErrorClassifier::new(), Arc::new(ClassificationCache::default()))
    }
}

// ============================================================================
// Tests
// ============================================================================
