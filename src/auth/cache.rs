//! Bounded TTL cache of verified identities
//!
//! Entries are keyed by a SHA-256 fingerprint of the bearer token so the raw
//! credential never sits in memory longer than one request. Expired entries
//! are evicted lazily on lookup; [`TokenCache::evict_expired`] performs a full
//! sweep and is also run whenever an insert would exceed capacity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::Identity;

/// Default entry lifetime
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
/// Default maximum number of entries
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bytes of the SHA-256 digest kept in a [`CacheKey`].
///
/// 128 bits is ample for collision resistance across a token cache; the
/// truncation is a deliberate precision loss.
const FINGERPRINT_BYTES: usize = 16;

/// Fixed-length fingerprint of a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint a raw token
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        Self(hex::encode(&digest[..FINGERPRINT_BYTES]))
    }

    /// Hex fingerprint, safe to log
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct CacheEntry {
    identity: Identity,
    inserted_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() >= ttl
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Thread-safe identity cache shared by all request tasks
pub struct TokenCache {
    entries: DashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    stats: CacheStats,
}

impl TokenCache {
    /// Create a cache. A zero `ttl` disables caching; a zero `capacity` is
    /// treated as one.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Whether entries are ever stored
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Configured entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up the identity cached for `token`.
    ///
    /// An expired entry counts as a miss and is removed.
    pub fn get(&self, token: &str) -> Option<Identity> {
        if !self.is_enabled() {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let key = CacheKey::from_token(token);
        let Some(entry) = self.entries.get(&key) else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.is_expired(self.ttl) {
            drop(entry);
            // Re-check under the write lock; a concurrent put may have refreshed it.
            if self
                .entries
                .remove_if(&key, |_, e| e.is_expired(self.ttl))
                .is_some()
            {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.stats.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.identity.clone())
    }

    /// Cache `identity` for `token`. No-op when caching is disabled.
    pub fn put(&self, token: &str, identity: Identity) {
        if !self.is_enabled() {
            return;
        }

        let key = CacheKey::from_token(token);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.make_room();
        }

        self.entries.insert(
            key,
            CacheEntry {
                identity,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current entry count, including not-yet-swept expired entries
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Remove all expired entries, returning how many were dropped
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(self.ttl));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.stats
                .evictions
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Statistics snapshot
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        CacheStatsSnapshot {
            hits,
            misses,
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
            hit_rate: hit_rate(hits, misses),
        }
    }

    /// Sweep expired entries, then drop the oldest until under capacity.
    fn make_room(&self) {
        self.evict_expired();

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().inserted_at)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else { break };
            if self.entries.remove(&key).is_some() {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}

#[allow(clippy::cast_precision_loss)]
fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Total evictions (expired or over capacity)
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}
