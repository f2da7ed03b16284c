// =============================================================================
// In-memory key/value cache — hot lookups backed by the persistence store
// =============================================================================
//
// Grounded on the reference `CandleBuffer`'s `RwLock<HashMap<..>>` pattern:
// the cache is advisory, never the source of truth, and TTL-gated reads fall
// through to the caller rather than returning stale data silently.
// =============================================================================

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A TTL-aware cache keyed by `String`. One instance is shared across the
/// engine for latest ticks; a second, shorter-TTL instance holds indicator
/// bundles (`indicator:{instrument}:{timeframe}:{name}`, 15 s TTL per §4.3).
pub struct TtlCache<V: Clone> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn put(&self, key: impl Into<String>, value: V) {
        self.entries.write().insert(
            key.into(),
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Returns the value if present and not older than the configured TTL.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bundle of the caches the engine needs: latest tick per instrument (no TTL
/// eviction — always the newest observed, per §4.2) and indicator values
/// (15 s TTL, §4.3).
pub struct Caches {
    pub latest_tick: TtlCache<crate::db::models::Tick>,
    pub indicators: TtlCache<serde_json::Value>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            // Ticks never "expire" out of the hot cache on their own; the
            // writer replaces the entry on every newer tick. A long TTL just
            // bounds staleness if a feed goes dark.
            latest_tick: TtlCache::new(Duration::from_secs(3600)),
            indicators: TtlCache::new(Duration::from_secs(15)),
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}
