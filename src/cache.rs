//! Layered caches.
//!
//! Every cached entry stores its absolute creation time and is checked
//! against a TTL at read time; no background eviction, no timers.
//! Concurrent reads are allowed; writes are serialized per cache.
//! An expired entry is indistinguishable from an absent one.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::types::{AgentId, Trade};

// ---------------------------------------------------------------------------
// Snapshot cache (markets, news)
// ---------------------------------------------------------------------------

/// Single-value snapshot cache. Within the freshness window all readers
/// receive the same `Arc`: identical inputs for every consumer of one
/// cycle. The stale value is retained past expiry so adapters can fall
/// back to it when the upstream fails.
pub struct TtlCell<T> {
    ttl: Duration,
    slot: RwLock<Option<(Arc<T>, DateTime<Utc>)>>,
}

impl<T> TtlCell<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
        }
    }

    /// The cached value, if still within the freshness window.
    pub fn get_fresh(&self, now: DateTime<Utc>) -> Option<Arc<T>> {
        let slot = self.slot.read().unwrap();
        slot.as_ref().and_then(|(value, cached_at)| {
            if now - *cached_at < self.ttl {
                Some(Arc::clone(value))
            } else {
                None
            }
        })
    }

    /// The cached value regardless of age. Degraded-mode reads only.
    pub fn get_stale(&self, _now: DateTime<Utc>) -> Option<Arc<T>> {
        let slot = self.slot.read().unwrap();
        slot.as_ref().map(|(value, _)| Arc::clone(value))
    }

    pub fn put(&self, value: T, now: DateTime<Utc>) -> Arc<T> {
        let arc = Arc::new(value);
        *self.slot.write().unwrap() = Some((Arc::clone(&arc), now));
        arc
    }

    pub fn clear(&self) {
        *self.slot.write().unwrap() = None;
    }
}

// ---------------------------------------------------------------------------
// Keyed TTL map (AI decisions)
// ---------------------------------------------------------------------------

/// String-keyed TTL cache. Used for per-`agent:market` AI decisions.
pub struct TtlMap<V: Clone> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (V, DateTime<Utc>)>>,
}

impl<V: Clone> TtlMap<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let entries = self.entries.read().unwrap();
        entries.get(key).and_then(|(value, cached_at)| {
            if now - *cached_at < self.ttl {
                Some(value.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, key: String, value: V, now: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap();
        // Opportunistic sweep keeps the map from accumulating dead keys.
        entries.retain(|_, (_, cached_at)| now - *cached_at < self.ttl);
        entries.insert(key, (value, now));
    }

    pub fn len(&self, now: DateTime<Utc>) -> usize {
        let entries = self.entries.read().unwrap();
        entries
            .values()
            .filter(|(_, cached_at)| now - *cached_at < self.ttl)
            .count()
    }

    pub fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.len(now) == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Agent trade-set cache
// ---------------------------------------------------------------------------

/// Age below which an empty cached trade set is treated as a transient
/// artifact (e.g. a cycle racing the first open) and reported as a miss.
const EMPTY_SET_GRACE_SECS: i64 = 10;

struct TradeSetEntry {
    trades: Vec<Trade>,
    generated_at: DateTime<Utc>,
    sorted_market_ids: Vec<String>,
}

/// Per-agent memoized trade set. A hit requires the entry to be fresh
/// AND the caller's current market-id fingerprint to match the one the
/// entry was generated against.
pub struct TradeSetCache {
    ttl: Duration,
    entries: RwLock<HashMap<AgentId, TradeSetEntry>>,
}

impl TradeSetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Sort-and-dedup a market id list into the fingerprint form.
    pub fn fingerprint(market_ids: &[String]) -> Vec<String> {
        let mut ids = market_ids.to_vec();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn get(
        &self,
        agent_id: AgentId,
        current_sorted_ids: &[String],
        now: DateTime<Utc>,
    ) -> Option<Vec<Trade>> {
        let entries = self.entries.read().unwrap();
        let entry = entries.get(&agent_id)?;

        if now - entry.generated_at >= self.ttl {
            return None;
        }
        if entry.sorted_market_ids != current_sorted_ids {
            return None;
        }
        // An empty set younger than the grace window is transient.
        if entry.trades.is_empty()
            && (now - entry.generated_at).num_seconds() < EMPTY_SET_GRACE_SECS
        {
            return None;
        }
        Some(entry.trades.clone())
    }

    pub fn put(
        &self,
        agent_id: AgentId,
        trades: Vec<Trade>,
        sorted_market_ids: Vec<String>,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            agent_id,
            TradeSetEntry {
                trades,
                generated_at: now,
                sorted_market_ids,
            },
        );
    }

    /// Explicit invalidation on mutation events.
    pub fn invalidate(&self, agent_id: AgentId) {
        self.entries.write().unwrap().remove(&agent_id);
    }

    pub fn invalidate_all(&self) {
        self.entries.write().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
