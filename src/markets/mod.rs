//! Market source integration.
//!
//! Defines the `MarketSource` trait and the caching hub the scheduler
//! talks to. The hub owns the 60-second snapshot cache: within the
//! freshness window every caller receives the same list by identity,
//! and an upstream failure degrades to the last successful snapshot
//! instead of surfacing an error.

pub mod polymarket;
pub mod sim;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::warn;

use crate::cache::TtlCell;
use crate::observability::Counters;
use crate::types::Market;

/// Abstraction over the external binary-market source.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetch and normalize all current markets.
    async fn fetch_markets(&self) -> Result<Vec<Market>>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}

/// Caching front for the market source.
pub struct MarketHub {
    source: Arc<dyn MarketSource>,
    cache: TtlCell<Vec<Market>>,
    counters: Arc<Counters>,
}

impl MarketHub {
    pub fn new(source: Arc<dyn MarketSource>, ttl: Duration, counters: Arc<Counters>) -> Self {
        Self {
            source,
            cache: TtlCell::new(ttl),
            counters,
        }
    }

    /// The current market snapshot.
    ///
    /// Within the freshness window this returns the cached list by
    /// identity. On refresh failure it returns the stale snapshot, or an
    /// empty list when no snapshot exists yet; the failure is counted,
    /// never raised.
    pub async fn fetch_all_markets(&self, now: DateTime<Utc>) -> Arc<Vec<Market>> {
        if let Some(fresh) = self.cache.get_fresh(now) {
            self.counters.market_cache_hits.fetch_add(1, Ordering::Relaxed);
            return fresh;
        }
        self.counters
            .market_cache_misses
            .fetch_add(1, Ordering::Relaxed);

        match self.source.fetch_markets().await {
            Ok(markets) => {
                self.counters.record_market_fetch_ok();
                self.cache.put(markets, now)
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Market fetch failed, serving stale snapshot");
                self.counters.record_market_fetch_failure();
                self.cache
                    .get_stale(now)
                    .unwrap_or_else(|| Arc::new(Vec::new()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
