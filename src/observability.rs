//! Observability: cycle records, process counters, alert predicates.
//!
//! The scheduler emits one structured record per agent per cycle; the
//! counters are process-wide atomics updated by the adapters and the
//! engine. Alert predicates are pure functions over these so they can
//! be evaluated (and tested) without a metrics backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{AgentId, AgentPortfolio};

// ---------------------------------------------------------------------------
// Cycle records
// ---------------------------------------------------------------------------

/// One agent's outcome for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCycleRecord {
    pub agent_id: AgentId,
    pub candidate_markets: usize,
    pub new_trades: usize,
    pub closed_trades: usize,
    pub open_positions: usize,
    pub cycle_ms: u64,
    /// Set when the agent's cycle failed; siblings are unaffected.
    pub error: Option<String>,
}

impl AgentCycleRecord {
    pub fn failed(agent_id: AgentId, cycle_ms: u64, error: String) -> Self {
        Self {
            agent_id,
            candidate_markets: 0,
            new_trades: 0,
            closed_trades: 0,
            open_positions: 0,
            cycle_ms,
            error: Some(error),
        }
    }
}

/// The full record of one scheduler cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_number: u64,
    pub started_at: DateTime<Utc>,
    pub markets_fetched: usize,
    pub news_fetched: usize,
    pub agents: Vec<AgentCycleRecord>,
    pub cycle_ms: u64,
}

impl CycleRecord {
    pub fn total_new_trades(&self) -> usize {
        self.agents.iter().map(|a| a.new_trades).sum()
    }

    pub fn total_closed_trades(&self) -> usize {
        self.agents.iter().map(|a| a.closed_trades).sum()
    }

    pub fn failed_agents(&self) -> usize {
        self.agents.iter().filter(|a| a.error.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Process-wide counters. Cheap to update from any task.
#[derive(Debug, Default)]
pub struct Counters {
    pub cycles_run: AtomicU64,
    pub cycles_skipped: AtomicU64,
    pub market_cache_hits: AtomicU64,
    pub market_cache_misses: AtomicU64,
    pub news_cache_hits: AtomicU64,
    pub news_cache_misses: AtomicU64,
    pub decision_cache_hits: AtomicU64,
    pub decision_cache_misses: AtomicU64,
    pub trade_cache_hits: AtomicU64,
    pub trade_cache_misses: AtomicU64,
    pub market_fetch_failures: AtomicU64,
    /// Reset to zero on every successful market fetch.
    pub consecutive_market_failures: AtomicU64,
    pub news_provider_failures: AtomicU64,
    pub rejected_market_records: AtomicU64,
    pub llm_failures: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_market_fetch_ok(&self) {
        self.consecutive_market_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_market_fetch_failure(&self) {
        self.market_fetch_failures.fetch_add(1, Ordering::Relaxed);
        self.consecutive_market_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Hit ratio for a hit/miss counter pair; 0.0 when no samples.
    pub fn hit_ratio(hits: &AtomicU64, misses: &AtomicU64) -> f64 {
        let h = hits.load(Ordering::Relaxed) as f64;
        let m = misses.load(Ordering::Relaxed) as f64;
        if h + m == 0.0 {
            0.0
        } else {
            h / (h + m)
        }
    }
}

/// Point-in-time export of the counters, for logging and the read API.
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub market_cache_hit_ratio: f64,
    pub news_cache_hit_ratio: f64,
    pub decision_cache_hit_ratio: f64,
    pub trade_cache_hit_ratio: f64,
    pub market_fetch_failures: u64,
    pub consecutive_market_failures: u64,
    pub news_provider_failures: u64,
    pub rejected_market_records: u64,
    pub llm_failures: u64,
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            cycles_run: self.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.cycles_skipped.load(Ordering::Relaxed),
            market_cache_hit_ratio: Self::hit_ratio(
                &self.market_cache_hits,
                &self.market_cache_misses,
            ),
            news_cache_hit_ratio: Self::hit_ratio(&self.news_cache_hits, &self.news_cache_misses),
            decision_cache_hit_ratio: Self::hit_ratio(
                &self.decision_cache_hits,
                &self.decision_cache_misses,
            ),
            trade_cache_hit_ratio: Self::hit_ratio(
                &self.trade_cache_hits,
                &self.trade_cache_misses,
            ),
            market_fetch_failures: self.market_fetch_failures.load(Ordering::Relaxed),
            consecutive_market_failures: self.consecutive_market_failures.load(Ordering::Relaxed),
            news_provider_failures: self.news_provider_failures.load(Ordering::Relaxed),
            rejected_market_records: self.rejected_market_records.load(Ordering::Relaxed),
            llm_failures: self.llm_failures.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Alert predicates
// ---------------------------------------------------------------------------

/// N consecutive market-source failures.
pub fn adapter_failure_alert(counters: &Counters, threshold: u64) -> bool {
    counters.consecutive_market_failures.load(Ordering::Relaxed) >= threshold
}

/// Every agent saw zero candidate markets in all of the given records.
/// Checked over the recent record window by the caller.
pub fn zero_candidate_alert(records: &[CycleRecord]) -> bool {
    !records.is_empty()
        && records
            .iter()
            .all(|r| r.agents.iter().all(|a| a.candidate_markets == 0))
}

/// Any agent at or above the max-drawdown stop.
pub fn drawdown_stop_alert(portfolios: &[AgentPortfolio], stop_pct: f64) -> bool {
    portfolios.iter().any(|p| p.max_drawdown_pct() >= stop_pct)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
