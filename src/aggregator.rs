//! Leaderboard and consensus aggregation.
//!
//! Pure read-side derivations over persisted trades and portfolios.
//! Nothing here mutates state; the scheduler snapshots inputs and the
//! read API serves the outputs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{AgentId, AgentPortfolio, Category, ConsensusRecord, Side, Trade};

/// Agreement below this, with both sides populated, marks a conflict.
const CONFLICT_AGREEMENT_THRESHOLD: f64 = 0.60;

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    AllTime,
    Days30,
    Days7,
    Hours24,
}

impl TimeWindow {
    /// The window's inclusive start, `None` for all-time.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeWindow::AllTime => None,
            TimeWindow::Days30 => Some(now - Duration::days(30)),
            TimeWindow::Days7 => Some(now - Duration::days(7)),
            TimeWindow::Hours24 => Some(now - Duration::hours(24)),
        }
    }
}

// ---------------------------------------------------------------------------
// Leaderboard metrics
// ---------------------------------------------------------------------------

/// One agent's leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub agent_id: AgentId,
    pub current_capital_usd: f64,
    pub unrealized_pnl_usd: f64,
    /// Windowed realized PnL as a percentage of starting capital.
    pub pnl_pct: f64,
    /// Fraction of windowed closed trades with positive PnL.
    pub win_rate: f64,
    pub trades_count: usize,
    pub open_count: usize,
    pub closed_count: usize,
    pub best_category: Option<Category>,
    pub worst_category: Option<Category>,
    pub avg_holding_minutes: f64,
    pub max_drawdown_pct: f64,
}

/// Compute one agent's metrics over a time window. Closed trades are
/// windowed by `closed_at`, open trades by `opened_at`.
pub fn agent_metrics(
    portfolio: &AgentPortfolio,
    trades: &[Trade],
    window: TimeWindow,
    now: DateTime<Utc>,
) -> AgentMetrics {
    let since = window.since(now);
    let in_window = |t: Option<DateTime<Utc>>| match (since, t) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(since), Some(t)) => t >= since,
    };

    let closed: Vec<&Trade> = trades
        .iter()
        .filter(|t| !t.is_open() && in_window(t.closed_at))
        .collect();
    let open: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.is_open() && in_window(Some(t.opened_at)))
        .collect();

    let wins = closed
        .iter()
        .filter(|t| t.pnl_usd.unwrap_or(0.0) > 0.0)
        .count();
    let win_rate = if closed.is_empty() {
        0.0
    } else {
        wins as f64 / closed.len() as f64
    };

    let windowed_pnl: f64 = closed.iter().filter_map(|t| t.pnl_usd).sum();
    let pnl_pct = if portfolio.starting_capital_usd > 0.0 {
        windowed_pnl / portfolio.starting_capital_usd * 100.0
    } else {
        0.0
    };

    let mut by_category: HashMap<Category, f64> = HashMap::new();
    for trade in &closed {
        *by_category.entry(trade.category).or_insert(0.0) += trade.pnl_usd.unwrap_or(0.0);
    }
    let best_category = by_category
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(category, _)| *category);
    let worst_category = by_category
        .iter()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(category, _)| *category);

    let holding_minutes: Vec<f64> = closed
        .iter()
        .filter_map(|t| {
            t.closed_at
                .map(|c| (c - t.opened_at).num_minutes() as f64)
        })
        .collect();
    let avg_holding_minutes = if holding_minutes.is_empty() {
        0.0
    } else {
        holding_minutes.iter().sum::<f64>() / holding_minutes.len() as f64
    };

    AgentMetrics {
        agent_id: portfolio.agent_id,
        current_capital_usd: portfolio.current_capital_usd(),
        unrealized_pnl_usd: portfolio.unrealized_pnl_usd,
        pnl_pct,
        win_rate,
        trades_count: closed.len() + open.len(),
        open_count: open.len(),
        closed_count: closed.len(),
        best_category,
        worst_category,
        avg_holding_minutes,
        max_drawdown_pct: portfolio.max_drawdown_pct(),
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Build consensus records from the open trades across all agents.
/// Markets with no open positions produce no record. Output is sorted
/// by market id for stable snapshots.
pub fn consensus(open_trades: &[Trade]) -> Vec<ConsensusRecord> {
    let mut by_market: HashMap<&str, Vec<&Trade>> = HashMap::new();
    for trade in open_trades.iter().filter(|t| t.is_open()) {
        by_market.entry(trade.market_id.as_str()).or_default().push(trade);
    }

    let mut records: Vec<ConsensusRecord> = by_market
        .into_iter()
        .map(|(market_id, trades)| {
            let yes_count = trades.iter().filter(|t| t.side == Side::Yes).count();
            let no_count = trades.len() - yes_count;
            let total = (yes_count + no_count) as f64;
            let agreement = yes_count.max(no_count) as f64 / total;
            let avg_confidence =
                trades.iter().map(|t| t.confidence).sum::<f64>() / total;
            let side = if yes_count >= no_count {
                Side::Yes
            } else {
                Side::No
            };
            let conflict =
                yes_count > 0 && no_count > 0 && agreement < CONFLICT_AGREEMENT_THRESHOLD;

            ConsensusRecord {
                market_id: market_id.to_string(),
                yes_count,
                no_count,
                side,
                agreement,
                avg_confidence,
                conflict,
            }
        })
        .collect();

    records.sort_by(|a, b| a.market_id.cmp(&b.market_id));
    records
}

/// The subset of consensus records in conflict.
pub fn conflict_markets(records: &[ConsensusRecord]) -> Vec<&ConsensusRecord> {
    records.iter().filter(|r| r.conflict).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
