//! Adaptive tuner.
//!
//! A slow background job (daily by default) that re-derives each
//! agent's risk multiplier and category bias from its last 30 days of
//! closed trades, then atomically swaps the persisted `AdaptiveConfig`.
//! The next trading cycle picks up the new values.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::storage::Store;
use crate::types::{AdaptiveConfig, AgentId, Category, Trade, STARTING_CAPITAL_USD};

/// Performance lookback window.
const LOOKBACK_DAYS: i64 = 30;
/// Risk multiplier bounds.
const RISK_MULTIPLIER_MIN: f64 = 0.5;
const RISK_MULTIPLIER_MAX: f64 = 1.5;
/// Category bias bounds.
const BIAS_MIN: f64 = 0.7;
const BIAS_MAX: f64 = 1.3;
/// Normalization scale for per-trade PnL when deriving category bias.
pub const DEFAULT_PNL_SCALE_USD: f64 = 50.0;

/// Windowed performance stats feeding the tuning rules.
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    pub pnl_pct: f64,
    pub max_drawdown_pct: f64,
    pub per_category: HashMap<Category, (f64, usize)>,
}

/// Compute stats over the closed trades of the lookback window.
/// Drawdown is approximated as the worst post-peak dip of the
/// cumulative realized-PnL equity path.
pub fn window_stats(trades: &[Trade]) -> WindowStats {
    let mut closed: Vec<&Trade> = trades.iter().filter(|t| !t.is_open()).collect();
    closed.sort_by_key(|t| t.closed_at);

    let mut equity = STARTING_CAPITAL_USD;
    let mut peak = equity;
    let mut max_drawdown = 0.0f64;
    let mut total_pnl = 0.0;
    let mut per_category: HashMap<Category, (f64, usize)> = HashMap::new();

    for trade in &closed {
        let pnl = trade.pnl_usd.unwrap_or(0.0);
        total_pnl += pnl;
        equity += pnl;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - equity) / peak);
        }

        let entry = per_category.entry(trade.category).or_insert((0.0, 0));
        entry.0 += pnl;
        entry.1 += 1;
    }

    WindowStats {
        pnl_pct: total_pnl / STARTING_CAPITAL_USD * 100.0,
        max_drawdown_pct: max_drawdown,
        per_category,
    }
}

/// Derive the next adaptive config from windowed stats, compounding the
/// previous risk multiplier.
pub fn compute_adaptive(
    agent_id: AgentId,
    stats: &WindowStats,
    previous_multiplier: f64,
    pnl_scale_usd: f64,
    now: DateTime<Utc>,
) -> AdaptiveConfig {
    let factor = if stats.max_drawdown_pct > 0.35 || stats.pnl_pct < -10.0 {
        0.75
    } else if stats.pnl_pct > 25.0 && stats.max_drawdown_pct < 0.25 {
        1.10
    } else {
        1.0
    };
    let risk_multiplier =
        (previous_multiplier * factor).clamp(RISK_MULTIPLIER_MIN, RISK_MULTIPLIER_MAX);

    let category_bias = stats
        .per_category
        .iter()
        .filter(|(_, (_, count))| *count > 0)
        .map(|(category, (pnl, count))| {
            let avg_pnl = pnl / *count as f64;
            let bias = (1.0 + (avg_pnl / pnl_scale_usd) * 0.3).clamp(BIAS_MIN, BIAS_MAX);
            (*category, bias)
        })
        .collect();

    AdaptiveConfig {
        agent_id,
        risk_multiplier,
        category_bias,
        computed_at: now,
    }
}

/// Run one tuning pass over every agent.
pub async fn run_once(store: &Arc<dyn Store>, agents: &[AgentId], now: DateTime<Utc>) {
    for agent_id in agents {
        let since = now - Duration::days(LOOKBACK_DAYS);
        // Load unwindowed: a trade opened before the window but closed
        // inside it still counts.
        let trades = match store.load_trades(*agent_id, None).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "Tuner trade load failed, skipping agent");
                continue;
            }
        };

        let closed_in_window: Vec<Trade> = trades
            .into_iter()
            .filter(|t| t.closed_at.map(|c| c >= since).unwrap_or(false))
            .collect();

        let previous = match store.get_adaptive_config(*agent_id).await {
            Ok(Some(config)) => config.risk_multiplier,
            Ok(None) => 1.0,
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "Tuner config load failed, using neutral");
                1.0
            }
        };

        let stats = window_stats(&closed_in_window);
        let config =
            compute_adaptive(*agent_id, &stats, previous, DEFAULT_PNL_SCALE_USD, now);

        info!(
            agent = %agent_id,
            trades = closed_in_window.len(),
            pnl_pct = format!("{:.1}", stats.pnl_pct),
            drawdown = format!("{:.2}", stats.max_drawdown_pct),
            risk_multiplier = format!("{:.2}", config.risk_multiplier),
            "Adaptive config retuned"
        );

        if let Err(e) = store.save_adaptive_config(&config).await {
            warn!(agent = %agent_id, error = %e, "Tuner config save failed");
        }
    }
}

/// The tuner loop: one pass immediately, then one per interval until
/// shutdown.
pub async fn run_loop(
    store: Arc<dyn Store>,
    agents: Vec<AgentId>,
    interval_hours: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(
        interval_hours.max(1) * 3600,
    ));
    info!(interval_hours, "Adaptive tuner loop started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_once(&store, &agents, Utc::now()).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Adaptive tuner loop stopping");
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
