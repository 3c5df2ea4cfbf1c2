//! Position lifecycle: exit evaluation and close bookkeeping.
//!
//! Each cycle every open position is checked against the market's
//! status, the take-profit/stop-loss bands, its age, and score decay.
//! PnL on close is the probability mark
//! `direction · (exit − entry) · size`; resolved markets close against
//! the resolved outcome instead.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::config::LifecycleConfig;
use crate::types::{
    AgentPortfolio, ExitReason, Market, MarketStatus, Position, Trade, TradeStatus,
};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Take-profit band: YES closes at or above, NO at or below the mirror.
const TAKE_PROFIT_YES: f64 = 0.85;
const TAKE_PROFIT_NO: f64 = 0.15;
/// Stop-loss band.
const STOP_LOSS_YES: f64 = 0.35;
const STOP_LOSS_NO: f64 = 0.65;
/// Latest re-score below this fraction of the entry score exits.
const SCORE_DECAY_RATIO: f64 = 0.5;
/// Decay is only meaningful above this entry score.
const ENTRY_SCORE_FLOOR: f64 = 10.0;

/// Lifecycle policy derived from configuration.
#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub timeout: Duration,
    pub flat_close_frozen: bool,
    pub flip_confidence_threshold: f64,
}

impl LifecyclePolicy {
    pub fn from_config(config: &LifecycleConfig) -> Self {
        Self {
            timeout: Duration::hours(config.timeout_hours),
            flat_close_frozen: config.flat_close_frozen,
            flip_confidence_threshold: config.flip_confidence_threshold,
        }
    }
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from_config(&LifecycleConfig::default())
    }
}

/// A triggered exit: the reason plus the probability the position is
/// marked against.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSignal {
    pub reason: ExitReason,
    pub exit_probability: f64,
}

// ---------------------------------------------------------------------------
// Exit evaluation
// ---------------------------------------------------------------------------

/// Evaluate exit conditions for one position.
///
/// `market` is `None` when the current snapshot doesn't carry the
/// market (upstream degraded): the position is held, treated as
/// unchanged. `rescore` is this cycle's score for the market under the
/// owning agent's profile, used for the decay rule.
pub fn check_exit(
    position: &Position,
    market: Option<&Market>,
    rescore: Option<f64>,
    now: DateTime<Utc>,
    policy: &LifecyclePolicy,
) -> Option<ExitSignal> {
    let Some(market) = market else {
        // Timeout still applies while the upstream is degraded.
        if now - position.opened_at >= policy.timeout {
            return Some(ExitSignal {
                reason: ExitReason::Timeout,
                exit_probability: position.entry_probability,
            });
        }
        return None;
    };

    let probability = market.current_probability;

    // Market status outranks every band check.
    match market.status {
        MarketStatus::Resolved => {
            let exit_probability = match market.resolved_outcome {
                Some(true) => 1.0,
                Some(false) => 0.0,
                // Outcome not exposed by the upstream: close flat.
                None => position.entry_probability,
            };
            return Some(ExitSignal {
                reason: ExitReason::MarketResolved,
                exit_probability,
            });
        }
        MarketStatus::Invalid => {
            return Some(ExitSignal {
                reason: ExitReason::MarketInvalid,
                exit_probability: position.entry_probability,
            });
        }
        MarketStatus::Frozen => {
            if policy.flat_close_frozen {
                return Some(ExitSignal {
                    reason: ExitReason::Manual,
                    exit_probability: position.entry_probability,
                });
            }
            return None;
        }
        MarketStatus::Active => {}
    }

    let take_profit = match position.side {
        crate::types::Side::Yes => probability >= TAKE_PROFIT_YES,
        crate::types::Side::No => probability <= TAKE_PROFIT_NO,
    };
    if take_profit {
        return Some(ExitSignal {
            reason: ExitReason::TakeProfit,
            exit_probability: probability,
        });
    }

    let stop_loss = match position.side {
        crate::types::Side::Yes => probability <= STOP_LOSS_YES,
        crate::types::Side::No => probability >= STOP_LOSS_NO,
    };
    if stop_loss {
        return Some(ExitSignal {
            reason: ExitReason::StopLoss,
            exit_probability: probability,
        });
    }

    if now - position.opened_at >= policy.timeout {
        return Some(ExitSignal {
            reason: ExitReason::Timeout,
            exit_probability: probability,
        });
    }

    if let Some(rescore) = rescore {
        if position.entry_score >= ENTRY_SCORE_FLOOR
            && rescore < SCORE_DECAY_RATIO * position.entry_score
        {
            return Some(ExitSignal {
                reason: ExitReason::ScoreDecay,
                exit_probability: probability,
            });
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Close bookkeeping
// ---------------------------------------------------------------------------

/// Close an open trade against its position: compute PnL, update the
/// portfolio, and return the terminal trade for persistence.
///
/// Portfolio identity after every close:
/// `current_capital = starting_capital + realized_pnl`.
pub fn close_trade(
    portfolio: &mut AgentPortfolio,
    open_trade: &Trade,
    signal: &ExitSignal,
    now: DateTime<Utc>,
) -> Trade {
    let Some(position) = portfolio.open_positions.remove(&open_trade.market_id) else {
        warn!(
            agent = %portfolio.agent_id,
            market = %open_trade.market_id,
            "Close requested for unknown position"
        );
        let mut trade = open_trade.clone();
        trade.status = TradeStatus::Closed;
        trade.pnl_usd = Some(0.0);
        trade.closed_at = Some(now);
        trade.exit_reason = Some(signal.reason);
        return trade;
    };

    let pnl = position.side.direction()
        * (signal.exit_probability - position.entry_probability)
        * position.size_usd;

    portfolio.realized_pnl_usd += pnl;
    portfolio.update_peak();
    portfolio.last_updated = now;

    info!(
        agent = %portfolio.agent_id,
        market = %open_trade.market_id,
        reason = %signal.reason,
        pnl = format!("{pnl:+.2}"),
        capital = format!("{:.2}", portfolio.current_capital_usd()),
        "Position closed"
    );

    let mut trade = open_trade.clone();
    trade.status = TradeStatus::Closed;
    trade.pnl_usd = Some(pnl);
    trade.closed_at = Some(now);
    trade.exit_reason = Some(signal.reason);
    trade
}

/// Recompute the portfolio's unrealized PnL from the current snapshot.
/// Positions whose market is absent contribute nothing (treated as
/// unchanged from entry).
pub fn refresh_unrealized(
    portfolio: &mut AgentPortfolio,
    probability_of: impl Fn(&str) -> Option<f64>,
) {
    portfolio.unrealized_pnl_usd = portfolio
        .open_positions
        .values()
        .map(|p| {
            probability_of(&p.market_id)
                .map(|prob| p.unrealized_pnl(prob))
                .unwrap_or(0.0)
        })
        .sum();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
