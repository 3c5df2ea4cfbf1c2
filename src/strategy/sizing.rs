//! Position sizing and entry gates.
//!
//! Converts a decision into a dollar size against the agent's current
//! portfolio: risk budget by risk level, confidence weighting, the
//! personality multiplier, then the hard exposure caps. Undersized
//! results are dropped. Also owns the drawdown cooldown transitions.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::profiles::AgentProfile;
use crate::types::{AgentPortfolio, Category, RiskLevel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Single-market exposure cap as a fraction of capital.
const SINGLE_MARKET_CAP_PCT: f64 = 0.20;
/// Per-category exposure cap as a fraction of capital.
const CATEGORY_CAP_PCT: f64 = 0.40;
/// Sizes below this fraction of capital are dropped.
const MIN_SIZE_PCT: f64 = 0.01;
/// Drawdown that triggers the cooldown.
pub const COOLDOWN_TRIGGER_PCT: f64 = 0.40;
/// Drawdown below which the cooldown clears early.
pub const COOLDOWN_RECOVERY_PCT: f64 = 0.30;

/// Base per-trade risk budget by risk level.
pub fn base_risk_budget(risk: RiskLevel) -> f64 {
    match risk {
        RiskLevel::High => 0.04,
        RiskLevel::Medium => 0.025,
        RiskLevel::Low => 0.015,
    }
}

/// Total open-exposure cap by risk level.
pub fn max_total_exposure_pct(risk: RiskLevel) -> f64 {
    match risk {
        RiskLevel::High => 0.70,
        RiskLevel::Medium => 0.60,
        RiskLevel::Low => 0.50,
    }
}

// ---------------------------------------------------------------------------
// Entry gates
// ---------------------------------------------------------------------------

/// Why an entry was blocked before sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBlock {
    Cooldown,
    MaxTradesReached { current: usize, limit: usize },
}

impl fmt::Display for EntryBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryBlock::Cooldown => write!(f, "drawdown cooldown active"),
            EntryBlock::MaxTradesReached { current, limit } => {
                write!(f, "{current} open positions at {limit} limit")
            }
        }
    }
}

/// Portfolio-level gates checked before any sizing work.
pub fn entry_gate(
    profile: &AgentProfile,
    portfolio: &AgentPortfolio,
    now: DateTime<Utc>,
) -> Option<EntryBlock> {
    if portfolio.in_cooldown(now) {
        return Some(EntryBlock::Cooldown);
    }
    if portfolio.open_positions.len() >= profile.max_trades {
        return Some(EntryBlock::MaxTradesReached {
            current: portfolio.open_positions.len(),
            limit: profile.max_trades,
        });
    }
    None
}

// ---------------------------------------------------------------------------
// Sizing
// ---------------------------------------------------------------------------

/// Why a sized entry was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SizeRejection {
    BelowMinimum { size_usd: f64, minimum_usd: f64 },
    NoHeadroom,
}

impl fmt::Display for SizeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeRejection::BelowMinimum { size_usd, minimum_usd } => {
                write!(f, "size ${size_usd:.2} below ${minimum_usd:.2} minimum")
            }
            SizeRejection::NoHeadroom => write!(f, "no exposure headroom left"),
        }
    }
}

/// Compute the final position size in USD.
///
/// Pipeline: risk budget × adaptive multiplier × confidence weight ×
/// capital × personality multiplier, then clamped to the remaining
/// headroom under the single-market, category, and total caps.
pub fn compute_size(
    profile: &AgentProfile,
    portfolio: &AgentPortfolio,
    category: Category,
    confidence: f64,
    personality_multiplier: f64,
    risk_multiplier: f64,
) -> Result<f64, SizeRejection> {
    let capital = portfolio.current_capital_usd();
    if capital <= 0.0 {
        return Err(SizeRejection::NoHeadroom);
    }

    let budget = base_risk_budget(profile.risk) * risk_multiplier;
    let confidence_weight = 0.5 + confidence.clamp(0.0, 1.0) / 2.0;
    let raw = budget * confidence_weight * capital * personality_multiplier;

    let market_cap = SINGLE_MARKET_CAP_PCT * capital;
    let category_headroom =
        CATEGORY_CAP_PCT * capital - portfolio.category_exposure_usd(category);
    let total_headroom =
        max_total_exposure_pct(profile.risk) * capital - portfolio.total_exposure_usd();

    let clamped = raw
        .min(market_cap)
        .min(category_headroom)
        .min(total_headroom);

    if clamped <= 0.0 {
        return Err(SizeRejection::NoHeadroom);
    }

    let minimum = MIN_SIZE_PCT * capital;
    if clamped < minimum {
        return Err(SizeRejection::BelowMinimum {
            size_usd: clamped,
            minimum_usd: minimum,
        });
    }

    Ok(clamped)
}

// ---------------------------------------------------------------------------
// Cooldown transitions
// ---------------------------------------------------------------------------

/// Update the drawdown cooldown state. Entering happens at the trigger
/// threshold; clearing happens when drawdown recovers below the
/// recovery threshold or the wall-clock window elapses (handled by
/// `in_cooldown`'s time check).
pub fn update_cooldown(portfolio: &mut AgentPortfolio, now: DateTime<Utc>, cooldown_hours: i64) {
    let drawdown = portfolio.max_drawdown_pct();

    if portfolio.cooldown_until.is_some() {
        if drawdown < COOLDOWN_RECOVERY_PCT {
            portfolio.cooldown_until = None;
        }
    } else if drawdown >= COOLDOWN_TRIGGER_PCT {
        portfolio.cooldown_until = Some(now + Duration::hours(cooldown_hours));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
