//! Personality rules.
//!
//! Deterministic post-decision modifiers applied in a fixed order.
//! A rule may only adjust already-computed values (side, confidence,
//! size multiplier) and append a note to the reasoning; it cannot
//! reach upstream. The combined size multiplier is clamped to
//! [0.5, 1.5] and confidence to [0, 1].

use crate::profiles::AgentProfile;
use crate::types::{Category, ScoredMarket, Side, TradeDecision};

const SIZE_MULTIPLIER_MIN: f64 = 0.5;
const SIZE_MULTIPLIER_MAX: f64 = 1.5;

/// One rule's output. Absent fields leave the decision untouched.
#[derive(Debug, Clone, Default)]
pub struct Adjustment {
    pub side: Option<Side>,
    pub confidence_delta: f64,
    pub size_multiplier: f64,
    pub note: Option<String>,
}

/// Everything a rule is allowed to see.
pub struct RuleContext<'a> {
    pub profile: &'a AgentProfile,
    pub scored: &'a ScoredMarket,
    pub decision: &'a TradeDecision,
}

type Rule = fn(&RuleContext<'_>) -> Option<Adjustment>;

/// The complete v1 rule set, in application order.
const RULES: &[Rule] = &[momentum_near_even, crowded_political, near_term_sports];

/// Crypto/Tech markets hovering near even odds with real 24h movement:
/// momentum play, lean in.
fn momentum_near_even(ctx: &RuleContext<'_>) -> Option<Adjustment> {
    let market = &ctx.scored.market;
    let near_even = (market.current_probability - 0.5).abs() < 0.10;
    let moving = ctx.scored.components.price_movement >= 6.0;
    if matches!(market.category, Category::Crypto | Category::Tech) && near_even && moving {
        return Some(Adjustment {
            side: None,
            confidence_delta: 0.05,
            size_multiplier: 1.2,
            note: Some("Momentum near even odds in a fast category".to_string()),
        });
    }
    None
}

/// Heavily-covered political markets already priced to one side:
/// crowded trade, fade the enthusiasm.
fn crowded_political(ctx: &RuleContext<'_>) -> Option<Adjustment> {
    let market = &ctx.scored.market;
    let one_sided = market.current_probability >= 0.80 || market.current_probability <= 0.20;
    let heavy_news = ctx.scored.components.news >= 15.0;
    if market.category == Category::Politics && one_sided && heavy_news {
        return Some(Adjustment {
            side: None,
            confidence_delta: -0.07,
            size_multiplier: 0.8,
            note: Some("Crowded one-sided political market".to_string()),
        });
    }
    None
}

/// Sports markets moving sharply, typical of an imminent event:
/// moderate boost while the information edge lasts.
fn near_term_sports(ctx: &RuleContext<'_>) -> Option<Adjustment> {
    let market = &ctx.scored.market;
    if market.category == Category::Sports && market.price_change_24h.abs() >= 0.05 {
        return Some(Adjustment {
            side: None,
            confidence_delta: 0.04,
            size_multiplier: 1.15,
            note: Some("Near-term sports event in motion".to_string()),
        });
    }
    None
}

/// Apply all rules in fixed order. Returns the adjusted decision and
/// the combined size multiplier.
pub fn apply_personality(
    profile: &AgentProfile,
    scored: &ScoredMarket,
    decision: TradeDecision,
) -> (TradeDecision, f64) {
    let mut adjusted = decision;
    let mut size_multiplier = 1.0;

    for rule in RULES {
        let ctx = RuleContext {
            profile,
            scored,
            decision: &adjusted,
        };
        if let Some(adjustment) = rule(&ctx) {
            if let Some(side) = adjustment.side {
                adjusted.side = side;
            }
            adjusted.confidence =
                (adjusted.confidence + adjustment.confidence_delta).clamp(0.0, 1.0);
            if adjustment.size_multiplier > 0.0 {
                size_multiplier *= adjustment.size_multiplier;
            }
            if let Some(note) = adjustment.note {
                adjusted.reasoning.push(note);
            }
        }
    }

    (
        adjusted,
        size_multiplier.clamp(SIZE_MULTIPLIER_MIN, SIZE_MULTIPLIER_MAX),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
