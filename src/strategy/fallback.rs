//! Deterministic decision fallback.
//!
//! Used whenever an agent's LLM path is unavailable: no credential,
//! timeout, transport error, or unparseable response. The output is a
//! pure function of `(scored market, profile, seed)`, so a trade built
//! from the fallback is reproducible across processes.

use crate::determinism::{clamp, draw01};
use crate::profiles::AgentProfile;
use crate::types::{RiskLevel, ScoreComponents, ScoredMarket, Side, TradeDecision};

/// Confidence bounds for fallback decisions.
const CONFIDENCE_FLOOR: f64 = 0.40;
const CONFIDENCE_CEIL: f64 = 0.95;
/// Jitter span, centered on zero.
const JITTER_SPAN: f64 = 0.10;

/// Produce the deterministic decision for a scored market.
pub fn fallback_decision(
    scored: &ScoredMarket,
    profile: &AgentProfile,
    seed: &str,
) -> TradeDecision {
    // Lean with the market: a YES-prior of 0.6 above even odds, 0.4 below.
    let yes_prior = if scored.market.current_probability > 0.5 {
        0.6
    } else {
        0.4
    };
    let side = if draw01(seed) < yes_prior {
        Side::Yes
    } else {
        Side::No
    };

    let raw = scored.score / 100.0;
    let adjusted = match profile.risk {
        RiskLevel::High => (raw * 1.10).min(0.95),
        RiskLevel::Low => (raw * 0.90).max(0.40),
        RiskLevel::Medium => raw,
    };
    let jitter = (draw01(&format!("{seed}:jitter")) - 0.5) * JITTER_SPAN;
    let confidence = clamp(adjusted + jitter, CONFIDENCE_FLOOR, CONFIDENCE_CEIL);

    TradeDecision {
        side,
        confidence,
        reasoning: fallback_reasoning(&scored.components),
    }
}

/// Reasoning lines derived from which components clear their
/// thresholds, strongest signals first. At most three lines; a single
/// generic line when nothing clears.
fn fallback_reasoning(components: &ScoreComponents) -> Vec<String> {
    let mut lines = Vec::new();

    if components.volume >= 20.0 {
        lines.push("Strong trading volume".to_string());
    }
    if components.liquidity >= 12.0 {
        lines.push("Deep liquidity pool".to_string());
    }
    if components.price_movement >= 8.0 {
        lines.push("Notable 24h price movement".to_string());
    }
    if components.news >= 10.0 {
        lines.push("Elevated news coverage".to_string());
    }
    if components.probability >= 7.0 {
        lines.push("Probability near even odds".to_string());
    }

    if lines.is_empty() {
        lines.push("Composite signal within normal range".to_string());
    }
    lines.truncate(3);
    lines
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::determinism::seed;
    use crate::profiles::{default_roster, profile_for};
    use crate::types::{AgentId, Category, Market, MarketStatus};

    fn scored(score: f64, probability: f64) -> ScoredMarket {
        ScoredMarket {
            market: Market {
                market_id: "m1".into(),
                question: "Will X happen by 2026?".into(),
                category: Category::Crypto,
                volume_usd: 120_000.0,
                liquidity_usd: 30_000.0,
                current_probability: probability,
                price_change_24h: 0.04,
                status: MarketStatus::Active,
                resolved_outcome: None,
            },
            score,
            components: ScoreComponents {
                volume: 30.0,
                liquidity: 12.0,
                price_movement: 6.0,
                news: 0.0,
                probability: 9.0,
            },
        }
    }

    fn grok() -> crate::profiles::AgentProfile {
        profile_for(&default_roster(), AgentId::Grok4).unwrap().clone()
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let market = scored(68.4 / 5.6, 0.55);
        let profile = grok();
        let s = seed(AgentId::Grok4, "m1", 0);
        let a = fallback_decision(&market, &profile, &s);
        let b = fallback_decision(&market, &profile, &s);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_scenario_side_yes() {
        // draw01("GROK_4:m1:0") ≈ 0.576 < 0.6 prior (probability above 0.5)
        let market = scored(12.2, 0.55);
        let decision = fallback_decision(&market, &grok(), &seed(AgentId::Grok4, "m1", 0));
        assert_eq!(decision.side, Side::Yes);
    }

    #[test]
    fn test_fallback_confidence_bounds() {
        let profile = grok();
        for (score, prob) in [(0.0, 0.1), (50.0, 0.5), (100.0, 0.9), (12.2, 0.55)] {
            for index in 0..20 {
                let s = seed(AgentId::Grok4, "bounds", index);
                let d = fallback_decision(&scored(score, prob), &profile, &s);
                assert!(
                    (CONFIDENCE_FLOOR..=CONFIDENCE_CEIL).contains(&d.confidence),
                    "confidence {} out of bounds",
                    d.confidence
                );
            }
        }
    }

    #[test]
    fn test_fallback_risk_adjustment_direction() {
        let market = scored(70.0, 0.55);
        let mut high = grok();
        high.risk = RiskLevel::High;
        let mut low = grok();
        low.risk = RiskLevel::Low;
        let mut medium = grok();
        medium.risk = RiskLevel::Medium;

        let s = seed(AgentId::Grok4, "m1", 0);
        let c_high = fallback_decision(&market, &high, &s).confidence;
        let c_low = fallback_decision(&market, &low, &s).confidence;
        let c_med = fallback_decision(&market, &medium, &s).confidence;

        // Same seed, same jitter: ordering follows the risk multipliers.
        assert!(c_high >= c_med);
        assert!(c_med >= c_low || (c_low - c_med).abs() < 1e-12);
    }

    #[test]
    fn test_fallback_low_probability_prior() {
        // Below even odds the YES-prior drops to 0.4:
        // draw ≈ 0.576 ≥ 0.4 → NO
        let market = scored(12.2, 0.30);
        let decision = fallback_decision(&market, &grok(), &seed(AgentId::Grok4, "m1", 0));
        assert_eq!(decision.side, Side::No);
    }

    #[test]
    fn test_reasoning_from_components() {
        let lines = fallback_reasoning(&ScoreComponents {
            volume: 30.0,
            liquidity: 15.0,
            price_movement: 2.0,
            news: 1.0,
            probability: 9.0,
        });
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("volume"));
        assert!(lines[1].contains("liquidity"));
        assert!(lines[2].contains("even odds"));
    }

    #[test]
    fn test_reasoning_generic_when_nothing_clears() {
        let lines = fallback_reasoning(&ScoreComponents::default());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("normal range"));
    }

    #[test]
    fn test_reasoning_capped_at_three() {
        let lines = fallback_reasoning(&ScoreComponents {
            volume: 30.0,
            liquidity: 20.0,
            price_movement: 15.0,
            news: 25.0,
            probability: 10.0,
        });
        assert_eq!(lines.len(), 3);
    }
}
