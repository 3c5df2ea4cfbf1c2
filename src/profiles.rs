//! Agent profiles.
//!
//! The built-in roster of six agents, each with its own risk level,
//! candidate filters, scoring weights, and category focus. Profiles are
//! loaded once at startup, merged with any overrides from configuration,
//! and are immutable for the duration of a cycle.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Category, RiskLevel};

// ---------------------------------------------------------------------------
// Scoring weights
// ---------------------------------------------------------------------------

/// Per-component weights applied to the five score components.
/// All weights are strictly positive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub volume: f64,
    pub liquidity: f64,
    pub price_movement: f64,
    pub news: f64,
    pub probability: f64,
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.volume + self.liquidity + self.price_movement + self.news + self.probability
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            volume: 1.0,
            liquidity: 1.0,
            price_movement: 1.0,
            news: 1.0,
            probability: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Agent profile
// ---------------------------------------------------------------------------

/// Static configuration of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub agent_id: AgentId,
    pub display_name: String,
    pub risk: RiskLevel,
    /// Candidate filter: minimum 24h volume in USD.
    pub min_volume: f64,
    /// Candidate filter: minimum liquidity in USD.
    pub min_liquidity: f64,
    /// Maximum simultaneous open positions.
    pub max_trades: usize,
    /// Preferred categories. Empty means no preference.
    pub focus_categories: Vec<Category>,
    pub weights: ScoreWeights,
    pub enabled: bool,
}

/// Partial override of a profile, merged from configuration at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileOverride {
    pub enabled: Option<bool>,
    pub min_volume: Option<f64>,
    pub min_liquidity: Option<f64>,
    pub max_trades: Option<usize>,
    pub focus_categories: Option<Vec<Category>>,
}

impl AgentProfile {
    /// Apply a configuration override in place.
    pub fn apply_override(&mut self, ov: &ProfileOverride) {
        if let Some(enabled) = ov.enabled {
            self.enabled = enabled;
        }
        if let Some(v) = ov.min_volume {
            self.min_volume = v;
        }
        if let Some(v) = ov.min_liquidity {
            self.min_liquidity = v;
        }
        if let Some(v) = ov.max_trades {
            self.max_trades = v;
        }
        if let Some(cats) = &ov.focus_categories {
            self.focus_categories = cats.clone();
        }
    }
}

// ---------------------------------------------------------------------------
// Built-in roster
// ---------------------------------------------------------------------------

/// The default six-agent roster. Weight spreads are deliberately
/// asymmetric so the agents disagree on the same market set.
pub fn default_roster() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            agent_id: AgentId::Grok4,
            display_name: "Grok 4".to_string(),
            risk: RiskLevel::High,
            min_volume: 50_000.0,
            min_liquidity: 10_000.0,
            max_trades: 5,
            focus_categories: vec![Category::Crypto, Category::Tech],
            weights: ScoreWeights {
                volume: 1.3,
                liquidity: 1.0,
                price_movement: 1.4,
                news: 0.9,
                probability: 1.0,
            },
            enabled: true,
        },
        AgentProfile {
            agent_id: AgentId::Gpt5,
            display_name: "GPT-5".to_string(),
            risk: RiskLevel::Medium,
            min_volume: 75_000.0,
            min_liquidity: 20_000.0,
            max_trades: 4,
            focus_categories: vec![Category::Politics, Category::Finance],
            weights: ScoreWeights {
                volume: 1.1,
                liquidity: 1.2,
                price_movement: 0.9,
                news: 1.3,
                probability: 1.0,
            },
            enabled: true,
        },
        AgentProfile {
            agent_id: AgentId::DeepseekV3,
            display_name: "DeepSeek V3".to_string(),
            risk: RiskLevel::High,
            min_volume: 40_000.0,
            min_liquidity: 8_000.0,
            max_trades: 6,
            focus_categories: vec![Category::Crypto, Category::Finance],
            weights: ScoreWeights {
                volume: 1.0,
                liquidity: 0.8,
                price_movement: 1.5,
                news: 1.0,
                probability: 1.2,
            },
            enabled: true,
        },
        AgentProfile {
            agent_id: AgentId::Gemini25,
            display_name: "Gemini 2.5".to_string(),
            risk: RiskLevel::Medium,
            min_volume: 60_000.0,
            min_liquidity: 15_000.0,
            max_trades: 5,
            focus_categories: vec![Category::Tech, Category::Science],
            weights: ScoreWeights {
                volume: 1.0,
                liquidity: 1.0,
                price_movement: 1.0,
                news: 1.4,
                probability: 0.9,
            },
            enabled: true,
        },
        AgentProfile {
            agent_id: AgentId::Claude45,
            display_name: "Claude 4.5".to_string(),
            risk: RiskLevel::Low,
            min_volume: 100_000.0,
            min_liquidity: 30_000.0,
            max_trades: 3,
            focus_categories: vec![],
            weights: ScoreWeights {
                volume: 1.2,
                liquidity: 1.4,
                price_movement: 0.7,
                news: 1.1,
                probability: 1.1,
            },
            enabled: true,
        },
        AgentProfile {
            agent_id: AgentId::Qwen25,
            display_name: "Qwen 2.5".to_string(),
            risk: RiskLevel::Low,
            min_volume: 80_000.0,
            min_liquidity: 25_000.0,
            max_trades: 4,
            focus_categories: vec![Category::Sports, Category::Culture],
            weights: ScoreWeights {
                volume: 0.9,
                liquidity: 1.1,
                price_movement: 1.0,
                news: 1.2,
                probability: 1.3,
            },
            enabled: true,
        },
    ]
}

/// Look up a profile by agent id in a roster slice.
pub fn profile_for(roster: &[AgentProfile], agent_id: AgentId) -> Option<&AgentProfile> {
    roster.iter().find(|p| p.agent_id == agent_id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_covers_all_agents() {
        let roster = default_roster();
        assert_eq!(roster.len(), AgentId::ALL.len());
        for agent in AgentId::ALL {
            assert!(
                roster.iter().any(|p| p.agent_id == *agent),
                "missing profile for {agent}"
            );
        }
    }

    #[test]
    fn test_roster_weights_positive() {
        for p in default_roster() {
            assert!(p.weights.volume > 0.0);
            assert!(p.weights.liquidity > 0.0);
            assert!(p.weights.price_movement > 0.0);
            assert!(p.weights.news > 0.0);
            assert!(p.weights.probability > 0.0);
            assert!(p.weights.sum() > 0.0);
        }
    }

    #[test]
    fn test_roster_filters_sane() {
        for p in default_roster() {
            assert!(p.min_volume > 0.0);
            assert!(p.min_liquidity > 0.0);
            assert!(p.max_trades >= 1);
            assert!(p.enabled);
        }
    }

    #[test]
    fn test_grok_profile_values() {
        let roster = default_roster();
        let grok = profile_for(&roster, AgentId::Grok4).unwrap();
        assert_eq!(grok.risk, RiskLevel::High);
        assert_eq!(grok.min_volume, 50_000.0);
        assert_eq!(grok.min_liquidity, 10_000.0);
        assert_eq!(grok.max_trades, 5);
        assert!((grok.weights.volume - 1.3).abs() < 1e-10);
        assert!((grok.weights.price_movement - 1.4).abs() < 1e-10);
    }

    #[test]
    fn test_apply_override() {
        let mut profile = default_roster().remove(0);
        let ov = ProfileOverride {
            enabled: Some(false),
            min_volume: Some(1_000.0),
            max_trades: Some(2),
            min_liquidity: None,
            focus_categories: Some(vec![Category::Politics]),
        };
        let original_liquidity = profile.min_liquidity;
        profile.apply_override(&ov);

        assert!(!profile.enabled);
        assert_eq!(profile.min_volume, 1_000.0);
        assert_eq!(profile.max_trades, 2);
        assert_eq!(profile.min_liquidity, original_liquidity);
        assert_eq!(profile.focus_categories, vec![Category::Politics]);
    }

    #[test]
    fn test_empty_override_is_noop() {
        let before = default_roster().remove(1);
        let mut after = before.clone();
        after.apply_override(&ProfileOverride::default());
        assert_eq!(after.enabled, before.enabled);
        assert_eq!(after.min_volume, before.min_volume);
        assert_eq!(after.max_trades, before.max_trades);
    }

    #[test]
    fn test_profile_serialization_roundtrip() {
        let roster = default_roster();
        let json = serde_json::to_string(&roster).unwrap();
        let parsed: Vec<AgentProfile> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), roster.len());
        assert_eq!(parsed[0].agent_id, AgentId::Grok4);
    }
}
