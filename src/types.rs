//! Shared types for the PANTHEON engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that adapter, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Agent identity
// ---------------------------------------------------------------------------

/// The closed roster of agent identities. Each maps to one LLM endpoint,
/// one risk profile, and one synthetic portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "GROK_4")]
    Grok4,
    #[serde(rename = "GPT_5")]
    Gpt5,
    #[serde(rename = "DEEPSEEK_V3")]
    DeepseekV3,
    #[serde(rename = "GEMINI_2_5")]
    Gemini25,
    #[serde(rename = "CLAUDE_4_5")]
    Claude45,
    #[serde(rename = "QWEN_2_5")]
    Qwen25,
}

impl AgentId {
    /// All agents, in roster order.
    pub const ALL: &'static [AgentId] = &[
        AgentId::Grok4,
        AgentId::Gpt5,
        AgentId::DeepseekV3,
        AgentId::Gemini25,
        AgentId::Claude45,
        AgentId::Qwen25,
    ];

    /// Internal identifier string, as persisted and logged.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::Grok4 => "GROK_4",
            AgentId::Gpt5 => "GPT_5",
            AgentId::DeepseekV3 => "DEEPSEEK_V3",
            AgentId::Gemini25 => "GEMINI_2_5",
            AgentId::Claude45 => "CLAUDE_4_5",
            AgentId::Qwen25 => "QWEN_2_5",
        }
    }

    /// Short identifier used by the frontend. The map is bidirectional:
    /// `from_key` accepts either form.
    pub fn frontend_slug(&self) -> &'static str {
        match self {
            AgentId::Grok4 => "grok",
            AgentId::Gpt5 => "gpt5",
            AgentId::DeepseekV3 => "deepseek",
            AgentId::Gemini25 => "gemini",
            AgentId::Claude45 => "claude",
            AgentId::Qwen25 => "qwen",
        }
    }

    /// Resolve an internal id or frontend slug to an `AgentId`.
    pub fn from_key(key: &str) -> Option<AgentId> {
        AgentId::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == key || a.frontend_slug() == key)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Risk appetite level attached to an agent profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// Market category for filtering, exposure caps, and adaptive bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Politics,
    Sports,
    Crypto,
    Tech,
    Finance,
    Science,
    Culture,
    Other,
}

impl Category {
    /// All known categories (useful for iteration).
    pub const ALL: &'static [Category] = &[
        Category::Politics,
        Category::Sports,
        Category::Crypto,
        Category::Tech,
        Category::Finance,
        Category::Science,
        Category::Culture,
        Category::Other,
    ];

    /// Normalize a raw upstream category string. Unmapped values fall
    /// to `Other`; matching is on the lowercased, trimmed input.
    pub fn from_raw(raw: &str) -> Category {
        match raw.trim().to_lowercase().as_str() {
            "politics" | "political" | "elections" | "us-politics" | "geopolitics" => {
                Category::Politics
            }
            "sports" | "sport" | "nba" | "nfl" | "soccer" | "esports" => Category::Sports,
            "crypto" | "cryptocurrency" | "bitcoin" | "ethereum" | "defi" => Category::Crypto,
            "tech" | "technology" | "ai" | "artificial-intelligence" | "science-tech" => {
                Category::Tech
            }
            "finance" | "economics" | "economy" | "business" | "markets" => Category::Finance,
            "science" | "climate" | "space" | "health" => Category::Science,
            "culture" | "entertainment" | "pop-culture" | "music" | "movies" => Category::Culture,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Politics => write!(f, "Politics"),
            Category::Sports => write!(f, "Sports"),
            Category::Crypto => write!(f, "Crypto"),
            Category::Tech => write!(f, "Tech"),
            Category::Finance => write!(f, "Finance"),
            Category::Science => write!(f, "Science"),
            Category::Culture => write!(f, "Culture"),
            Category::Other => write!(f, "Other"),
        }
    }
}

/// Lifecycle status of an upstream market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Active,
    Resolved,
    Frozen,
    Invalid,
}

/// A binary prediction market, normalized from the upstream source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    /// Opaque stable identifier from the upstream source.
    pub market_id: String,
    pub question: String,
    pub category: Category,
    pub volume_usd: f64,
    pub liquidity_usd: f64,
    /// Current implied YES probability (0.0–1.0).
    pub current_probability: f64,
    /// 24-hour probability change (-1.0–1.0).
    pub price_change_24h: f64,
    pub status: MarketStatus,
    /// YES/NO resolution when the upstream exposes it.
    pub resolved_outcome: Option<bool>,
}

impl Market {
    pub fn is_active(&self) -> bool {
        self.status == MarketStatus::Active
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (YES: {:.0}% | vol: ${:.0} | liq: ${:.0} | {:?})",
            self.category,
            self.question,
            self.current_probability * 100.0,
            self.volume_usd,
            self.liquidity_usd,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// News
// ---------------------------------------------------------------------------

/// A news article, normalized across all configured providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    /// `providerName:url`, stable across cache windows.
    pub article_id: String,
    pub title: String,
    pub description: Option<String>,
    /// Publication name (e.g. "Reuters"), used for source-tier weighting.
    pub source: String,
    pub published_at: DateTime<Utc>,
    pub url: String,
    /// Which provider adapter produced this article.
    pub source_api: String,
}

impl NewsArticle {
    /// Title key used for cross-provider deduplication.
    pub fn dedup_key(&self) -> String {
        self.title.trim().to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// The five bounded score components for one `(agent, market)` pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScoreComponents {
    /// 0–30
    pub volume: f64,
    /// 0–20
    pub liquidity: f64,
    /// 0–15
    pub price_movement: f64,
    /// 0–25
    pub news: f64,
    /// 0–10
    pub probability: f64,
}

/// A market with its per-agent score attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMarket {
    pub market: Market,
    /// Weighted total, roughly 0–100.
    pub score: f64,
    pub components: ScoreComponents,
}

// ---------------------------------------------------------------------------
// Decisions & trades
// ---------------------------------------------------------------------------

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    /// +1 for YES, -1 for NO; the sign applied to probability deltas
    /// when marking PnL.
    pub fn direction(&self) -> f64 {
        match self {
            Side::Yes => 1.0,
            Side::No => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// A validated decision, whether it came from an LLM or the
/// deterministic fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub side: Side,
    /// 0.0–1.0
    pub confidence: f64,
    /// Short explanatory lines, at most three.
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// Why a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    #[serde(rename = "TP")]
    TakeProfit,
    #[serde(rename = "SL")]
    StopLoss,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SCORE_DECAY")]
    ScoreDecay,
    #[serde(rename = "MARKET_RESOLVED")]
    MarketResolved,
    #[serde(rename = "MARKET_INVALID")]
    MarketInvalid,
    #[serde(rename = "FLIP")]
    Flip,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ExitReason::TakeProfit => "TP",
            ExitReason::StopLoss => "SL",
            ExitReason::Timeout => "TIMEOUT",
            ExitReason::ScoreDecay => "SCORE_DECAY",
            ExitReason::MarketResolved => "MARKET_RESOLVED",
            ExitReason::MarketInvalid => "MARKET_INVALID",
            ExitReason::Flip => "FLIP",
            ExitReason::Manual => "MANUAL",
        };
        write!(f, "{tag}")
    }
}

/// A synthetic trade. CLOSED is terminal: `pnl_usd` and `closed_at` are
/// set exactly once when the trade closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub agent_id: AgentId,
    pub market_id: String,
    pub category: Category,
    pub side: Side,
    pub size_usd: f64,
    pub entry_probability: f64,
    pub entry_score: f64,
    pub confidence: f64,
    pub status: TradeStatus,
    /// None iff the trade is OPEN.
    pub pnl_usd: Option<f64>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub reasoning: Vec<String>,
    /// The deterministic seed that produced this trade.
    pub seed: String,
}

impl Trade {
    /// Canonical trade identifier: stable for a given agent, market and
    /// open time, so repeated persistence of the same open is idempotent.
    pub fn make_id(agent_id: AgentId, market_id: &str, opened_at: DateTime<Utc>) -> String {
        format!(
            "{}:{}:{}",
            agent_id.as_str(),
            market_id,
            opened_at.timestamp_millis()
        )
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ${:.2} @ {:.0}% conf={:.0}% [{:?}]",
            self.agent_id,
            self.side,
            self.market_id,
            self.size_usd,
            self.entry_probability * 100.0,
            self.confidence * 100.0,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Portfolio
// ---------------------------------------------------------------------------

/// An open exposure in one market. At most one position per market
/// per agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub side: Side,
    pub size_usd: f64,
    pub entry_probability: f64,
    pub entry_score: f64,
    pub opened_at: DateTime<Utc>,
    pub category: Category,
}

impl Position {
    /// Probability mark-to-market: `direction · (current − entry) · size`.
    pub fn unrealized_pnl(&self, current_probability: f64) -> f64 {
        self.side.direction() * (current_probability - self.entry_probability) * self.size_usd
    }
}

/// Synthetic starting bankroll for every agent.
pub const STARTING_CAPITAL_USD: f64 = 3000.0;

/// Per-agent synthetic portfolio. Exclusively mutated by the scheduler;
/// everything else reads persisted snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPortfolio {
    pub agent_id: AgentId,
    pub starting_capital_usd: f64,
    pub realized_pnl_usd: f64,
    /// Recomputed each cycle from live probabilities; metrics only.
    pub unrealized_pnl_usd: f64,
    /// Highest equity ever observed. Monotonically nondecreasing.
    pub max_equity_usd: f64,
    pub open_positions: HashMap<String, Position>,
    /// Set while the drawdown stop is active; entries are blocked.
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl AgentPortfolio {
    pub fn new(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            starting_capital_usd: STARTING_CAPITAL_USD,
            realized_pnl_usd: 0.0,
            unrealized_pnl_usd: 0.0,
            max_equity_usd: STARTING_CAPITAL_USD,
            open_positions: HashMap::new(),
            cooldown_until: None,
            last_updated: now,
        }
    }

    /// Always `starting + realized`; never stored separately.
    pub fn current_capital_usd(&self) -> f64 {
        self.starting_capital_usd + self.realized_pnl_usd
    }

    /// Capital plus unrealized PnL.
    pub fn equity_usd(&self) -> f64 {
        self.current_capital_usd() + self.unrealized_pnl_usd
    }

    /// `(max_equity − equity_now) / max_equity`, floored at zero.
    pub fn max_drawdown_pct(&self) -> f64 {
        if self.max_equity_usd <= 0.0 {
            return 0.0;
        }
        ((self.max_equity_usd - self.equity_usd()) / self.max_equity_usd).max(0.0)
    }

    /// Sum of open position sizes.
    pub fn total_exposure_usd(&self) -> f64 {
        self.open_positions.values().map(|p| p.size_usd).sum()
    }

    /// Sum of open position sizes in one category.
    pub fn category_exposure_usd(&self, category: Category) -> f64 {
        self.open_positions
            .values()
            .filter(|p| p.category == category)
            .map(|p| p.size_usd)
            .sum()
    }

    /// Raise the equity high-water mark if current equity exceeds it.
    pub fn update_peak(&mut self) {
        let eq = self.equity_usd();
        if eq > self.max_equity_usd {
            self.max_equity_usd = eq;
        }
    }

    /// Whether the drawdown cooldown currently blocks new entries.
    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.map(|t| now < t).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Adaptive config
// ---------------------------------------------------------------------------

/// Slow-moving per-agent tuning produced daily from recent performance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveConfig {
    pub agent_id: AgentId,
    /// 0.5–1.5 multiplier on the per-trade risk budget.
    pub risk_multiplier: f64,
    /// 0.7–1.3 multiplier on final score, per category.
    pub category_bias: HashMap<Category, f64>,
    pub computed_at: DateTime<Utc>,
}

impl AdaptiveConfig {
    pub fn neutral(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            risk_multiplier: 1.0,
            category_bias: HashMap::new(),
            computed_at: now,
        }
    }

    /// Bias for a category, defaulting to 1.0 when unset.
    pub fn bias_for(&self, category: Category) -> f64 {
        self.category_bias.get(&category).copied().unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Consensus
// ---------------------------------------------------------------------------

/// Cross-agent agreement on one market, derived from open positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub market_id: String,
    pub yes_count: usize,
    pub no_count: usize,
    /// The majority side.
    pub side: Side,
    /// `max(yes, no) / (yes + no)`.
    pub agreement: f64,
    pub avg_confidence: f64,
    /// Both sides populated with agreement below 0.60.
    pub conflict: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain error taxonomy. Upstream failures never bubble past the
/// scheduler; they are converted to fallbacks or recorded outcomes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Upstream transient ({source_name}): {message}")]
    UpstreamTransient { source_name: String, message: String },

    #[error("Upstream protocol ({source_name}): {message}")]
    UpstreamProtocol { source_name: String, message: String },

    #[error("Credential not configured: {0}")]
    ConfigurationAbsent(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
