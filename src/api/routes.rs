//! API route handlers.
//!
//! All endpoints return JSON derived from persisted state and the
//! caches the scheduler populates: trade feeds go through the per-agent
//! trade-set cache (fingerprint-checked against the latest market
//! snapshot) before falling back to a store load. Internal errors
//! degrade to a minimal shape with empty collections and a generic
//! error string; 4xx is reserved for invalid input (unknown agent id).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use crate::aggregator::{self, TimeWindow};
use crate::cache::TradeSetCache;
use crate::observability::Counters;
use crate::profiles::AgentProfile;
use crate::storage::Store;
use crate::types::{AgentId, AgentPortfolio, ConsensusRecord, EngineError, Trade};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiState {
    store: Arc<dyn Store>,
    roster: Vec<AgentProfile>,
    consensus: Arc<RwLock<Vec<ConsensusRecord>>>,
    trade_cache: Arc<TradeSetCache>,
    /// Sorted market ids of the scheduler's latest snapshot.
    market_fingerprint: Arc<RwLock<Vec<String>>>,
    counters: Arc<Counters>,
}

impl ApiState {
    pub fn new(
        store: Arc<dyn Store>,
        roster: Vec<AgentProfile>,
        consensus: Arc<RwLock<Vec<ConsensusRecord>>>,
        trade_cache: Arc<TradeSetCache>,
        market_fingerprint: Arc<RwLock<Vec<String>>>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            store,
            roster,
            consensus,
            trade_cache,
            market_fingerprint,
            counters,
        }
    }

    /// Resolve a frontend slug or internal id to a roster profile.
    fn resolve_agent(&self, key: &str) -> Result<&AgentProfile, EngineError> {
        AgentId::from_key(key)
            .and_then(|id| self.roster.iter().find(|p| p.agent_id == id))
            .ok_or_else(|| EngineError::UnknownAgent(key.to_string()))
    }

    /// An agent's trade set, served from the trade-set cache when its
    /// fingerprint matches the current market snapshot, otherwise
    /// loaded from the store and memoized.
    async fn trades_for(&self, agent_id: AgentId) -> Result<Vec<Trade>, EngineError> {
        let now = Utc::now();
        let fingerprint = self.market_fingerprint.read().unwrap().clone();

        if let Some(trades) = self.trade_cache.get(agent_id, &fingerprint, now) {
            self.counters
                .trade_cache_hits
                .fetch_add(1, Ordering::Relaxed);
            return Ok(trades);
        }
        self.counters
            .trade_cache_misses
            .fetch_add(1, Ordering::Relaxed);

        let trades = self.store.load_trades(agent_id, None).await?;
        self.trade_cache
            .put(agent_id, trades.clone(), fingerprint, now);
        Ok(trades)
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AgentProfileView {
    /// Frontend id ("grok").
    pub id: String,
    /// Internal id ("GROK_4").
    pub agent_id: String,
    pub display_name: String,
    pub risk: String,
    pub max_trades: usize,
    pub focus_categories: Vec<String>,
    pub enabled: bool,
}

impl AgentProfileView {
    fn from_profile(profile: &AgentProfile) -> Self {
        Self {
            id: profile.agent_id.frontend_slug().to_string(),
            agent_id: profile.agent_id.as_str().to_string(),
            display_name: profile.display_name.clone(),
            risk: profile.risk.to_string(),
            max_trades: profile.max_trades,
            focus_categories: profile
                .focus_categories
                .iter()
                .map(|c| c.to_string())
                .collect(),
            enabled: profile.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeView {
    pub trade_id: String,
    pub market_id: String,
    pub category: String,
    pub side: String,
    pub size_usd: f64,
    pub entry_probability: f64,
    pub confidence: f64,
    pub status: String,
    pub pnl_usd: Option<f64>,
    pub opened_at: String,
    pub closed_at: Option<String>,
    pub exit_reason: Option<String>,
    pub reasoning: Vec<String>,
}

impl TradeView {
    fn from_trade(trade: &Trade) -> Self {
        Self {
            trade_id: trade.trade_id.clone(),
            market_id: trade.market_id.clone(),
            category: trade.category.to_string(),
            side: trade.side.to_string(),
            size_usd: trade.size_usd,
            entry_probability: trade.entry_probability,
            confidence: trade.confidence,
            status: format!("{:?}", trade.status).to_uppercase(),
            pnl_usd: trade.pnl_usd,
            opened_at: trade.opened_at.to_rfc3339(),
            closed_at: trade.closed_at.map(|t| t.to_rfc3339()),
            exit_reason: trade.exit_reason.map(|r| r.to_string()),
            reasoning: trade.reasoning.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AgentTradesResponse {
    pub agent: AgentProfileView,
    pub trades: Vec<TradeView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AgentSummaryEntry {
    pub agent: AgentProfileView,
    pub current_capital_usd: f64,
    pub pnl_pct: f64,
    pub win_rate: f64,
    pub open_count: usize,
    pub closed_count: usize,
    pub max_drawdown_pct: f64,
}

#[derive(Debug, Default, Serialize)]
pub struct SummaryTotals {
    pub pnl_usd: f64,
    pub open_count: usize,
    pub closed_count: usize,
    pub best_agent: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub agents: Vec<AgentSummaryEntry>,
    pub trades_by_agent: HashMap<String, Vec<TradeView>>,
    pub totals: SummaryTotals,
    pub summaries: Vec<String>,
    pub consensus: Vec<ConsensusRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/agents/:agent_id/trades
pub async fn get_agent_trades(
    State(state): State<ApiState>,
    Path(agent_key): Path<String>,
) -> Result<Json<AgentTradesResponse>, StatusCode> {
    let profile = match state.resolve_agent(&agent_key) {
        Ok(profile) => profile,
        Err(e) => {
            debug!(error = %e, "Trade feed request rejected");
            return Err(StatusCode::NOT_FOUND);
        }
    };
    let agent_id = profile.agent_id;

    let agent = AgentProfileView::from_profile(profile);
    match state.trades_for(agent_id).await {
        Ok(trades) => Ok(Json(AgentTradesResponse {
            agent,
            trades: trades.iter().map(TradeView::from_trade).collect(),
            error: None,
        })),
        Err(e) => {
            warn!(agent = %agent_id, error = %e, "Trade feed load failed");
            Ok(Json(AgentTradesResponse {
                agent,
                trades: Vec::new(),
                error: Some("data temporarily unavailable".to_string()),
            }))
        }
    }
}

/// GET /api/agents/summary
pub async fn get_summary(State(state): State<ApiState>) -> Json<SummaryResponse> {
    let now = Utc::now();
    let consensus = state.consensus.read().unwrap().clone();

    let mut agents = Vec::with_capacity(state.roster.len());
    let mut trades_by_agent = HashMap::new();
    let mut totals = SummaryTotals::default();
    let mut summaries = Vec::new();
    let mut best: Option<(String, f64)> = None;
    let mut degraded = false;

    for profile in &state.roster {
        let agent_id = profile.agent_id;
        let view = AgentProfileView::from_profile(profile);

        let portfolio = match state.store.get_portfolio(agent_id).await {
            Ok(Some(portfolio)) => portfolio,
            Ok(None) => AgentPortfolio::new(agent_id, now),
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "Portfolio load failed");
                degraded = true;
                AgentPortfolio::new(agent_id, now)
            }
        };
        let trades = match state.trades_for(agent_id).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "Trade load failed");
                degraded = true;
                Vec::new()
            }
        };

        let metrics = aggregator::agent_metrics(&portfolio, &trades, TimeWindow::AllTime, now);

        totals.pnl_usd += portfolio.realized_pnl_usd;
        totals.open_count += metrics.open_count;
        totals.closed_count += metrics.closed_count;
        if best
            .as_ref()
            .map(|(_, pnl)| portfolio.realized_pnl_usd > *pnl)
            .unwrap_or(true)
        {
            best = Some((
                agent_id.frontend_slug().to_string(),
                portfolio.realized_pnl_usd,
            ));
        }

        summaries.push(format!(
            "{}: ${:.2} capital, {:+.1}% pnl, {} open / {} closed",
            profile.display_name,
            metrics.current_capital_usd,
            metrics.pnl_pct,
            metrics.open_count,
            metrics.closed_count,
        ));

        trades_by_agent.insert(
            agent_id.frontend_slug().to_string(),
            trades.iter().map(TradeView::from_trade).collect(),
        );

        agents.push(AgentSummaryEntry {
            agent: view,
            current_capital_usd: metrics.current_capital_usd,
            pnl_pct: metrics.pnl_pct,
            win_rate: metrics.win_rate,
            open_count: metrics.open_count,
            closed_count: metrics.closed_count,
            max_drawdown_pct: metrics.max_drawdown_pct,
        });
    }

    totals.best_agent = best.map(|(slug, _)| slug);

    Json(SummaryResponse {
        agents,
        trades_by_agent,
        totals,
        summaries,
        consensus,
        error: degraded.then(|| "data temporarily unavailable".to_string()),
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::default_roster;
    use crate::storage::MemoryStore;
    use crate::types::{Category, Side, TradeStatus};

    fn t0() -> chrono::DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn sample_trade(agent: AgentId) -> Trade {
        Trade {
            trade_id: Trade::make_id(agent, "m1", t0()),
            agent_id: agent,
            market_id: "m1".into(),
            category: Category::Crypto,
            side: Side::Yes,
            size_usd: 100.0,
            entry_probability: 0.55,
            entry_score: 60.0,
            confidence: 0.7,
            status: TradeStatus::Open,
            pnl_usd: None,
            opened_at: t0(),
            closed_at: None,
            exit_reason: None,
            reasoning: vec!["signal".into()],
            seed: "GROK_4:m1:0".into(),
        }
    }

    fn empty_state(store: Arc<MemoryStore>) -> ApiState {
        ApiState::new(
            store,
            default_roster(),
            Arc::new(RwLock::new(Vec::new())),
            Arc::new(TradeSetCache::new(chrono::Duration::seconds(30))),
            Arc::new(RwLock::new(Vec::new())),
            Arc::new(Counters::new()),
        )
    }

    async fn state_with_data() -> ApiState {
        let store = Arc::new(MemoryStore::new());
        store.save_trade(&sample_trade(AgentId::Grok4)).await.unwrap();
        let mut portfolio = AgentPortfolio::new(AgentId::Grok4, t0());
        portfolio.realized_pnl_usd = 40.0;
        store.save_portfolio(&portfolio).await.unwrap();
        empty_state(store)
    }

    #[tokio::test]
    async fn test_agent_trades_response() {
        let state = state_with_data().await;
        let resp = get_agent_trades(State(state), Path("grok".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.0.agent.id, "grok");
        assert_eq!(resp.0.trades.len(), 1);
        assert_eq!(resp.0.trades[0].side, "YES");
        assert_eq!(resp.0.trades[0].status, "OPEN");
        assert!(resp.0.error.is_none());
    }

    #[tokio::test]
    async fn test_agent_trades_unknown_is_404() {
        let state = state_with_data().await;
        let result = get_agent_trades(State(state), Path("unknown".to_string())).await;
        assert_eq!(result.err(), Some(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_summary_totals() {
        let state = state_with_data().await;
        let resp = get_summary(State(state)).await;
        assert_eq!(resp.0.agents.len(), 6);
        assert!((resp.0.totals.pnl_usd - 40.0).abs() < 1e-10);
        assert_eq!(resp.0.totals.open_count, 1);
        assert_eq!(resp.0.totals.best_agent.as_deref(), Some("grok"));
        assert_eq!(resp.0.summaries.len(), 6);
        assert!(resp.0.error.is_none());
        assert_eq!(resp.0.trades_by_agent["grok"].len(), 1);
        assert!(resp.0.trades_by_agent["claude"].is_empty());
    }

    #[test]
    fn test_trade_view_mapping() {
        let view = TradeView::from_trade(&sample_trade(AgentId::Grok4));
        assert_eq!(view.category, "Crypto");
        assert_eq!(view.side, "YES");
        assert!(view.closed_at.is_none());
        assert!(view.exit_reason.is_none());
    }

    #[test]
    fn test_resolve_agent_unknown_is_typed() {
        let state = empty_state(Arc::new(MemoryStore::new()));
        let err = state.resolve_agent("hal9000").unwrap_err();
        assert!(matches!(err, EngineError::UnknownAgent(_)));
        assert!(state.resolve_agent("deepseek").is_ok());
    }

    #[tokio::test]
    async fn test_trades_for_miss_then_hit() {
        let state = state_with_data().await;

        // First read misses and memoizes against the current fingerprint.
        let first = state.trades_for(AgentId::Grok4).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(state.counters.trade_cache_misses.load(Ordering::Relaxed), 1);
        assert_eq!(state.counters.trade_cache_hits.load(Ordering::Relaxed), 0);

        // Second read is a cache hit: no store round-trip.
        let second = state.trades_for(AgentId::Grok4).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(state.counters.trade_cache_hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_trades_for_fingerprint_mismatch_reloads() {
        let state = state_with_data().await;
        state.trades_for(AgentId::Grok4).await.unwrap();

        // The scheduler publishes a new market snapshot: the memoized
        // set no longer matches and the store is consulted again.
        *state.market_fingerprint.write().unwrap() = vec!["m-new".to_string()];
        state.trades_for(AgentId::Grok4).await.unwrap();
        assert_eq!(state.counters.trade_cache_misses.load(Ordering::Relaxed), 2);
        assert_eq!(state.counters.trade_cache_hits.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_trades_for_serves_scheduler_populated_cache() {
        // The scheduler's cycle writes the trade set; the API must serve
        // it without touching the store.
        let state = empty_state(Arc::new(MemoryStore::new()));
        let fingerprint = vec!["m1".to_string()];
        *state.market_fingerprint.write().unwrap() = fingerprint.clone();
        state.trade_cache.put(
            AgentId::Grok4,
            vec![sample_trade(AgentId::Grok4)],
            fingerprint,
            Utc::now(),
        );

        let trades = state.trades_for(AgentId::Grok4).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(state.counters.trade_cache_hits.load(Ordering::Relaxed), 1);
        assert_eq!(state.counters.trade_cache_misses.load(Ordering::Relaxed), 0);
    }
}
