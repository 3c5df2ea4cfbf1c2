//! Persistence layer.
//!
//! Storage-agnostic `Store` trait with an in-memory implementation.
//! Trade writes are idempotent upserts keyed by trade id: re-saving an
//! identical state is a no-op, and any attempt to reopen a CLOSED trade
//! is rejected as an invariant violation. The scheduler is the single
//! writer; the read API and aggregator only read.

pub mod file;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{
    AdaptiveConfig, AgentId, AgentPortfolio, EngineError, Trade, TradeStatus,
};

/// Persistence operations used by the engine and the read API.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert a portfolio by agent id. Last writer wins; the scheduler's
    /// single-writer discipline makes this safe.
    async fn save_portfolio(&self, portfolio: &AgentPortfolio) -> Result<(), EngineError>;

    async fn get_portfolio(&self, agent_id: AgentId)
        -> Result<Option<AgentPortfolio>, EngineError>;

    async fn all_portfolios(&self) -> Result<Vec<AgentPortfolio>, EngineError>;

    /// Idempotent upsert by `trade_id`. Reopening a CLOSED trade is
    /// rejected; re-closing a CLOSED trade is a no-op (first close wins).
    async fn save_trade(&self, trade: &Trade) -> Result<(), EngineError>;

    /// All trades for an agent, chronological by `opened_at`. `since`
    /// filters on `opened_at`.
    async fn load_trades(
        &self,
        agent_id: AgentId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, EngineError>;

    /// Currently-open trades for an agent.
    async fn open_trades(&self, agent_id: AgentId) -> Result<Vec<Trade>, EngineError>;

    /// Open trades across every agent (consensus snapshot input).
    async fn all_open_trades(&self) -> Result<Vec<Trade>, EngineError>;

    async fn get_adaptive_config(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<AdaptiveConfig>, EngineError>;

    async fn save_adaptive_config(&self, config: &AdaptiveConfig) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    portfolios: HashMap<AgentId, AgentPortfolio>,
    trades: HashMap<String, Trade>,
    adaptive_configs: HashMap<AgentId, AdaptiveConfig>,
}

/// In-memory `Store`. The default for development and tests; also the
/// working set behind the JSON snapshot in `file`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_portfolio(&self, portfolio: &AgentPortfolio) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        inner
            .portfolios
            .insert(portfolio.agent_id, portfolio.clone());
        Ok(())
    }

    async fn get_portfolio(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<AgentPortfolio>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner.portfolios.get(&agent_id).cloned())
    }

    async fn all_portfolios(&self) -> Result<Vec<AgentPortfolio>, EngineError> {
        let inner = self.inner.read().await;
        let mut portfolios: Vec<AgentPortfolio> = inner.portfolios.values().cloned().collect();
        portfolios.sort_by_key(|p| p.agent_id.as_str());
        Ok(portfolios)
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.trades.get(&trade.trade_id) {
            match (existing.status, trade.status) {
                // CLOSED is terminal: the first close wins, repeats are
                // no-ops.
                (TradeStatus::Closed, TradeStatus::Closed) => return Ok(()),
                (TradeStatus::Closed, TradeStatus::Open) => {
                    return Err(EngineError::InvariantViolation(format!(
                        "attempted reopen of CLOSED trade {}",
                        trade.trade_id
                    )));
                }
                // OPEN→OPEN and OPEN→CLOSED both overwrite.
                _ => {}
            }
        }

        inner.trades.insert(trade.trade_id.clone(), trade.clone());
        Ok(())
    }

    async fn load_trades(
        &self,
        agent_id: AgentId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Trade>, EngineError> {
        let inner = self.inner.read().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| t.agent_id == agent_id)
            .filter(|t| since.map(|s| t.opened_at >= s).unwrap_or(true))
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.opened_at);
        Ok(trades)
    }

    async fn open_trades(&self, agent_id: AgentId) -> Result<Vec<Trade>, EngineError> {
        let inner = self.inner.read().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| t.agent_id == agent_id && t.is_open())
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.opened_at);
        Ok(trades)
    }

    async fn all_open_trades(&self) -> Result<Vec<Trade>, EngineError> {
        let inner = self.inner.read().await;
        let mut trades: Vec<Trade> = inner
            .trades
            .values()
            .filter(|t| t.is_open())
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.opened_at);
        Ok(trades)
    }

    async fn get_adaptive_config(
        &self,
        agent_id: AgentId,
    ) -> Result<Option<AdaptiveConfig>, EngineError> {
        let inner = self.inner.read().await;
        Ok(inner.adaptive_configs.get(&agent_id).cloned())
    }

    async fn save_adaptive_config(&self, config: &AdaptiveConfig) -> Result<(), EngineError> {
        let mut inner = self.inner.write().await;
        inner.adaptive_configs.insert(config.agent_id, config.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExitReason, Side};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn open_trade(market_id: &str, opened_at: DateTime<Utc>) -> Trade {
        Trade {
            trade_id: Trade::make_id(AgentId::Grok4, market_id, opened_at),
            agent_id: AgentId::Grok4,
            market_id: market_id.to_string(),
            category: crate::types::Category::Crypto,
            side: Side::Yes,
            size_usd: 100.0,
            entry_probability: 0.55,
            entry_score: 60.0,
            confidence: 0.7,
            status: TradeStatus::Open,
            pnl_usd: None,
            opened_at,
            closed_at: None,
            exit_reason: None,
            reasoning: vec![],
            seed: "GROK_4:m1:0".into(),
        }
    }

    fn closed(mut trade: Trade, pnl: f64) -> Trade {
        trade.status = TradeStatus::Closed;
        trade.pnl_usd = Some(pnl);
        trade.closed_at = Some(trade.opened_at + chrono::Duration::hours(2));
        trade.exit_reason = Some(ExitReason::TakeProfit);
        trade
    }

    #[tokio::test]
    async fn test_portfolio_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_portfolio(AgentId::Grok4).await.unwrap().is_none());

        let portfolio = AgentPortfolio::new(AgentId::Grok4, t0());
        store.save_portfolio(&portfolio).await.unwrap();
        let loaded = store.get_portfolio(AgentId::Grok4).await.unwrap().unwrap();
        assert_eq!(loaded.current_capital_usd(), 3000.0);
    }

    #[tokio::test]
    async fn test_save_trade_idempotent() {
        let store = MemoryStore::new();
        let trade = open_trade("m1", t0());
        store.save_trade(&trade).await.unwrap();
        store.save_trade(&trade).await.unwrap();

        let trades = store.load_trades(AgentId::Grok4, None).await.unwrap();
        assert_eq!(trades.len(), 1);
    }

    #[tokio::test]
    async fn test_open_to_closed_transition() {
        let store = MemoryStore::new();
        let trade = open_trade("m1", t0());
        store.save_trade(&trade).await.unwrap();
        store.save_trade(&closed(trade, 40.0)).await.unwrap();

        let trades = store.load_trades(AgentId::Grok4, None).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].status, TradeStatus::Closed);
        assert_eq!(trades[0].pnl_usd, Some(40.0));
    }

    #[tokio::test]
    async fn test_reopen_closed_rejected() {
        let store = MemoryStore::new();
        let trade = open_trade("m1", t0());
        store.save_trade(&closed(trade.clone(), 40.0)).await.unwrap();

        let result = store.save_trade(&trade).await;
        assert!(matches!(result, Err(EngineError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_reclose_is_noop_first_close_wins() {
        let store = MemoryStore::new();
        let trade = open_trade("m1", t0());
        store.save_trade(&closed(trade.clone(), 40.0)).await.unwrap();
        store.save_trade(&closed(trade, -10.0)).await.unwrap();

        let trades = store.load_trades(AgentId::Grok4, None).await.unwrap();
        assert_eq!(trades[0].pnl_usd, Some(40.0));
    }

    #[tokio::test]
    async fn test_load_trades_chronological_and_windowed() {
        let store = MemoryStore::new();
        let late = open_trade("m2", t0() + chrono::Duration::hours(5));
        let early = open_trade("m1", t0());
        store.save_trade(&late).await.unwrap();
        store.save_trade(&early).await.unwrap();

        let all = store.load_trades(AgentId::Grok4, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].market_id, "m1");
        assert_eq!(all[1].market_id, "m2");

        let windowed = store
            .load_trades(AgentId::Grok4, Some(t0() + chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].market_id, "m2");
    }

    #[tokio::test]
    async fn test_open_trades_filter() {
        let store = MemoryStore::new();
        store.save_trade(&open_trade("m1", t0())).await.unwrap();
        store
            .save_trade(&closed(open_trade("m2", t0()), -5.0))
            .await
            .unwrap();

        let open = store.open_trades(AgentId::Grok4).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].market_id, "m1");

        let all_open = store.all_open_trades().await.unwrap();
        assert_eq!(all_open.len(), 1);
    }

    #[tokio::test]
    async fn test_trades_isolated_per_agent() {
        let store = MemoryStore::new();
        store.save_trade(&open_trade("m1", t0())).await.unwrap();
        let trades = store.load_trades(AgentId::Gpt5, None).await.unwrap();
        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn test_adaptive_config_roundtrip() {
        let store = MemoryStore::new();
        assert!(store
            .get_adaptive_config(AgentId::Qwen25)
            .await
            .unwrap()
            .is_none());

        let mut config = AdaptiveConfig::neutral(AgentId::Qwen25, t0());
        config.risk_multiplier = 0.75;
        store.save_adaptive_config(&config).await.unwrap();

        let loaded = store
            .get_adaptive_config(AgentId::Qwen25)
            .await
            .unwrap()
            .unwrap();
        assert!((loaded.risk_multiplier - 0.75).abs() < 1e-10);
    }

    #[tokio::test]
    async fn test_all_portfolios_sorted() {
        let store = MemoryStore::new();
        store
            .save_portfolio(&AgentPortfolio::new(AgentId::Qwen25, t0()))
            .await
            .unwrap();
        store
            .save_portfolio(&AgentPortfolio::new(AgentId::Claude45, t0()))
            .await
            .unwrap();
        let portfolios = store.all_portfolios().await.unwrap();
        assert_eq!(portfolios.len(), 2);
        assert_eq!(portfolios[0].agent_id, AgentId::Claude45);
    }
}
