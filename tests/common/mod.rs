//! Shared test harness: controllable stub upstreams and a builder for
//! the full engine stack, all in-memory and deterministic.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pantheon::cache::TradeSetCache;
use pantheon::engine::lifecycle::LifecyclePolicy;
use pantheon::engine::scheduler::Scheduler;
use pantheon::engine::trader::TradeEngine;
use pantheon::llm::{DecisionEngine, LlmClient};
use pantheon::markets::{MarketHub, MarketSource};
use pantheon::news::NewsAggregator;
use pantheon::observability::Counters;
use pantheon::profiles::{default_roster, profile_for, AgentProfile};
use pantheon::search::WebSearchClient;
use pantheon::storage::{MemoryStore, Store};
use pantheon::types::{
    AgentId, AgentPortfolio, Category, Market, MarketStatus, Position, Side, Trade, TradeStatus,
};

/// Fixed test epoch.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
}

/// A market source whose population and failure mode tests control.
pub struct StubMarketSource {
    pub markets: Mutex<Vec<Market>>,
    pub fail: AtomicBool,
}

impl StubMarketSource {
    pub fn new(markets: Vec<Market>) -> Arc<Self> {
        Arc::new(Self {
            markets: Mutex::new(markets),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set_markets(&self, markets: Vec<Market>) {
        *self.markets.lock().unwrap() = markets;
    }
}

#[async_trait]
impl MarketSource for StubMarketSource {
    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        if self.fail.load(Ordering::Relaxed) {
            anyhow::bail!("HTTP 500 Internal Server Error");
        }
        Ok(self.markets.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// An LLM client that always fails, to force the fallback branch while
/// a client is configured.
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        anyhow::bail!("HTTP 503 Service Unavailable")
    }

    fn model_name(&self) -> &str {
        "failing-model"
    }

    fn provider_name(&self) -> &str {
        "stub"
    }
}

/// The full in-memory stack used by scenario tests.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub engine: Arc<TradeEngine>,
    pub counters: Arc<Counters>,
    pub trade_cache: Arc<TradeSetCache>,
}

/// Build a `TradeEngine` over a fresh in-memory store. `clients` is
/// empty for the pure-fallback path.
pub fn build_harness(clients: HashMap<AgentId, Arc<dyn LlmClient>>) -> Harness {
    let counters = Arc::new(Counters::new());
    let store = Arc::new(MemoryStore::new());
    let trade_cache = Arc::new(TradeSetCache::new(Duration::seconds(30)));
    let decisions = Arc::new(DecisionEngine::new(
        clients,
        Duration::minutes(5),
        Arc::clone(&counters),
    ));
    let engine = Arc::new(TradeEngine::new(
        store.clone() as Arc<dyn Store>,
        decisions,
        Arc::new(WebSearchClient::new(None, None).unwrap()),
        Arc::clone(&trade_cache),
        LifecyclePolicy::default(),
        24,
        Arc::clone(&counters),
    ));
    Harness {
        store,
        engine,
        counters,
        trade_cache,
    }
}

/// Build a full scheduler around a stub market source.
pub fn build_scheduler(source: Arc<StubMarketSource>, harness: &Harness) -> Arc<Scheduler> {
    let hub = Arc::new(MarketHub::new(
        source,
        Duration::seconds(60),
        Arc::clone(&harness.counters),
    ));
    let news = Arc::new(NewsAggregator::new(
        Vec::new(),
        Duration::minutes(5),
        Arc::clone(&harness.counters),
    ));
    Arc::new(Scheduler::new(
        hub,
        news,
        Arc::clone(&harness.engine),
        harness.store.clone() as Arc<dyn Store>,
        default_roster(),
        Arc::clone(&harness.counters),
    ))
}

pub fn grok_profile() -> AgentProfile {
    profile_for(&default_roster(), AgentId::Grok4).unwrap().clone()
}

/// The scenario-A market: strong volume, near-even probability.
pub fn market_m1() -> Market {
    Market {
        market_id: "m1".to_string(),
        question: "Will X happen by 2026?".to_string(),
        category: Category::Crypto,
        volume_usd: 120_000.0,
        liquidity_usd: 30_000.0,
        current_probability: 0.55,
        price_change_24h: 0.04,
        status: MarketStatus::Active,
        resolved_outcome: None,
    }
}

/// A low-volume market that passes no agent's candidate filter, so the
/// tests can exercise exits without triggering fresh entries.
pub fn quiet_market(id: &str, probability: f64) -> Market {
    Market {
        market_id: id.to_string(),
        question: format!("Will {id} resolve?"),
        category: Category::Crypto,
        volume_usd: 10_000.0,
        liquidity_usd: 2_000.0,
        current_probability: probability,
        price_change_24h: 0.0,
        status: MarketStatus::Active,
        resolved_outcome: None,
    }
}

/// Seed an open position plus its persisted open trade.
pub async fn seed_position(
    store: &Arc<MemoryStore>,
    portfolio: &mut AgentPortfolio,
    market_id: &str,
    side: Side,
    entry_probability: f64,
    size_usd: f64,
    opened_at: DateTime<Utc>,
) -> Trade {
    let trade = Trade {
        trade_id: Trade::make_id(portfolio.agent_id, market_id, opened_at),
        agent_id: portfolio.agent_id,
        market_id: market_id.to_string(),
        category: Category::Crypto,
        side,
        size_usd,
        entry_probability,
        entry_score: 8.0,
        confidence: 0.7,
        status: TradeStatus::Open,
        pnl_usd: None,
        opened_at,
        closed_at: None,
        exit_reason: None,
        reasoning: vec!["seeded".to_string()],
        seed: format!("{}:{market_id}:0", portfolio.agent_id),
    };
    store.save_trade(&trade).await.unwrap();

    portfolio.open_positions.insert(
        market_id.to_string(),
        Position {
            market_id: market_id.to_string(),
            side,
            size_usd,
            entry_probability,
            entry_score: 8.0,
            opened_at,
            category: Category::Crypto,
        },
    );
    store.save_portfolio(portfolio).await.unwrap();
    trade
}
