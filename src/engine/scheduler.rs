//! Process-wide cycle scheduler.
//!
//! Owns the trading cadence: one cycle on startup, then one per
//! interval. At most one cycle is ever in flight; a tick that arrives
//! while a cycle is running is skipped, not queued. Within a cycle the
//! market and news snapshots are fetched once and shared by reference
//! across all agents, which run in parallel with per-agent failure
//! capture. The scheduler is the only writer of portfolios.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use crate::aggregator;
use crate::cache::TradeSetCache;
use crate::engine::trader::TradeEngine;
use crate::markets::MarketHub;
use crate::news::NewsAggregator;
use crate::observability::{AgentCycleRecord, Counters, CycleRecord};
use crate::profiles::AgentProfile;
use crate::storage::Store;
use crate::types::{AgentId, AgentPortfolio, ConsensusRecord};

/// Cycle records retained for alerting and the read API.
const RECORD_HISTORY: usize = 100;

/// Outcome of a `run_cycle` invocation.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleRecord),
    /// A cycle was already in flight.
    Skipped,
}

pub struct Scheduler {
    markets: Arc<MarketHub>,
    news: Arc<NewsAggregator>,
    engine: Arc<TradeEngine>,
    store: Arc<dyn Store>,
    roster: Vec<AgentProfile>,
    counters: Arc<Counters>,

    /// In-memory working portfolios, exclusively owned by the scheduler.
    portfolios: Mutex<HashMap<AgentId, AgentPortfolio>>,
    /// At-most-one-cycle gate.
    cycle_gate: Mutex<()>,
    cycle_number: AtomicU64,

    /// Instrumentation: concurrent entries into the shared section.
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,

    records: RwLock<Vec<CycleRecord>>,
    consensus: Arc<RwLock<Vec<ConsensusRecord>>>,
    /// Sorted market ids of the latest snapshot; the read API checks
    /// trade-cache fingerprints against this.
    market_fingerprint: Arc<RwLock<Vec<String>>>,
}

impl Scheduler {
    pub fn new(
        markets: Arc<MarketHub>,
        news: Arc<NewsAggregator>,
        engine: Arc<TradeEngine>,
        store: Arc<dyn Store>,
        roster: Vec<AgentProfile>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            markets,
            news,
            engine,
            store,
            roster,
            counters,
            portfolios: Mutex::new(HashMap::new()),
            cycle_gate: Mutex::new(()),
            cycle_number: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            records: RwLock::new(Vec::new()),
            consensus: Arc::new(RwLock::new(Vec::new())),
            market_fingerprint: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Load persisted portfolios, creating fresh ones for agents seen
    /// for the first time. Called once before the loop starts.
    pub async fn init_portfolios(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        let mut portfolios = self.portfolios.lock().await;
        for profile in &self.roster {
            let portfolio = match self.store.get_portfolio(profile.agent_id).await {
                Ok(Some(portfolio)) => portfolio,
                Ok(None) => AgentPortfolio::new(profile.agent_id, now),
                Err(e) => {
                    warn!(agent = %profile.agent_id, error = %e, "Portfolio load failed, starting fresh");
                    AgentPortfolio::new(profile.agent_id, now)
                }
            };
            portfolios.insert(profile.agent_id, portfolio);
        }
        info!(agents = portfolios.len(), "Portfolios initialised");
        Ok(())
    }

    /// Run one trading cycle across all enabled agents.
    pub async fn run_cycle(&self) -> CycleOutcome {
        // Skip, don't queue: a tick during an in-flight cycle is dropped.
        let Ok(_guard) = self.cycle_gate.try_lock() else {
            self.counters.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            return CycleOutcome::Skipped;
        };

        let entered = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(entered, Ordering::SeqCst);

        let outcome = self.run_cycle_inner().await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle_inner(&self) -> CycleOutcome {
        let cycle_number = self.cycle_number.fetch_add(1, Ordering::Relaxed) + 1;
        let started = std::time::Instant::now();
        let now = Utc::now();

        info!(cycle = cycle_number, "Starting cycle");

        // One shared snapshot for every agent in this cycle.
        let markets = self.markets.fetch_all_markets(now).await;
        let news = self.news.fetch_latest_news(now).await;

        {
            let fingerprint = TradeSetCache::fingerprint(
                &markets
                    .iter()
                    .map(|m| m.market_id.clone())
                    .collect::<Vec<_>>(),
            );
            *self.market_fingerprint.write().unwrap() = fingerprint;
        }

        let enabled: Vec<&AgentProfile> =
            self.roster.iter().filter(|p| p.enabled).collect();

        // Clone each agent's working portfolio; write back only on
        // success so a failed agent resumes from its last good state.
        let snapshots: HashMap<AgentId, AgentPortfolio> = {
            let portfolios = self.portfolios.lock().await;
            enabled
                .iter()
                .map(|p| {
                    let portfolio = portfolios
                        .get(&p.agent_id)
                        .cloned()
                        .unwrap_or_else(|| AgentPortfolio::new(p.agent_id, now));
                    (p.agent_id, portfolio)
                })
                .collect()
        };

        let runs = enabled.iter().map(|profile| {
            let engine = Arc::clone(&self.engine);
            let markets = Arc::clone(&markets);
            let news = Arc::clone(&news);
            let portfolio = snapshots
                .get(&profile.agent_id)
                .cloned()
                .unwrap_or_else(|| AgentPortfolio::new(profile.agent_id, now));
            let profile = (*profile).clone();
            async move {
                let agent_started = std::time::Instant::now();
                let agent_id = profile.agent_id;
                match engine
                    .run_agent_cycle(&profile, portfolio, &markets, &news, now)
                    .await
                {
                    Ok(outcome) => (agent_id, outcome.record, Some(outcome.portfolio)),
                    Err(e) => {
                        error!(agent = %agent_id, error = %e, "Agent cycle failed");
                        (
                            agent_id,
                            AgentCycleRecord::failed(
                                agent_id,
                                agent_started.elapsed().as_millis() as u64,
                                e.to_string(),
                            ),
                            None,
                        )
                    }
                }
            }
        });

        // Wait-for-all: one agent erroring neither halts the cycle nor
        // poisons its siblings.
        let results = join_all(runs).await;

        let mut agent_records = Vec::with_capacity(results.len());
        {
            let mut portfolios = self.portfolios.lock().await;
            for (agent_id, record, portfolio) in results {
                if let Some(portfolio) = portfolio {
                    portfolios.insert(agent_id, portfolio);
                }
                agent_records.push(record);
            }
        }

        // Consensus reads a point-in-time snapshot after all agents.
        match self.store.all_open_trades().await {
            Ok(open_trades) => {
                let consensus = aggregator::consensus(&open_trades);
                *self.consensus.write().unwrap() = consensus;
            }
            Err(e) => warn!(error = %e, "Consensus snapshot failed"),
        }

        let record = CycleRecord {
            cycle_number,
            started_at: now,
            markets_fetched: markets.len(),
            news_fetched: news.len(),
            agents: agent_records,
            cycle_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            cycle = cycle_number,
            markets = record.markets_fetched,
            news = record.news_fetched,
            new_trades = record.total_new_trades(),
            closed_trades = record.total_closed_trades(),
            failed_agents = record.failed_agents(),
            cycle_ms = record.cycle_ms,
            "Cycle complete"
        );

        {
            let mut records = self.records.write().unwrap();
            records.push(record.clone());
            let excess = records.len().saturating_sub(RECORD_HISTORY);
            if excess > 0 {
                records.drain(..excess);
            }
        }
        self.counters.cycles_run.fetch_add(1, Ordering::Relaxed);

        CycleOutcome::Completed(record)
    }

    /// The scheduler loop: one cycle immediately, then one per interval
    /// until the shutdown signal flips.
    pub async fn run_loop(
        self: Arc<Self>,
        interval_ms: u64,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_ms, "Scheduler loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler loop stopping");
                        break;
                    }
                }
            }
        }
    }

    // -- Read accessors ---------------------------------------------------

    /// Highest number of concurrently active cycles ever observed.
    /// Stays at 1 when the at-most-one contract holds.
    pub fn max_concurrent_cycles(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn recent_records(&self) -> Vec<CycleRecord> {
        self.records.read().unwrap().clone()
    }

    pub fn latest_consensus(&self) -> Vec<ConsensusRecord> {
        self.consensus.read().unwrap().clone()
    }

    /// Shared handle to the consensus snapshot, for the read API.
    pub fn consensus_handle(&self) -> Arc<RwLock<Vec<ConsensusRecord>>> {
        Arc::clone(&self.consensus)
    }

    /// Shared handle to the latest market-set fingerprint, for the read
    /// API's trade-cache lookups.
    pub fn market_fingerprint_handle(&self) -> Arc<RwLock<Vec<String>>> {
        Arc::clone(&self.market_fingerprint)
    }

    /// Current working portfolios (clones; callers cannot mutate).
    pub async fn portfolio_snapshot(&self) -> Vec<AgentPortfolio> {
        let portfolios = self.portfolios.lock().await;
        let mut list: Vec<AgentPortfolio> = portfolios.values().cloned().collect();
        list.sort_by_key(|p| p.agent_id.as_str());
        list
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
