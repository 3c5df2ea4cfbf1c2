//! Per-agent trading cycle.
//!
//! One agent's pass over the shared market/news snapshot: evaluate
//! exits on existing positions, score and rank candidates, request a
//! decision (LLM with deterministic fallback), apply personality rules,
//! size the entry against the portfolio caps, and persist the results.
//! Markets are processed sequentially within an agent so portfolio
//! mutations and the max-trades cap serialize naturally.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::TradeSetCache;
use crate::determinism;
use crate::engine::lifecycle::{
    check_exit, close_trade, refresh_unrealized, ExitSignal, LifecyclePolicy,
};
use crate::llm::{DecisionContext, DecisionEngine, DecisionOutcome};
use crate::observability::{AgentCycleRecord, Counters};
use crate::profiles::AgentProfile;
use crate::scoring::{filter_candidates, relevant_articles, score_market};
use crate::search::WebSearchClient;
use crate::storage::Store;
use crate::strategy::fallback::fallback_decision;
use crate::strategy::personality::apply_personality;
use crate::strategy::sizing::{compute_size, entry_gate, update_cooldown};
use crate::types::{
    AgentPortfolio, EngineError, ExitReason, Market, NewsArticle, Position, ScoredMarket, Trade,
    TradeDecision, TradeStatus,
};

/// Articles included in LLM context per market.
const CONTEXT_ARTICLE_LIMIT: usize = 5;

/// Result of one agent's cycle: the record for observability plus the
/// advanced portfolio the scheduler writes back on success.
pub struct AgentCycleOutcome {
    pub record: AgentCycleRecord,
    pub portfolio: AgentPortfolio,
}

pub struct TradeEngine {
    store: Arc<dyn Store>,
    decisions: Arc<DecisionEngine>,
    search: Arc<WebSearchClient>,
    trade_cache: Arc<TradeSetCache>,
    policy: LifecyclePolicy,
    cooldown_hours: i64,
    counters: Arc<Counters>,
}

impl TradeEngine {
    pub fn new(
        store: Arc<dyn Store>,
        decisions: Arc<DecisionEngine>,
        search: Arc<WebSearchClient>,
        trade_cache: Arc<TradeSetCache>,
        policy: LifecyclePolicy,
        cooldown_hours: i64,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            store,
            decisions,
            search,
            trade_cache,
            policy,
            cooldown_hours,
            counters,
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Run one full cycle for one agent against the shared snapshot.
    ///
    /// Persistence errors propagate so the scheduler records the agent
    /// as failed and keeps its previous portfolio state.
    pub async fn run_agent_cycle(
        &self,
        profile: &AgentProfile,
        mut portfolio: AgentPortfolio,
        markets: &[Market],
        news: &[NewsArticle],
        now: DateTime<Utc>,
    ) -> Result<AgentCycleOutcome, EngineError> {
        let started = std::time::Instant::now();
        let agent_id = profile.agent_id;

        let adaptive = self.store.get_adaptive_config(agent_id).await?;
        let index: HashMap<&str, &Market> = markets
            .iter()
            .map(|m| (m.market_id.as_str(), m))
            .collect();

        // -- Exits on existing positions ---------------------------------

        let open_trades = self.store.open_trades(agent_id).await?;
        let mut closed_count = 0usize;

        for market_id in portfolio.open_positions.keys().cloned().collect::<Vec<_>>() {
            let Some(position) = portfolio.open_positions.get(&market_id) else {
                continue;
            };
            let market = index.get(market_id.as_str()).copied();
            let rescore =
                market.map(|m| score_market(m, news, profile, adaptive.as_ref(), now).score);

            let Some(signal) = check_exit(position, market, rescore, now, &self.policy) else {
                continue;
            };

            let Some(open_trade) = open_trades.iter().find(|t| t.market_id == market_id) else {
                warn!(
                    agent = %agent_id,
                    market = %market_id,
                    "Position without a persisted open trade, dropping"
                );
                portfolio.open_positions.remove(&market_id);
                continue;
            };

            let closed = close_trade(&mut portfolio, open_trade, &signal, now);
            self.store.save_trade(&closed).await?;
            closed_count += 1;
        }

        refresh_unrealized(&mut portfolio, |id| {
            index.get(id).map(|m| m.current_probability)
        });
        update_cooldown(&mut portfolio, now, self.cooldown_hours);

        // -- Candidate entries -------------------------------------------

        let candidates = filter_candidates(markets, profile);
        let mut ranked: Vec<ScoredMarket> = candidates
            .iter()
            .map(|m| score_market(m, news, profile, adaptive.as_ref(), now))
            .collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let candidate_count = ranked.len();

        let risk_multiplier = adaptive.as_ref().map(|a| a.risk_multiplier).unwrap_or(1.0);
        let mut new_count = 0usize;

        for (rank, scored) in ranked.iter().enumerate() {
            let market_id = scored.market.market_id.clone();
            let held_side = portfolio.open_positions.get(&market_id).map(|p| p.side);
            let gate = entry_gate(profile, &portfolio, now);

            match held_side {
                Some(held) => {
                    // Flips are entries too: blocked during cooldown.
                    if portfolio.in_cooldown(now) {
                        continue;
                    }
                    let (decision, seed) =
                        self.decide(profile, scored, news, rank as u32, now).await;
                    let (adjusted, size_multiplier) =
                        apply_personality(profile, scored, decision);

                    let flip = adjusted.side != held
                        && adjusted.confidence >= self.policy.flip_confidence_threshold;
                    if !flip {
                        continue;
                    }

                    let Some(open_trade) = open_trades
                        .iter()
                        .find(|t| t.market_id == market_id && t.is_open())
                    else {
                        continue;
                    };

                    let signal = ExitSignal {
                        reason: ExitReason::Flip,
                        exit_probability: scored.market.current_probability,
                    };
                    let closed = close_trade(&mut portfolio, open_trade, &signal, now);
                    self.store.save_trade(&closed).await?;
                    closed_count += 1;

                    if self
                        .open_position(
                            profile,
                            &mut portfolio,
                            scored,
                            adjusted,
                            size_multiplier,
                            risk_multiplier,
                            seed,
                            now,
                        )
                        .await?
                    {
                        new_count += 1;
                    }
                }
                None => {
                    if let Some(block) = gate {
                        debug!(agent = %agent_id, market = %market_id, block = %block, "Entry blocked");
                        continue;
                    }

                    let (decision, seed) =
                        self.decide(profile, scored, news, rank as u32, now).await;
                    let (adjusted, size_multiplier) =
                        apply_personality(profile, scored, decision);

                    if self
                        .open_position(
                            profile,
                            &mut portfolio,
                            scored,
                            adjusted,
                            size_multiplier,
                            risk_multiplier,
                            seed,
                            now,
                        )
                        .await?
                    {
                        new_count += 1;
                    }
                }
            }
        }

        // -- Finalize -----------------------------------------------------

        refresh_unrealized(&mut portfolio, |id| {
            index.get(id).map(|m| m.current_probability)
        });
        portfolio.update_peak();
        portfolio.last_updated = now;
        self.store.save_portfolio(&portfolio).await?;

        let all_trades = self.store.load_trades(agent_id, None).await?;
        let fingerprint = TradeSetCache::fingerprint(
            &markets
                .iter()
                .map(|m| m.market_id.clone())
                .collect::<Vec<_>>(),
        );
        self.trade_cache.put(agent_id, all_trades, fingerprint, now);

        Ok(AgentCycleOutcome {
            record: AgentCycleRecord {
                agent_id,
                candidate_markets: candidate_count,
                new_trades: new_count,
                closed_trades: closed_count,
                open_positions: portfolio.open_positions.len(),
                cycle_ms: started.elapsed().as_millis() as u64,
                error: None,
            },
            portfolio,
        })
    }

    /// Request a decision for one market: cache/LLM first, deterministic
    /// fallback on any unavailability. Returns the decision plus the
    /// seed that reproduces the fallback branch.
    async fn decide(
        &self,
        profile: &AgentProfile,
        scored: &ScoredMarket,
        news: &[NewsArticle],
        rank: u32,
        now: DateTime<Utc>,
    ) -> (TradeDecision, String) {
        let seed = determinism::seed(profile.agent_id, &scored.market.market_id, rank);

        let articles = relevant_articles(&scored.market.question, news, CONTEXT_ARTICLE_LIMIT);
        let search_results = if self.search.is_configured() {
            self.search.search_web(&scored.market.question).await
        } else {
            Vec::new()
        };
        let context = DecisionContext {
            articles,
            search_results: &search_results,
        };

        match self
            .decisions
            .decide(profile.agent_id, scored, &context, now)
            .await
        {
            DecisionOutcome::Decision(decision) => (decision, seed),
            DecisionOutcome::Unavailable(reason) => {
                debug!(
                    agent = %profile.agent_id,
                    market = %scored.market.market_id,
                    reason = %reason,
                    "LLM unavailable, using deterministic fallback"
                );
                (fallback_decision(scored, profile, &seed), seed)
            }
        }
    }

    /// Size and open a position. Returns whether a trade was opened.
    #[allow(clippy::too_many_arguments)]
    async fn open_position(
        &self,
        profile: &AgentProfile,
        portfolio: &mut AgentPortfolio,
        scored: &ScoredMarket,
        decision: TradeDecision,
        size_multiplier: f64,
        risk_multiplier: f64,
        seed: String,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let size = match compute_size(
            profile,
            portfolio,
            scored.market.category,
            decision.confidence,
            size_multiplier,
            risk_multiplier,
        ) {
            Ok(size) => size,
            Err(rejection) => {
                debug!(
                    agent = %profile.agent_id,
                    market = %scored.market.market_id,
                    rejection = %rejection,
                    "Entry dropped at sizing"
                );
                return Ok(false);
            }
        };

        let market_id = scored.market.market_id.clone();
        let trade = Trade {
            trade_id: Trade::make_id(profile.agent_id, &market_id, now),
            agent_id: profile.agent_id,
            market_id: market_id.clone(),
            category: scored.market.category,
            side: decision.side,
            size_usd: size,
            entry_probability: scored.market.current_probability,
            entry_score: scored.score,
            confidence: decision.confidence,
            status: TradeStatus::Open,
            pnl_usd: None,
            opened_at: now,
            closed_at: None,
            exit_reason: None,
            reasoning: decision.reasoning,
            seed,
        };

        self.store.save_trade(&trade).await?;
        portfolio.open_positions.insert(
            market_id.clone(),
            Position {
                market_id,
                side: trade.side,
                size_usd: trade.size_usd,
                entry_probability: trade.entry_probability,
                entry_score: trade.entry_score,
                opened_at: now,
                category: scored.market.category,
            },
        );
        portfolio.last_updated = now;

        debug!(agent = %profile.agent_id, trade = %trade, "Position opened");
        Ok(true)
    }
}
