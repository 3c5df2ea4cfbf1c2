//! PANTHEON — multi-agent synthetic trading engine for binary
//! prediction markets.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores persisted state, wires the adapters and the decision
//! pipeline, and runs the scheduler and adaptive tuner loops with
//! graceful shutdown.

use anyhow::Result;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pantheon::api;
use pantheon::api::routes::ApiState;
use pantheon::cache::TradeSetCache;
use pantheon::config::{AppConfig, EngineMode};
use pantheon::engine::lifecycle::LifecyclePolicy;
use pantheon::engine::scheduler::Scheduler;
use pantheon::engine::trader::TradeEngine;
use pantheon::engine::tuner;
use pantheon::llm::{build_clients, DecisionEngine};
use pantheon::markets::polymarket::{MarketCredentials, PolymarketClient};
use pantheon::markets::sim::SimulatedMarketSource;
use pantheon::markets::{MarketHub, MarketSource};
use pantheon::news::providers::{
    CurrentsFeed, GnewsFeed, MediastackFeed, NewsApiFeed, TheNewsApiFeed,
};
use pantheon::news::{NewsAggregator, NewsFeed};
use pantheon::observability::Counters;
use pantheon::profiles::default_roster;
use pantheon::search::{GoogleCseCredentials, WebSearchClient};
use pantheon::storage::{file as snapshot, MemoryStore, Store};
use pantheon::types::AgentId;

const BANNER: &str = r#"
 ____   _    _   _ _____ _   _ _____ ___  _   _
|  _ \ / \  | \ | |_   _| | | | ____/ _ \| \ | |
| |_) / _ \ |  \| | | | | |_| |  _|| | | |  \| |
|  __/ ___ \| |\  | | | |  _  | |__| |_| | |\  |
|_| /_/   \_\_| \_| |_| |_| |_|_____\___/|_| \_|

  Six agents, one market tape, synthetic capital.
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        mode = ?cfg.engine.mode,
        interval_ms = cfg.engine.interval_ms,
        debug = cfg.engine.debug,
        "PANTHEON starting up"
    );

    let counters = Arc::new(Counters::new());

    // -- Persistence ------------------------------------------------------

    let memory_store = Arc::new(MemoryStore::new());
    if !cfg.engine.state_file.is_empty() {
        if let Err(e) = snapshot::restore_snapshot(&memory_store, &cfg.engine.state_file).await {
            warn!(error = %e, "State restore failed, starting fresh");
        }
    }
    let store: Arc<dyn Store> = memory_store.clone();

    // -- Market source ----------------------------------------------------

    let market_source: Arc<dyn MarketSource> = match cfg.engine.mode {
        EngineMode::Simulation => {
            info!("Simulation mode: serving fixture markets");
            Arc::new(SimulatedMarketSource::new())
        }
        EngineMode::Live => {
            let credentials = MarketCredentials {
                api_key: AppConfig::resolve_secret(&cfg.markets.api_key_env),
                api_secret: AppConfig::resolve_secret(&cfg.markets.api_secret_env),
                api_passphrase: AppConfig::resolve_secret(&cfg.markets.api_passphrase_env),
            };
            Arc::new(PolymarketClient::new(
                cfg.markets.base_url.clone(),
                credentials,
                cfg.markets.max_pages,
                cfg.markets.page_size,
                Arc::clone(&counters),
            )?)
        }
    };
    let market_hub = Arc::new(MarketHub::new(
        market_source,
        Duration::seconds(cfg.cache.market_ttl_secs),
        Arc::clone(&counters),
    ));

    // -- News -------------------------------------------------------------

    let news_providers = build_news_providers(&cfg);
    info!(providers = news_providers.len(), "News providers configured");
    let news = Arc::new(NewsAggregator::new(
        news_providers,
        Duration::seconds(cfg.cache.news_ttl_secs),
        Arc::clone(&counters),
    ));

    // -- Decision pipeline --------------------------------------------------

    let search = Arc::new(WebSearchClient::new(
        AppConfig::resolve_secret(&cfg.search.serpapi_key_env),
        match (
            AppConfig::resolve_secret(&cfg.search.google_cse_key_env),
            AppConfig::resolve_secret(&cfg.search.google_cse_engine_env),
        ) {
            (Some(api_key), Some(engine_id)) => Some(GoogleCseCredentials { api_key, engine_id }),
            _ => None,
        },
    )?);

    let decisions = Arc::new(DecisionEngine::new(
        build_clients(&cfg),
        Duration::seconds(cfg.cache.decision_ttl_secs),
        Arc::clone(&counters),
    ));

    let trade_cache = Arc::new(TradeSetCache::new(Duration::seconds(
        cfg.cache.trade_set_ttl_secs,
    )));

    let engine = Arc::new(TradeEngine::new(
        Arc::clone(&store),
        decisions,
        search,
        Arc::clone(&trade_cache),
        LifecyclePolicy::from_config(&cfg.lifecycle),
        cfg.lifecycle.cooldown_hours,
        Arc::clone(&counters),
    ));

    // -- Roster -----------------------------------------------------------

    let mut roster = default_roster();
    for profile in roster.iter_mut() {
        if let Some(ov) = cfg.agents.get(profile.agent_id.as_str()) {
            profile.apply_override(ov);
        }
    }
    let enabled = roster.iter().filter(|p| p.enabled).count();
    info!(agents = roster.len(), enabled, "Roster loaded");

    // -- Scheduler & background loops --------------------------------------

    let scheduler = Arc::new(Scheduler::new(
        market_hub,
        news,
        engine,
        Arc::clone(&store),
        roster.clone(),
        Arc::clone(&counters),
    ));
    scheduler.init_portfolios().await?;

    if cfg.api.enabled {
        let api_state = ApiState::new(
            Arc::clone(&store),
            roster.clone(),
            scheduler.consensus_handle(),
            Arc::clone(&trade_cache),
            scheduler.market_fingerprint_handle(),
            Arc::clone(&counters),
        );
        api::spawn_api(api_state, cfg.api.port);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run_loop(
        cfg.engine.interval_ms,
        shutdown_rx.clone(),
    ));
    let tuner_task = tokio::spawn(tuner::run_loop(
        Arc::clone(&store),
        AgentId::ALL.to_vec(),
        cfg.engine.tuner_interval_hours,
        shutdown_rx,
    ));

    info!("Engine running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;
    let _ = tuner_task.await;

    if !cfg.engine.state_file.is_empty() {
        if let Err(e) = snapshot::save_snapshot(&memory_store, &cfg.engine.state_file).await {
            error!(error = %e, "Final state save failed");
        }
    }

    let snapshot = counters.snapshot();
    info!(
        cycles = snapshot.cycles_run,
        skipped = snapshot.cycles_skipped,
        market_cache_hit_ratio = format!("{:.2}", snapshot.market_cache_hit_ratio),
        llm_failures = snapshot.llm_failures,
        "PANTHEON shut down cleanly."
    );

    Ok(())
}

/// Build the news provider set from whichever credentials are present.
fn build_news_providers(cfg: &AppConfig) -> Vec<Arc<dyn NewsFeed>> {
    let mut providers: Vec<Arc<dyn NewsFeed>> = Vec::new();

    if let Some(key) = AppConfig::resolve_secret(&cfg.news.newsapi_key_env) {
        match NewsApiFeed::new(key) {
            Ok(feed) => providers.push(Arc::new(feed)),
            Err(e) => warn!(error = %e, "NewsAPI init failed"),
        }
    }
    if let Some(key) = AppConfig::resolve_secret(&cfg.news.gnews_key_env) {
        match GnewsFeed::new(key) {
            Ok(feed) => providers.push(Arc::new(feed)),
            Err(e) => warn!(error = %e, "GNews init failed"),
        }
    }
    if let Some(key) = AppConfig::resolve_secret(&cfg.news.thenewsapi_key_env) {
        match TheNewsApiFeed::new(key) {
            Ok(feed) => providers.push(Arc::new(feed)),
            Err(e) => warn!(error = %e, "TheNewsAPI init failed"),
        }
    }
    if let Some(key) = AppConfig::resolve_secret(&cfg.news.currents_key_env) {
        match CurrentsFeed::new(key) {
            Ok(feed) => providers.push(Arc::new(feed)),
            Err(e) => warn!(error = %e, "Currents init failed"),
        }
    }
    if let Some(key) = AppConfig::resolve_secret(&cfg.news.mediastack_key_env) {
        match MediastackFeed::new(key) {
            Ok(feed) => providers.push(Arc::new(feed)),
            Err(e) => warn!(error = %e, "Mediastack init failed"),
        }
    }

    providers
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if cfg.engine.debug {
        "pantheon=debug"
    } else {
        "pantheon=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json_logging = std::env::var("PANTHEON_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
