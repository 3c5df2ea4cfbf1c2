//! Reproducibility invariants: byte-equal trades across identical
//! runs, the fallback round-trip, and the at-most-one-cycle contract.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::*;
use pantheon::engine::scheduler::CycleOutcome;
use pantheon::llm::LlmClient;
use pantheon::storage::Store;
use pantheon::types::{AgentId, AgentPortfolio};

/// Run one cold-start agent cycle on a fresh stack and return the
/// serialized trade set.
async fn run_once(clients: HashMap<AgentId, Arc<dyn LlmClient>>) -> String {
    let harness = build_harness(clients);
    let profile = grok_profile();

    harness
        .engine
        .run_agent_cycle(
            &profile,
            AgentPortfolio::new(AgentId::Grok4, t0()),
            &[market_m1(), quiet_market("noise", 0.40)],
            &[],
            t0(),
        )
        .await
        .unwrap();

    let trades = harness.store.load_trades(AgentId::Grok4, None).await.unwrap();
    serde_json::to_string(&trades).unwrap()
}

#[tokio::test]
async fn identical_inputs_yield_byte_equal_trades() {
    let first = run_once(HashMap::new()).await;
    let second = run_once(HashMap::new()).await;
    assert_eq!(first, second);
    assert!(first.contains("GROK_4:m1:0"));
}

#[tokio::test]
async fn fallback_round_trip_no_credential_equals_failing_llm() {
    // No client configured vs. a configured client that always fails:
    // both must take the deterministic fallback branch and produce the
    // exact same trade.
    let without_client = run_once(HashMap::new()).await;

    let mut clients: HashMap<AgentId, Arc<dyn LlmClient>> = HashMap::new();
    clients.insert(AgentId::Grok4, Arc::new(FailingLlmClient));
    let with_failing_client = run_once(clients).await;

    assert_eq!(without_client, with_failing_client);
}

#[tokio::test]
async fn at_most_one_cycle_under_contention() {
    let harness = build_harness(HashMap::new());
    let source = StubMarketSource::new(vec![market_m1()]);
    let scheduler = build_scheduler(source, &harness);
    scheduler.init_portfolios().await.unwrap();

    // Fire a burst of concurrent cycle requests.
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run_cycle().await })
        })
        .collect();

    let mut completed = 0;
    let mut skipped = 0;
    for task in tasks {
        match task.await.unwrap() {
            CycleOutcome::Completed(_) => completed += 1,
            CycleOutcome::Skipped => skipped += 1,
        }
    }

    // The instrumentation counter never observed two cycles inside the
    // shared section at once.
    assert_eq!(scheduler.max_concurrent_cycles(), 1);
    assert!(completed >= 1);
    assert_eq!(completed + skipped, 8);
}
