//! JSON snapshot persistence.
//!
//! Saves the whole in-memory store to a JSON file after each cycle and
//! on shutdown, and restores it at startup so portfolios and trade
//! history survive restarts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::MemoryStore;
use crate::types::{AdaptiveConfig, AgentId, AgentPortfolio, EngineError, Trade};

/// Serializable image of the store's three collections.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub portfolios: Vec<AgentPortfolio>,
    pub trades: Vec<Trade>,
    pub adaptive_configs: Vec<AdaptiveConfig>,
}

impl MemoryStore {
    /// Export the current contents as a snapshot.
    pub async fn export_snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().await;
        let mut trades: Vec<Trade> = inner.trades.values().cloned().collect();
        trades.sort_by(|a, b| a.opened_at.cmp(&b.opened_at));
        StoreSnapshot {
            portfolios: inner.portfolios.values().cloned().collect(),
            trades,
            adaptive_configs: inner.adaptive_configs.values().cloned().collect(),
        }
    }

    /// Replace the store contents from a snapshot.
    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) {
        let mut inner = self.inner.write().await;
        inner.portfolios = snapshot
            .portfolios
            .into_iter()
            .map(|p| (p.agent_id, p))
            .collect::<HashMap<AgentId, AgentPortfolio>>();
        inner.trades = snapshot
            .trades
            .into_iter()
            .map(|t| (t.trade_id.clone(), t))
            .collect();
        inner.adaptive_configs = snapshot
            .adaptive_configs
            .into_iter()
            .map(|c| (c.agent_id, c))
            .collect();
    }
}

/// Save a snapshot to a JSON file.
pub async fn save_snapshot(store: &MemoryStore, path: &str) -> Result<(), EngineError> {
    let snapshot = store.export_snapshot().await;
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| EngineError::Persistence(format!("serialise snapshot: {e}")))?;
    std::fs::write(path, &json)
        .map_err(|e| EngineError::Persistence(format!("write snapshot to {path}: {e}")))?;
    debug!(
        path,
        portfolios = snapshot.portfolios.len(),
        trades = snapshot.trades.len(),
        "Snapshot saved"
    );
    Ok(())
}

/// Restore a snapshot from a JSON file into the store. Returns false
/// when the file doesn't exist (fresh start).
pub async fn restore_snapshot(store: &MemoryStore, path: &str) -> Result<bool, EngineError> {
    if !Path::new(path).exists() {
        info!(path, "No saved snapshot found, starting fresh");
        return Ok(false);
    }

    let json = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Persistence(format!("read snapshot from {path}: {e}")))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&json)
        .map_err(|e| EngineError::Persistence(format!("parse snapshot from {path}: {e}")))?;

    info!(
        path,
        portfolios = snapshot.portfolios.len(),
        trades = snapshot.trades.len(),
        "Snapshot restored from disk"
    );
    store.import_snapshot(snapshot).await;
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use crate::types::{Side, TradeStatus};
    use chrono::{TimeZone, Utc};

    fn temp_path() -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("pantheon_test_snapshot_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn sample_trade() -> Trade {
        Trade {
            trade_id: Trade::make_id(AgentId::Grok4, "m1", t0()),
            agent_id: AgentId::Grok4,
            market_id: "m1".into(),
            category: crate::types::Category::Crypto,
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
            reasoning: vec!["test".into()],
            seed: "GROK_4:m1:0".into(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let path = temp_path();
        let store = MemoryStore::new();
        store
            .save_portfolio(&AgentPortfolio::new(AgentId::Grok4, t0()))
            .await
            .unwrap();
        store.save_trade(&sample_trade()).await.unwrap();
        store
            .save_adaptive_config(&AdaptiveConfig::neutral(AgentId::Grok4, t0()))
            .await
            .unwrap();

        save_snapshot(&store, &path).await.unwrap();

        let restored = MemoryStore::new();
        assert!(restore_snapshot(&restored, &path).await.unwrap());

        let portfolio = restored.get_portfolio(AgentId::Grok4).await.unwrap();
        assert!(portfolio.is_some());
        let trades = restored.load_trades(AgentId::Grok4, None).await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_id, sample_trade().trade_id);
        assert!(restored
            .get_adaptive_config(AgentId::Grok4)
            .await
            .unwrap()
            .is_some());

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_restore_missing_file_is_fresh_start() {
        let store = MemoryStore::new();
        let restored = restore_snapshot(&store, "/tmp/pantheon_no_such_snapshot_77.json")
            .await
            .unwrap();
        assert!(!restored);
    }

    #[tokio::test]
    async fn test_save_to_unwritable_path_is_persistence_error() {
        let store = MemoryStore::new();
        let result = save_snapshot(&store, "/tmp/pantheon_no_such_dir_77/state.json").await;
        assert!(matches!(result, Err(EngineError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_restore_corrupt_file_is_persistence_error() {
        let path = temp_path();
        std::fs::write(&path, "not json at all").unwrap();

        let store = MemoryStore::new();
        let result = restore_snapshot(&store, &path).await;
        assert!(matches!(result, Err(EngineError::Persistence(_))));

        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_import_replaces_contents() {
        let store = MemoryStore::new();
        store.save_trade(&sample_trade()).await.unwrap();

        store.import_snapshot(StoreSnapshot::default()).await;
        let trades = store.load_trades(AgentId::Grok4, None).await.unwrap();
        assert!(trades.is_empty());
    }
}
