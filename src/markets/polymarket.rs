//! Polymarket gamma-API market source.
//!
//! Pulls binary markets from the gamma REST API, normalizes them into
//! the internal `Market` shape, and drops records missing required
//! fields. Dropped records are counted, not raised.
//!
//! Base URL: `https://gamma-api.polymarket.com`
//! Auth: key/secret/passphrase header triple; reads work unauthenticated.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use super::MarketSource;
use crate::observability::Counters;
use crate::types::{Category, EngineError, Market, MarketStatus};

const SOURCE_NAME: &str = "polymarket";

/// Credentials triple for authenticated endpoints.
#[derive(Debug, Clone, Default)]
pub struct MarketCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub api_passphrase: Option<String>,
}

// ---------------------------------------------------------------------------
// API response types (gamma JSON → Rust)
// ---------------------------------------------------------------------------

/// Raw gamma market record. Only the fields we need are deserialized;
/// everything is optional so a malformed record degrades to a rejected
/// normalization instead of a parse failure for the whole page.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawGammaMarket {
    id: Option<String>,
    question: Option<String>,
    category: Option<String>,
    /// Lifetime volume in USD.
    volume_num: Option<f64>,
    /// Pool liquidity in USD.
    liquidity_num: Option<f64>,
    /// Current YES price (0.0–1.0).
    last_trade_price: Option<f64>,
    /// 24-hour price delta.
    one_day_price_change: Option<f64>,
    active: Option<bool>,
    closed: Option<bool>,
    archived: Option<bool>,
    /// "Yes" / "No" once resolved, absent otherwise.
    outcome: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketClient {
    http: Client,
    base_url: String,
    credentials: MarketCredentials,
    max_pages: u32,
    page_size: u32,
    counters: Arc<Counters>,
}

impl PolymarketClient {
    pub fn new(
        base_url: String,
        credentials: MarketCredentials,
        max_pages: u32,
        page_size: u32,
        counters: Arc<Counters>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("pantheon/0.1.0 (prediction-engine)")
            .build()
            .context("Failed to build HTTP client for market source")?;

        Ok(Self {
            http,
            base_url,
            credentials,
            max_pages,
            page_size: page_size.min(1000),
            counters,
        })
    }

    /// Fetch one page of raw market records.
    async fn fetch_page(&self, offset: u32) -> Result<Vec<RawGammaMarket>> {
        let url = format!(
            "{}/markets?closed=false&limit={}&offset={}",
            self.base_url, self.page_size, offset,
        );
        debug!(url = %url, "Fetching market page");

        let mut request = self.http.get(&url);
        if let (Some(key), Some(secret)) =
            (&self.credentials.api_key, &self.credentials.api_secret)
        {
            request = request
                .header("POLY-API-KEY", key)
                .header("POLY-API-SECRET", secret);
            if let Some(passphrase) = &self.credentials.api_passphrase {
                request = request.header("POLY-API-PASSPHRASE", passphrase);
            }
        }

        let resp = request.send().await.map_err(|e| EngineError::UpstreamTransient {
            source_name: SOURCE_NAME.to_string(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            // 5xx and friends are transient; anything else is the
            // upstream speaking a different protocol than expected.
            let err = if status.is_server_error() {
                EngineError::UpstreamTransient {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("{status}: {body}"),
                }
            } else {
                EngineError::UpstreamProtocol {
                    source_name: SOURCE_NAME.to_string(),
                    message: format!("{status}: {body}"),
                }
            };
            return Err(err.into());
        }

        let page = resp
            .json::<Vec<RawGammaMarket>>()
            .await
            .map_err(|e| EngineError::UpstreamProtocol {
                source_name: SOURCE_NAME.to_string(),
                message: format!("malformed page body: {e}"),
            })?;
        Ok(page)
    }

    /// Normalize one raw record. Returns `None` when a required field
    /// (`id`, `question`, volume, price) is absent or non-finite.
    fn normalize(raw: RawGammaMarket) -> Option<Market> {
        let market_id = raw.id.filter(|s| !s.is_empty())?;
        let question = raw.question.filter(|s| !s.is_empty())?;
        let volume_usd = raw.volume_num.filter(|v| v.is_finite())?;
        let current_probability = raw.last_trade_price.filter(|p| p.is_finite())?;

        let status = match (
            raw.archived.unwrap_or(false),
            raw.closed.unwrap_or(false),
            raw.active.unwrap_or(true),
        ) {
            (true, _, _) => MarketStatus::Invalid,
            (_, true, _) => MarketStatus::Resolved,
            (_, _, false) => MarketStatus::Frozen,
            _ => MarketStatus::Active,
        };

        let resolved_outcome = raw.outcome.as_deref().and_then(|o| {
            if o.eq_ignore_ascii_case("yes") {
                Some(true)
            } else if o.eq_ignore_ascii_case("no") {
                Some(false)
            } else {
                None
            }
        });

        Some(Market {
            market_id,
            question,
            category: raw
                .category
                .as_deref()
                .map(Category::from_raw)
                .unwrap_or(Category::Other),
            volume_usd: volume_usd.max(0.0),
            liquidity_usd: raw
                .liquidity_num
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
                .max(0.0),
            current_probability: current_probability.clamp(0.0, 1.0),
            price_change_24h: raw
                .one_day_price_change
                .filter(|v| v.is_finite())
                .unwrap_or(0.0)
                .clamp(-1.0, 1.0),
            status,
            resolved_outcome,
        })
    }
}

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn fetch_markets(&self) -> Result<Vec<Market>> {
        let mut markets = Vec::new();
        let mut rejected = 0u64;

        for page in 0..self.max_pages {
            let batch = self.fetch_page(page * self.page_size).await?;
            let batch_len = batch.len();

            for raw in batch {
                match Self::normalize(raw) {
                    Some(market) => markets.push(market),
                    None => rejected += 1,
                }
            }

            // Short page means we've reached the end.
            if (batch_len as u32) < self.page_size {
                break;
            }
        }

        if rejected > 0 {
            self.counters
                .rejected_market_records
                .fetch_add(rejected, Ordering::Relaxed);
        }

        info!(
            total = markets.len(),
            rejected,
            "Market scan complete"
        );

        Ok(markets)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_complete() -> RawGammaMarket {
        RawGammaMarket {
            id: Some("0xabc".to_string()),
            question: Some("Will BTC close above $150k this year?".to_string()),
            category: Some("Crypto".to_string()),
            volume_num: Some(120_000.0),
            liquidity_num: Some(30_000.0),
            last_trade_price: Some(0.55),
            one_day_price_change: Some(0.04),
            active: Some(true),
            closed: Some(false),
            archived: Some(false),
            outcome: None,
        }
    }

    #[test]
    fn test_normalize_complete_record() {
        let market = PolymarketClient::normalize(raw_complete()).unwrap();
        assert_eq!(market.market_id, "0xabc");
        assert_eq!(market.category, Category::Crypto);
        assert_eq!(market.status, MarketStatus::Active);
        assert!((market.volume_usd - 120_000.0).abs() < 1e-10);
        assert!((market.current_probability - 0.55).abs() < 1e-10);
        assert!(market.resolved_outcome.is_none());
    }

    #[test]
    fn test_normalize_drops_missing_id() {
        let mut raw = raw_complete();
        raw.id = None;
        assert!(PolymarketClient::normalize(raw).is_none());
        let mut raw = raw_complete();
        raw.id = Some(String::new());
        assert!(PolymarketClient::normalize(raw).is_none());
    }

    #[test]
    fn test_normalize_drops_missing_question() {
        let mut raw = raw_complete();
        raw.question = None;
        assert!(PolymarketClient::normalize(raw).is_none());
    }

    #[test]
    fn test_normalize_drops_missing_volume_or_price() {
        let mut raw = raw_complete();
        raw.volume_num = None;
        assert!(PolymarketClient::normalize(raw).is_none());

        let mut raw = raw_complete();
        raw.last_trade_price = None;
        assert!(PolymarketClient::normalize(raw).is_none());
    }

    #[test]
    fn test_normalize_drops_non_numeric() {
        let mut raw = raw_complete();
        raw.volume_num = Some(f64::NAN);
        assert!(PolymarketClient::normalize(raw).is_none());

        let mut raw = raw_complete();
        raw.last_trade_price = Some(f64::INFINITY);
        assert!(PolymarketClient::normalize(raw).is_none());
    }

    #[test]
    fn test_normalize_clamps_probability() {
        let mut raw = raw_complete();
        raw.last_trade_price = Some(1.5);
        let market = PolymarketClient::normalize(raw).unwrap();
        assert!((market.current_probability - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_normalize_missing_optionals_default() {
        let mut raw = raw_complete();
        raw.liquidity_num = None;
        raw.one_day_price_change = None;
        raw.category = None;
        let market = PolymarketClient::normalize(raw).unwrap();
        assert_eq!(market.liquidity_usd, 0.0);
        assert_eq!(market.price_change_24h, 0.0);
        assert_eq!(market.category, Category::Other);
    }

    #[test]
    fn test_normalize_status_mapping() {
        let mut raw = raw_complete();
        raw.closed = Some(true);
        raw.outcome = Some("Yes".to_string());
        let market = PolymarketClient::normalize(raw).unwrap();
        assert_eq!(market.status, MarketStatus::Resolved);
        assert_eq!(market.resolved_outcome, Some(true));

        let mut raw = raw_complete();
        raw.archived = Some(true);
        assert_eq!(
            PolymarketClient::normalize(raw).unwrap().status,
            MarketStatus::Invalid
        );

        let mut raw = raw_complete();
        raw.active = Some(false);
        assert_eq!(
            PolymarketClient::normalize(raw).unwrap().status,
            MarketStatus::Frozen
        );
    }

    #[test]
    fn test_normalize_unmapped_category_falls_to_other() {
        let mut raw = raw_complete();
        raw.category = Some("Celebrity Gossip".to_string());
        assert_eq!(
            PolymarketClient::normalize(raw).unwrap().category,
            Category::Other
        );
    }

    #[test]
    fn test_client_construction_caps_page_size() {
        let client = PolymarketClient::new(
            "https://gamma-api.example.com".to_string(),
            MarketCredentials::default(),
            5,
            5000,
            Arc::new(Counters::new()),
        )
        .unwrap();
        assert_eq!(client.page_size, 1000);
        assert_eq!(client.name(), "polymarket");
    }
}
