//! News aggregation.
//!
//! Fans out to every configured provider concurrently, normalizes the
//! results into `NewsArticle`, deduplicates by normalized title, and
//! caches the merged list for five minutes. A provider failure is
//! isolated: the other providers' articles still contribute.

pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::TtlCell;
use crate::observability::Counters;
use crate::types::NewsArticle;

/// Per-provider request timeout.
const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Abstraction over one news provider.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Fetch the provider's latest headlines, already normalized.
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>>;

    /// Provider name for logging and article ids.
    fn name(&self) -> &str;
}

/// Aggregating front over all configured providers.
pub struct NewsAggregator {
    providers: Vec<Arc<dyn NewsFeed>>,
    cache: TtlCell<Vec<NewsArticle>>,
    counters: Arc<Counters>,
}

impl NewsAggregator {
    pub fn new(
        providers: Vec<Arc<dyn NewsFeed>>,
        ttl: Duration,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            providers,
            cache: TtlCell::new(ttl),
            counters,
        }
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// The current news snapshot, freshly merged or cached.
    ///
    /// Every provider is queried concurrently with a hard per-request
    /// timeout. If all providers fail the stale snapshot (or an empty
    /// list) is returned and the cache is left untouched.
    pub async fn fetch_latest_news(&self, now: DateTime<Utc>) -> Arc<Vec<NewsArticle>> {
        if let Some(fresh) = self.cache.get_fresh(now) {
            self.counters.news_cache_hits.fetch_add(1, Ordering::Relaxed);
            return fresh;
        }
        self.counters
            .news_cache_misses
            .fetch_add(1, Ordering::Relaxed);

        if self.providers.is_empty() {
            return Arc::new(Vec::new());
        }

        let fetches = self.providers.iter().map(|provider| {
            let provider = Arc::clone(provider);
            async move {
                let result = tokio::time::timeout(
                    std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS),
                    provider.fetch_latest(),
                )
                .await;
                match result {
                    Ok(Ok(articles)) => Ok((provider.name().to_string(), articles)),
                    Ok(Err(e)) => Err((provider.name().to_string(), e.to_string())),
                    Err(_) => Err((
                        provider.name().to_string(),
                        format!("timed out after {PROVIDER_TIMEOUT_SECS}s"),
                    )),
                }
            }
        });

        let mut merged = Vec::new();
        let mut any_success = false;

        for outcome in join_all(fetches).await {
            match outcome {
                Ok((name, articles)) => {
                    debug!(provider = %name, count = articles.len(), "News provider fetched");
                    merged.extend(articles);
                    any_success = true;
                }
                Err((name, error)) => {
                    warn!(provider = %name, error = %error, "News provider failed, continuing");
                    self.counters
                        .news_provider_failures
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if !any_success {
            return self
                .cache
                .get_stale(now)
                .unwrap_or_else(|| Arc::new(Vec::new()));
        }

        let deduped = dedup_by_title(merged);
        self.cache.put(deduped, now)
    }
}

/// Drop articles whose lowercase-trimmed title was already seen.
/// The first occurrence wins, preserving provider order.
fn dedup_by_title(articles: Vec<NewsArticle>) -> Vec<NewsArticle> {
    let mut seen = HashSet::new();
    articles
        .into_iter()
        .filter(|a| seen.insert(a.dedup_key()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicBool;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    fn article(provider: &str, title: &str) -> NewsArticle {
        NewsArticle {
            article_id: format!("{provider}:https://example.com/{title}"),
            title: title.to_string(),
            description: None,
            source: "Example Wire".to_string(),
            published_at: t0(),
            url: format!("https://example.com/{title}"),
            source_api: provider.to_string(),
        }
    }

    struct StubFeed {
        name: String,
        titles: Vec<String>,
        fail: AtomicBool,
    }

    impl StubFeed {
        fn new(name: &str, titles: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                titles: titles.iter().map(|t| t.to_string()).collect(),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl NewsFeed for StubFeed {
        async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
            if self.fail.load(Ordering::Relaxed) {
                anyhow::bail!("provider down");
            }
            Ok(self.titles.iter().map(|t| article(&self.name, t)).collect())
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn test_dedup_first_occurrence_wins() {
        let articles = vec![
            article("a", "Fed holds rates steady"),
            article("b", "FED HOLDS RATES STEADY"),
            article("b", "  fed holds rates steady  "),
            article("b", "Something else entirely"),
        ];
        let deduped = dedup_by_title(articles);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].source_api, "a");
    }

    #[tokio::test]
    async fn test_aggregator_merges_providers() {
        let agg = NewsAggregator::new(
            vec![
                StubFeed::new("alpha", &["headline one", "headline two"]),
                StubFeed::new("beta", &["headline three"]),
            ],
            Duration::minutes(5),
            Arc::new(Counters::new()),
        );
        let news = agg.fetch_latest_news(t0()).await;
        assert_eq!(news.len(), 3);
    }

    #[tokio::test]
    async fn test_aggregator_cross_provider_dedup() {
        let agg = NewsAggregator::new(
            vec![
                StubFeed::new("alpha", &["Shared Headline"]),
                StubFeed::new("beta", &["shared headline", "unique"]),
            ],
            Duration::minutes(5),
            Arc::new(Counters::new()),
        );
        let news = agg.fetch_latest_news(t0()).await;
        assert_eq!(news.len(), 2);
        // no two normalized titles collide
        let mut keys = HashSet::new();
        for a in news.iter() {
            assert!(keys.insert(a.dedup_key()));
        }
    }

    #[tokio::test]
    async fn test_aggregator_provider_failure_isolated() {
        let bad = StubFeed::new("bad", &["never seen"]);
        bad.fail.store(true, Ordering::Relaxed);
        let counters = Arc::new(Counters::new());
        let agg = NewsAggregator::new(
            vec![bad, StubFeed::new("good", &["survives"])],
            Duration::minutes(5),
            counters.clone(),
        );

        let news = agg.fetch_latest_news(t0()).await;
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "survives");
        assert_eq!(counters.news_provider_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_aggregator_all_failed_serves_stale() {
        let alpha = StubFeed::new("alpha", &["cached headline"]);
        let agg = NewsAggregator::new(
            vec![alpha.clone()],
            Duration::minutes(5),
            Arc::new(Counters::new()),
        );

        let first = agg.fetch_latest_news(t0()).await;
        assert_eq!(first.len(), 1);

        alpha.fail.store(true, Ordering::Relaxed);
        let stale = agg.fetch_latest_news(t0() + Duration::minutes(10)).await;
        assert_eq!(stale.len(), 1);
        assert!(Arc::ptr_eq(&first, &stale));
    }

    #[tokio::test]
    async fn test_aggregator_all_failed_no_cache_empty() {
        let alpha = StubFeed::new("alpha", &["x"]);
        alpha.fail.store(true, Ordering::Relaxed);
        let agg = NewsAggregator::new(vec![alpha], Duration::minutes(5), Arc::new(Counters::new()));
        let news = agg.fetch_latest_news(t0()).await;
        assert!(news.is_empty());
    }

    #[tokio::test]
    async fn test_aggregator_fresh_window_identity() {
        let agg = NewsAggregator::new(
            vec![StubFeed::new("alpha", &["one"])],
            Duration::minutes(5),
            Arc::new(Counters::new()),
        );
        let a = agg.fetch_latest_news(t0()).await;
        let b = agg.fetch_latest_news(t0() + Duration::minutes(4)).await;
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_aggregator_no_providers() {
        let agg = NewsAggregator::new(Vec::new(), Duration::minutes(5), Arc::new(Counters::new()));
        let news = agg.fetch_latest_news(t0()).await;
        assert!(news.is_empty());
    }
}
