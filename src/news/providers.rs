//! Concrete news provider adapters.
//!
//! Each adapter owns its API shapes and maps them to the unified
//! `NewsArticle`. Mapping is total: records missing a title or URL are
//! skipped, timestamps fall back to the fetch time when unparseable.
//!
//! Providers: NewsAPI, GNews, TheNewsAPI, Currents, Mediastack, all
//! free-tier REST APIs keyed by a single token.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::NewsFeed;
use crate::types::NewsArticle;

/// Articles requested per provider per refresh.
const PAGE_SIZE: u32 = 50;

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .user_agent("pantheon/0.1.0 (prediction-engine)")
        .build()
        .context("Failed to build news HTTP client")
}

/// Parse the timestamp formats seen across providers, falling back to
/// `now` when nothing matches.
fn parse_timestamp(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw else { return now };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    // Currents style: "2026-02-01 09:30:00 +0000"
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z") {
        return dt.with_timezone(&Utc);
    }
    // Bare datetime, assume UTC
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Utc.from_utc_datetime(&naive);
    }
    now
}

fn make_article(
    provider: &str,
    title: Option<String>,
    description: Option<String>,
    source: Option<String>,
    url: Option<String>,
    published_raw: Option<&str>,
    now: DateTime<Utc>,
) -> Option<NewsArticle> {
    let title = title.filter(|t| !t.trim().is_empty())?;
    let url = url.filter(|u| !u.is_empty())?;
    Some(NewsArticle {
        article_id: format!("{provider}:{url}"),
        title,
        description: description.filter(|d| !d.trim().is_empty()),
        source: source.unwrap_or_else(|| provider.to_string()),
        published_at: parse_timestamp(published_raw, now),
        url,
        source_api: provider.to_string(),
    })
}

// ---------------------------------------------------------------------------
// NewsAPI: https://newsapi.org/v2/top-headlines
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NewsApiResponse {
    #[serde(default)]
    articles: Vec<NewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct NewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source: Option<NewsApiSource>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsApiSource {
    #[serde(default)]
    name: Option<String>,
}

pub struct NewsApiFeed {
    http: Client,
    api_key: String,
}

impl NewsApiFeed {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn map(raw: NewsApiResponse, now: DateTime<Utc>) -> Vec<NewsArticle> {
        raw.articles
            .into_iter()
            .filter_map(|a| {
                make_article(
                    "newsapi",
                    a.title,
                    a.description,
                    a.source.and_then(|s| s.name),
                    a.url,
                    a.published_at.as_deref(),
                    now,
                )
            })
            .collect()
    }
}

#[async_trait]
impl NewsFeed for NewsApiFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let url = format!(
            "https://newsapi.org/v2/top-headlines?language=en&pageSize={PAGE_SIZE}&apiKey={}",
            self.api_key
        );
        let resp = self.http.get(&url).send().await.context("NewsAPI request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("NewsAPI error {}", resp.status());
        }
        let body: NewsApiResponse = resp.json().await.context("Failed to parse NewsAPI response")?;
        Ok(Self::map(body, Utc::now()))
    }

    fn name(&self) -> &str {
        "newsapi"
    }
}

// ---------------------------------------------------------------------------
// GNews: https://gnews.io/api/v4/top-headlines
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GnewsResponse {
    #[serde(default)]
    articles: Vec<GnewsArticle>,
}

#[derive(Debug, Deserialize)]
struct GnewsArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "publishedAt")]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<GnewsSource>,
}

#[derive(Debug, Deserialize)]
struct GnewsSource {
    #[serde(default)]
    name: Option<String>,
}

pub struct GnewsFeed {
    http: Client,
    api_key: String,
}

impl GnewsFeed {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn map(raw: GnewsResponse, now: DateTime<Utc>) -> Vec<NewsArticle> {
        raw.articles
            .into_iter()
            .filter_map(|a| {
                make_article(
                    "gnews",
                    a.title,
                    a.description,
                    a.source.and_then(|s| s.name),
                    a.url,
                    a.published_at.as_deref(),
                    now,
                )
            })
            .collect()
    }
}

#[async_trait]
impl NewsFeed for GnewsFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let url = format!(
            "https://gnews.io/api/v4/top-headlines?lang=en&max={PAGE_SIZE}&token={}",
            self.api_key
        );
        let resp = self.http.get(&url).send().await.context("GNews request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("GNews error {}", resp.status());
        }
        let body: GnewsResponse = resp.json().await.context("Failed to parse GNews response")?;
        Ok(Self::map(body, Utc::now()))
    }

    fn name(&self) -> &str {
        "gnews"
    }
}

// ---------------------------------------------------------------------------
// TheNewsAPI: https://api.thenewsapi.com/v1/news/top
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TheNewsApiResponse {
    #[serde(default)]
    data: Vec<TheNewsApiArticle>,
}

#[derive(Debug, Deserialize)]
struct TheNewsApiArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

pub struct TheNewsApiFeed {
    http: Client,
    api_key: String,
}

impl TheNewsApiFeed {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn map(raw: TheNewsApiResponse, now: DateTime<Utc>) -> Vec<NewsArticle> {
        raw.data
            .into_iter()
            .filter_map(|a| {
                make_article(
                    "thenewsapi",
                    a.title,
                    a.description,
                    a.source,
                    a.url,
                    a.published_at.as_deref(),
                    now,
                )
            })
            .collect()
    }
}

#[async_trait]
impl NewsFeed for TheNewsApiFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let url = format!(
            "https://api.thenewsapi.com/v1/news/top?language=en&limit={PAGE_SIZE}&api_token={}",
            self.api_key
        );
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("TheNewsAPI request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("TheNewsAPI error {}", resp.status());
        }
        let body: TheNewsApiResponse = resp
            .json()
            .await
            .context("Failed to parse TheNewsAPI response")?;
        Ok(Self::map(body, Utc::now()))
    }

    fn name(&self) -> &str {
        "thenewsapi"
    }
}

// ---------------------------------------------------------------------------
// Currents: https://api.currentsapi.services/v1/latest-news
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CurrentsResponse {
    #[serde(default)]
    news: Vec<CurrentsArticle>,
}

#[derive(Debug, Deserialize)]
struct CurrentsArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    published: Option<String>,
}

pub struct CurrentsFeed {
    http: Client,
    api_key: String,
}

impl CurrentsFeed {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn map(raw: CurrentsResponse, now: DateTime<Utc>) -> Vec<NewsArticle> {
        raw.news
            .into_iter()
            .filter_map(|a| {
                make_article(
                    "currents",
                    a.title,
                    a.description,
                    a.author,
                    a.url,
                    a.published.as_deref(),
                    now,
                )
            })
            .collect()
    }
}

#[async_trait]
impl NewsFeed for CurrentsFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let url = format!(
            "https://api.currentsapi.services/v1/latest-news?language=en&apiKey={}",
            self.api_key
        );
        let resp = self.http.get(&url).send().await.context("Currents request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Currents error {}", resp.status());
        }
        let body: CurrentsResponse = resp.json().await.context("Failed to parse Currents response")?;
        Ok(Self::map(body, Utc::now()))
    }

    fn name(&self) -> &str {
        "currents"
    }
}

// ---------------------------------------------------------------------------
// Mediastack: http://api.mediastack.com/v1/news
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MediastackResponse {
    #[serde(default)]
    data: Vec<MediastackArticle>,
}

#[derive(Debug, Deserialize)]
struct MediastackArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
}

pub struct MediastackFeed {
    http: Client,
    api_key: String,
}

impl MediastackFeed {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
        })
    }

    fn map(raw: MediastackResponse, now: DateTime<Utc>) -> Vec<NewsArticle> {
        raw.data
            .into_iter()
            .filter_map(|a| {
                make_article(
                    "mediastack",
                    a.title,
                    a.description,
                    a.source,
                    a.url,
                    a.published_at.as_deref(),
                    now,
                )
            })
            .collect()
    }
}

#[async_trait]
impl NewsFeed for MediastackFeed {
    async fn fetch_latest(&self) -> Result<Vec<NewsArticle>> {
        let url = format!(
            "http://api.mediastack.com/v1/news?languages=en&limit={PAGE_SIZE}&access_key={}",
            self.api_key
        );
        let resp = self.http.get(&url).send().await.context("Mediastack request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Mediastack error {}", resp.status());
        }
        let body: MediastackResponse = resp
            .json()
            .await
            .context("Failed to parse Mediastack response")?;
        Ok(Self::map(body, Utc::now()))
    }

    fn name(&self) -> &str {
        "mediastack"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let dt = parse_timestamp(Some("2026-02-01T09:30:00Z"), t0());
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_currents_format() {
        let dt = parse_timestamp(Some("2026-02-01 09:30:00 +0000"), t0());
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_bare_naive() {
        let dt = parse_timestamp(Some("2026-02-01T09:30:00"), t0());
        assert_eq!(dt, Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_timestamp_garbage_falls_back() {
        assert_eq!(parse_timestamp(Some("yesterday-ish"), t0()), t0());
        assert_eq!(parse_timestamp(None, t0()), t0());
    }

    #[test]
    fn test_make_article_requires_title_and_url() {
        assert!(make_article("p", None, None, None, Some("https://x".into()), None, t0()).is_none());
        assert!(make_article("p", Some("  ".into()), None, None, Some("https://x".into()), None, t0())
            .is_none());
        assert!(make_article("p", Some("t".into()), None, None, None, None, t0()).is_none());
    }

    #[test]
    fn test_make_article_id_format() {
        let a = make_article(
            "newsapi",
            Some("Fed holds".into()),
            None,
            Some("Reuters".into()),
            Some("https://example.com/fed".into()),
            None,
            t0(),
        )
        .unwrap();
        assert_eq!(a.article_id, "newsapi:https://example.com/fed");
        assert_eq!(a.source, "Reuters");
        assert_eq!(a.source_api, "newsapi");
    }

    #[test]
    fn test_newsapi_mapping() {
        let raw: NewsApiResponse = serde_json::from_value(serde_json::json!({
            "status": "ok",
            "articles": [
                {
                    "title": "Bitcoin rallies past $100k",
                    "description": "Crypto markets surge",
                    "source": {"name": "Reuters"},
                    "url": "https://example.com/btc",
                    "publishedAt": "2026-02-01T10:00:00Z"
                },
                {
                    "title": null,
                    "url": "https://example.com/skipped"
                }
            ]
        }))
        .unwrap();

        let articles = NewsApiFeed::map(raw, t0());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Bitcoin rallies past $100k");
        assert_eq!(articles[0].source, "Reuters");
        assert_eq!(
            articles[0].published_at,
            Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_gnews_mapping() {
        let raw: GnewsResponse = serde_json::from_value(serde_json::json!({
            "articles": [{
                "title": "Election polls tighten",
                "description": "A close race",
                "url": "https://example.com/polls",
                "publishedAt": "2026-02-01T08:00:00Z",
                "source": {"name": "AP"}
            }]
        }))
        .unwrap();
        let articles = GnewsFeed::map(raw, t0());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "AP");
        assert_eq!(articles[0].source_api, "gnews");
    }

    #[test]
    fn test_thenewsapi_mapping() {
        let raw: TheNewsApiResponse = serde_json::from_value(serde_json::json!({
            "data": [{
                "title": "Rate cut expected",
                "description": null,
                "url": "https://example.com/rates",
                "source": "bloomberg.com",
                "published_at": "2026-02-01T07:00:00Z"
            }]
        }))
        .unwrap();
        let articles = TheNewsApiFeed::map(raw, t0());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source, "bloomberg.com");
        assert!(articles[0].description.is_none());
    }

    #[test]
    fn test_currents_mapping_timestamp() {
        let raw: CurrentsResponse = serde_json::from_value(serde_json::json!({
            "news": [{
                "title": "Championship upset",
                "description": "Underdogs win",
                "url": "https://example.com/upset",
                "author": "Sports Desk",
                "published": "2026-02-01 06:00:00 +0000"
            }]
        }))
        .unwrap();
        let articles = CurrentsFeed::map(raw, t0());
        assert_eq!(articles.len(), 1);
        assert_eq!(
            articles[0].published_at,
            Utc.with_ymd_and_hms(2026, 2, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_mediastack_mapping() {
        let raw: MediastackResponse = serde_json::from_value(serde_json::json!({
            "data": [{
                "title": "New model released",
                "description": "AI race heats up",
                "url": "https://example.com/ai",
                "source": "techwire",
                "published_at": "2026-02-01T05:00:00+00:00"
            }]
        }))
        .unwrap();
        let articles = MediastackFeed::map(raw, t0());
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].article_id, "mediastack:https://example.com/ai");
    }
}
