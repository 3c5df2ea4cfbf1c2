//! Optional web-search enrichment.
//!
//! Queries SerpAPI when configured, falling back to Google Custom
//! Search. Absence of credentials yields an empty result list; the
//! caller never fails because search is unavailable. Results are
//! bounded: at most five, snippets truncated to 150 characters.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maximum results returned per query.
const MAX_RESULTS: usize = 5;
/// Maximum snippet length in characters.
const MAX_SNIPPET_CHARS: usize = 150;
/// Hard timeout for a search request.
const SEARCH_TIMEOUT_SECS: u64 = 5;

/// One web-search hit, trimmed for prompt context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub source: String,
}

/// Google CSE credential pair.
#[derive(Debug, Clone)]
pub struct GoogleCseCredentials {
    pub api_key: String,
    pub engine_id: String,
}

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SerpApiResult>,
}

#[derive(Debug, Deserialize)]
struct SerpApiResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleCseResponse {
    #[serde(default)]
    items: Vec<GoogleCseItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleCseItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct WebSearchClient {
    http: Client,
    serpapi_key: Option<String>,
    google_cse: Option<GoogleCseCredentials>,
}

impl WebSearchClient {
    pub fn new(
        serpapi_key: Option<String>,
        google_cse: Option<GoogleCseCredentials>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .user_agent("pantheon/0.1.0 (prediction-engine)")
            .build()
            .context("Failed to build search HTTP client")?;

        Ok(Self {
            http,
            serpapi_key,
            google_cse,
        })
    }

    /// Whether any search backend is configured.
    pub fn is_configured(&self) -> bool {
        self.serpapi_key.is_some() || self.google_cse.is_some()
    }

    /// Search the web for market context. Never fails the caller:
    /// missing credentials or upstream errors yield an empty list.
    pub async fn search_web(&self, query: &str) -> Vec<SearchResult> {
        if let Some(key) = &self.serpapi_key {
            match self.search_serpapi(query, key).await {
                Ok(results) if !results.is_empty() => return results,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "SerpAPI search failed"),
            }
        }

        if let Some(cse) = &self.google_cse {
            match self.search_google_cse(query, cse).await {
                Ok(results) => return results,
                Err(e) => warn!(error = %e, "Google CSE search failed"),
            }
        }

        Vec::new()
    }

    async fn search_serpapi(&self, query: &str, key: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "https://serpapi.com/search.json?engine=google&num={MAX_RESULTS}&q={}&api_key={key}",
            urlencoding::encode(query),
        );
        debug!(query = %query, "SerpAPI search");

        let resp = self.http.get(&url).send().await.context("SerpAPI request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("SerpAPI error {}", resp.status());
        }
        let body: SerpApiResponse = resp.json().await.context("Failed to parse SerpAPI response")?;

        Ok(body
            .organic_results
            .into_iter()
            .filter_map(|r| Self::to_result(r.title, r.snippet, r.link, "serpapi"))
            .take(MAX_RESULTS)
            .collect())
    }

    async fn search_google_cse(
        &self,
        query: &str,
        cse: &GoogleCseCredentials,
    ) -> Result<Vec<SearchResult>> {
        let url = format!(
            "https://www.googleapis.com/customsearch/v1?key={}&cx={}&num={MAX_RESULTS}&q={}",
            cse.api_key,
            cse.engine_id,
            urlencoding::encode(query),
        );
        debug!(query = %query, "Google CSE search");

        let resp = self.http.get(&url).send().await.context("Google CSE request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("Google CSE error {}", resp.status());
        }
        let body: GoogleCseResponse = resp
            .json()
            .await
            .context("Failed to parse Google CSE response")?;

        Ok(body
            .items
            .into_iter()
            .filter_map(|r| Self::to_result(r.title, r.snippet, r.link, "google-cse"))
            .take(MAX_RESULTS)
            .collect())
    }

    fn to_result(
        title: Option<String>,
        snippet: Option<String>,
        link: Option<String>,
        source: &str,
    ) -> Option<SearchResult> {
        let title = title.filter(|t| !t.is_empty())?;
        let url = link.filter(|u| !u.is_empty())?;
        Some(SearchResult {
            title,
            snippet: truncate_snippet(&snippet.unwrap_or_default()),
            url,
            source: source.to_string(),
        })
    }
}

/// Truncate a snippet to the character bound, respecting char
/// boundaries.
fn truncate_snippet(snippet: &str) -> String {
    if snippet.chars().count() <= MAX_SNIPPET_CHARS {
        snippet.to_string()
    } else {
        snippet.chars().take(MAX_SNIPPET_CHARS).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
