//! Market scoring engine.
//!
//! Pure functions producing a five-component score per `(agent, market)`
//! pair. Components have fixed maxima (30/20/15/25/10) so per-agent
//! weights are comparable across components. News intensity is weighted
//! by article recency and source quality.

use chrono::{DateTime, Utc};

use crate::profiles::AgentProfile;
use crate::types::{
    AdaptiveConfig, Market, NewsArticle, ScoreComponents, ScoredMarket,
};

// ---------------------------------------------------------------------------
// Component maxima and normalization constants
// ---------------------------------------------------------------------------

const VOLUME_MAX: f64 = 30.0;
const VOLUME_NORM_USD: f64 = 100_000.0;
const LIQUIDITY_MAX: f64 = 20.0;
const LIQUIDITY_NORM_USD: f64 = 50_000.0;
const MOVEMENT_MAX: f64 = 15.0;
const NEWS_MAX: f64 = 25.0;
const NEWS_NORM: f64 = 6.0;
const PROB_MAX: f64 = 10.0;

/// Minimum token length for question keywords.
const MIN_KEYWORD_LEN: usize = 4;

/// Common words excluded from keyword extraction.
const STOPWORDS: &[&str] = &[
    "will", "that", "this", "with", "have", "from", "been", "were", "what",
    "when", "where", "which", "would", "could", "should", "there", "their",
    "about", "above", "after", "before", "between", "than", "then", "them",
    "they", "your", "into", "over", "under", "more", "most", "less", "many",
    "much", "some", "such", "only", "other", "same", "does", "doing", "each",
    "until", "while", "during", "against", "happen", "year", "month", "week",
];

// ---------------------------------------------------------------------------
// Source quality tiers
// ---------------------------------------------------------------------------

/// Source quality tier used to weight news contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTier {
    TopTier,
    Major,
    LongTail,
}

const TOP_TIER_SOURCES: &[&str] = &[
    "reuters",
    "bloomberg",
    "associated press",
    "ap news",
    "financial times",
    "wall street journal",
];

const MAJOR_SOURCES: &[&str] = &[
    "bbc",
    "cnn",
    "cnbc",
    "the guardian",
    "new york times",
    "washington post",
    "forbes",
    "axios",
    "politico",
];

/// Classify a publication name into a quality tier. The allowlists are
/// fixed; anything unrecognized is long tail.
pub fn source_tier(source: &str) -> SourceTier {
    let s = source.to_lowercase();
    if TOP_TIER_SOURCES.iter().any(|t| s.contains(t)) {
        SourceTier::TopTier
    } else if MAJOR_SOURCES.iter().any(|t| s.contains(t)) {
        SourceTier::Major
    } else {
        SourceTier::LongTail
    }
}

pub fn source_weight(source: &str) -> f64 {
    match source_tier(source) {
        SourceTier::TopTier => 1.0,
        SourceTier::Major => 0.8,
        SourceTier::LongTail => 0.5,
    }
}

/// Recency weight by article age relative to `now`.
pub fn recency_weight(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age = now - published_at;
    let hours = age.num_minutes() as f64 / 60.0;
    if hours < 1.0 {
        1.0
    } else if hours < 6.0 {
        0.7
    } else if hours < 24.0 {
        0.4
    } else if hours < 72.0 {
        0.25
    } else {
        0.1
    }
}

// ---------------------------------------------------------------------------
// Keyword extraction
// ---------------------------------------------------------------------------

/// Extract lowercase keywords from a market question: alphanumeric
/// tokens of at least four characters, minus the stopword list,
/// deduplicated in order of first appearance.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for token in question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
    {
        if token.len() < MIN_KEYWORD_LEN {
            continue;
        }
        if STOPWORDS.contains(&token) {
            continue;
        }
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
        }
    }
    keywords
}

/// Whether an article mentions any of the keywords in its title or
/// description.
fn article_matches(article: &NewsArticle, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let haystack = format!(
        "{} {}",
        article.title.to_lowercase(),
        article.description.as_deref().unwrap_or("").to_lowercase(),
    );
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

/// Number of distinct keywords an article mentions.
fn match_count(article: &NewsArticle, keywords: &[String]) -> usize {
    let haystack = format!(
        "{} {}",
        article.title.to_lowercase(),
        article.description.as_deref().unwrap_or("").to_lowercase(),
    );
    keywords.iter().filter(|k| haystack.contains(k.as_str())).count()
}

/// The articles most relevant to a market question, best matches first.
/// Used to assemble LLM context.
pub fn relevant_articles<'a>(
    question: &str,
    news: &'a [NewsArticle],
    limit: usize,
) -> Vec<&'a NewsArticle> {
    let keywords = extract_keywords(question);
    let mut matched: Vec<(usize, &NewsArticle)> = news
        .iter()
        .map(|a| (match_count(a, &keywords), a))
        .filter(|(count, _)| *count > 0)
        .collect();
    matched.sort_by(|a, b| b.0.cmp(&a.0));
    matched.into_iter().take(limit).map(|(_, a)| a).collect()
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Raw news intensity: sum of per-article `recency · source` weights
/// over articles matching the question's keywords.
pub fn news_intensity(question: &str, news: &[NewsArticle], now: DateTime<Utc>) -> f64 {
    let keywords = extract_keywords(question);
    news.iter()
        .filter(|a| article_matches(a, &keywords))
        .map(|a| recency_weight(a.published_at, now) * source_weight(&a.source))
        .sum()
}

/// Compute the five bounded components for one market.
pub fn score_components(
    market: &Market,
    news: &[NewsArticle],
    now: DateTime<Utc>,
) -> ScoreComponents {
    let volume = (market.volume_usd / VOLUME_NORM_USD).min(1.0) * VOLUME_MAX;
    let liquidity = (market.liquidity_usd / LIQUIDITY_NORM_USD).min(1.0) * LIQUIDITY_MAX;
    let price_movement = (market.price_change_24h.abs() * 10.0).min(1.0) * MOVEMENT_MAX;
    let news_score =
        (news_intensity(&market.question, news, now) / NEWS_NORM).min(1.0) * NEWS_MAX;
    let probability = (1.0 - 2.0 * (market.current_probability - 0.5).abs()) * PROB_MAX;

    ScoreComponents {
        volume: volume.max(0.0),
        liquidity: liquidity.max(0.0),
        price_movement: price_movement.max(0.0),
        news: news_score.max(0.0),
        probability: probability.max(0.0),
    }
}

/// Score one market for one agent: weighted component average times the
/// adaptive category bias.
pub fn score_market(
    market: &Market,
    news: &[NewsArticle],
    profile: &AgentProfile,
    adaptive: Option<&AdaptiveConfig>,
    now: DateTime<Utc>,
) -> ScoredMarket {
    let components = score_components(market, news, now);
    let w = &profile.weights;

    let raw = components.volume * w.volume
        + components.liquidity * w.liquidity
        + components.price_movement * w.price_movement
        + components.news * w.news
        + components.probability * w.probability;

    let mut score = raw / w.sum();
    if let Some(adaptive) = adaptive {
        score *= adaptive.bias_for(market.category);
    }

    ScoredMarket {
        market: market.clone(),
        score,
        components,
    }
}

// ---------------------------------------------------------------------------
// Candidate filtering
// ---------------------------------------------------------------------------

/// Markets passing the agent's volume/liquidity/status filter. Focus
/// categories are preferred; the filter falls back to all categories
/// when fewer than `2 · max_trades` focused candidates pass.
pub fn filter_candidates(markets: &[Market], profile: &AgentProfile) -> Vec<Market> {
    let base: Vec<&Market> = markets
        .iter()
        .filter(|m| {
            m.is_active()
                && m.volume_usd >= profile.min_volume
                && m.liquidity_usd >= profile.min_liquidity
        })
        .collect();

    if !profile.focus_categories.is_empty() {
        let focused: Vec<&Market> = base
            .iter()
            .copied()
            .filter(|m| profile.focus_categories.contains(&m.category))
            .collect();
        if focused.len() >= 2 * profile.max_trades {
            return focused.into_iter().cloned().collect();
        }
    }

    base.into_iter().cloned().collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
