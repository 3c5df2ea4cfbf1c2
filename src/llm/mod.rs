//! LLM decision layer.
//!
//! Defines the `LlmClient` capability trait with six concrete
//! implementations (one per agent identity), deterministic prompt
//! assembly, tolerant JSON extraction, and the per-`agent:market`
//! decision cache. The public contract is `DecisionEngine::decide`,
//! which never errors: any failure collapses to
//! `DecisionOutcome::Unavailable` and the caller uses the deterministic
//! fallback.

pub mod anthropic;
pub mod deepseek;
pub mod gemini;
pub mod grok;
pub mod openai;
pub mod openai_compat;
pub mod qwen;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::TtlMap;
use crate::config::AppConfig;
use crate::observability::Counters;
use crate::search::SearchResult;
use crate::types::{AgentId, EngineError, NewsArticle, ScoredMarket, Side, TradeDecision};

/// Hard per-call timeout. No retries.
const DECISION_TIMEOUT_SECS: u64 = 30;

/// Reasoning lines kept after validation.
const MAX_REASONING_LINES: usize = 3;

/// Abstraction over one LLM endpoint.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a system+user prompt pair, returning the raw completion text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    fn model_name(&self) -> &str;

    fn provider_name(&self) -> &str;
}

/// The outcome of asking for a decision. Failures are data, not errors:
/// the trade engine pattern-matches and falls back.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Decision(TradeDecision),
    Unavailable(String),
}

impl DecisionOutcome {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DecisionOutcome::Unavailable(_))
    }
}

/// Context handed to the model alongside the market.
#[derive(Debug, Default)]
pub struct DecisionContext<'a> {
    pub articles: Vec<&'a NewsArticle>,
    pub search_results: &'a [SearchResult],
}

// ---------------------------------------------------------------------------
// Client registry
// ---------------------------------------------------------------------------

/// Build the agent → client table from configuration. Agents whose
/// credential env-var is unset get no client and run on the fallback
/// path; this is reported once at startup, not per call.
pub fn build_clients(config: &AppConfig) -> HashMap<AgentId, Arc<dyn LlmClient>> {
    let mut clients: HashMap<AgentId, Arc<dyn LlmClient>> = HashMap::new();

    for agent in AgentId::ALL {
        let llm = config.llm_for(*agent);
        let Some(api_key) = AppConfig::resolve_secret(&llm.api_key_env) else {
            info!(agent = %agent, env = %llm.api_key_env, "No LLM credential, agent runs on deterministic fallback");
            continue;
        };

        let client: Result<Arc<dyn LlmClient>> = match agent {
            AgentId::Grok4 => {
                grok::GrokClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
            AgentId::Gpt5 => {
                openai::OpenAiClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
            AgentId::DeepseekV3 => {
                deepseek::DeepseekClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
            AgentId::Gemini25 => {
                gemini::GeminiClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
            AgentId::Claude45 => {
                anthropic::AnthropicClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
            AgentId::Qwen25 => {
                qwen::QwenClient::new(api_key, llm.model).map(|c| Arc::new(c) as _)
            }
        };

        match client {
            Ok(client) => {
                info!(agent = %agent, model = client.model_name(), provider = client.provider_name(), "LLM client ready");
                clients.insert(*agent, client);
            }
            Err(e) => warn!(agent = %agent, error = %e, "Failed to build LLM client"),
        }
    }

    clients
}

// ---------------------------------------------------------------------------
// Prompt assembly
// ---------------------------------------------------------------------------

const SYSTEM_PROMPT: &str = "You are a trading analyst for binary prediction markets. \
    Given a market and recent context, decide whether to take the YES or NO side \
    and how confident you are. Reply with a single JSON object and nothing else:\n\
    {\"side\": \"YES\" | \"NO\", \"confidence\": 0.0-1.0, \"reasoning\": [\"...\", \"...\"]}\n\
    Keep reasoning to at most three short bullet strings.";

/// Deterministic user prompt for one scored market plus context.
pub fn build_prompt(scored: &ScoredMarket, context: &DecisionContext<'_>) -> String {
    let market = &scored.market;
    let mut prompt = String::with_capacity(1500);

    prompt.push_str(&format!("MARKET: \"{}\"\n", market.question));
    prompt.push_str(&format!("CATEGORY: {}\n", market.category));
    prompt.push_str(&format!(
        "CURRENT PROBABILITY (YES): {:.1}%\n",
        market.current_probability * 100.0
    ));
    prompt.push_str(&format!(
        "24H PRICE CHANGE: {:+.1}%\n",
        market.price_change_24h * 100.0
    ));
    prompt.push_str(&format!("VOLUME: ${:.0}\n", market.volume_usd));
    prompt.push_str(&format!("LIQUIDITY: ${:.0}\n", market.liquidity_usd));
    prompt.push_str(&format!(
        "SIGNAL SCORE: {:.1} (volume {:.1}, liquidity {:.1}, movement {:.1}, news {:.1}, probability {:.1})\n",
        scored.score,
        scored.components.volume,
        scored.components.liquidity,
        scored.components.price_movement,
        scored.components.news,
        scored.components.probability,
    ));

    if !context.articles.is_empty() {
        prompt.push_str("\nRECENT NEWS:\n");
        for article in &context.articles {
            prompt.push_str(&format!("- [{}] {}\n", article.source, article.title));
        }
    }

    if !context.search_results.is_empty() {
        prompt.push_str("\nWEB SEARCH:\n");
        for result in context.search_results {
            prompt.push_str(&format!("- {}: {}\n", result.title, result.snippet));
        }
    }

    prompt.push_str("\nRespond with the JSON object only.\n");
    prompt
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Extract the first balanced `{…}` substring, tracking string literals
/// so braces inside quoted text don't unbalance the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse and validate a raw completion into a `TradeDecision`.
///
/// Coercion rules: side is matched case-insensitively and defaults to
/// NO when absent; confidence is coerced into `[0, 1]` (percentages
/// are scaled down) and defaults to 0.5; reasoning is coerced to a
/// string list truncated to three entries.
pub fn parse_decision(text: &str) -> Result<TradeDecision> {
    let json = extract_json_object(text)
        .ok_or_else(|| anyhow::anyhow!("No JSON object in LLM response"))?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Malformed JSON object: {e}"))?;

    let side = match value.get("side").and_then(|v| v.as_str()) {
        Some(s) if s.eq_ignore_ascii_case("yes") => Side::Yes,
        Some(_) | None => Side::No,
    };

    let confidence = match value.get("confidence") {
        Some(serde_json::Value::Number(n)) => coerce_confidence(n.as_f64().unwrap_or(0.5)),
        Some(serde_json::Value::String(s)) => {
            s.trim().parse::<f64>().map(coerce_confidence).unwrap_or(0.5)
        }
        _ => 0.5,
    };

    let reasoning = match value.get("reasoning") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
            .take(MAX_REASONING_LINES)
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    Ok(TradeDecision {
        side,
        confidence,
        reasoning,
    })
}

fn coerce_confidence(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.5;
    }
    // Tolerate percentage-style answers.
    let value = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw
    };
    value.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Decision engine
// ---------------------------------------------------------------------------

/// Per-agent LLM dispatch with a TTL'd decision cache.
pub struct DecisionEngine {
    clients: HashMap<AgentId, Arc<dyn LlmClient>>,
    cache: TtlMap<TradeDecision>,
    counters: Arc<Counters>,
    timeout: std::time::Duration,
}

impl DecisionEngine {
    pub fn new(
        clients: HashMap<AgentId, Arc<dyn LlmClient>>,
        cache_ttl: Duration,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            clients,
            cache: TtlMap::new(cache_ttl),
            counters,
            timeout: std::time::Duration::from_secs(DECISION_TIMEOUT_SECS),
        }
    }

    /// Override the hard call timeout (tests).
    #[cfg(test)]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_client(&self, agent_id: AgentId) -> bool {
        self.clients.contains_key(&agent_id)
    }

    fn cache_key(agent_id: AgentId, market_id: &str) -> String {
        format!("{}:{}", agent_id.as_str(), market_id)
    }

    /// Ask the agent's model to decide on a market. A cache hit returns
    /// the stored decision with no network I/O. Every failure mode
    /// (missing credential, timeout, transport error, unparseable body)
    /// yields `Unavailable`.
    pub async fn decide(
        &self,
        agent_id: AgentId,
        scored: &ScoredMarket,
        context: &DecisionContext<'_>,
        now: DateTime<Utc>,
    ) -> DecisionOutcome {
        let key = Self::cache_key(agent_id, &scored.market.market_id);

        if let Some(cached) = self.cache.get(&key, now) {
            self.counters
                .decision_cache_hits
                .fetch_add(1, Ordering::Relaxed);
            return DecisionOutcome::Decision(cached);
        }
        self.counters
            .decision_cache_misses
            .fetch_add(1, Ordering::Relaxed);

        let Some(client) = self.clients.get(&agent_id) else {
            return DecisionOutcome::Unavailable(
                EngineError::ConfigurationAbsent(format!("LLM key for {agent_id}")).to_string(),
            );
        };

        let prompt = build_prompt(scored, context);
        debug!(agent = %agent_id, market = %scored.market.market_id, "Requesting LLM decision");

        let completion =
            tokio::time::timeout(self.timeout, client.complete(SYSTEM_PROMPT, &prompt)).await;

        let text = match completion {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                self.counters.llm_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent = %agent_id, market = %scored.market.market_id, error = %e, "LLM call failed");
                return DecisionOutcome::Unavailable(format!("call failed: {e}"));
            }
            Err(_) => {
                self.counters.llm_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent = %agent_id, market = %scored.market.market_id, "LLM call timed out");
                return DecisionOutcome::Unavailable(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        match parse_decision(&text) {
            Ok(decision) => {
                self.cache.put(key, decision.clone(), now);
                DecisionOutcome::Decision(decision)
            }
            Err(e) => {
                self.counters.llm_failures.fetch_add(1, Ordering::Relaxed);
                warn!(agent = %agent_id, market = %scored.market.market_id, error = %e, sample = %text.chars().take(120).collect::<String>(), "Unparseable LLM response");
                DecisionOutcome::Unavailable(format!("unparseable response: {e}"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
