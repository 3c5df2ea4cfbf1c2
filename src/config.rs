//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. A missing config file falls
//! back to built-in defaults so the engine can run from environment
//! variables alone. `PREDICTION_ENGINE_*` variables override the file.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::profiles::ProfileOverride;
use crate::types::{AgentId, EngineError};

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub markets: MarketsConfig,
    pub news: NewsConfig,
    pub llm: HashMap<String, LlmProviderConfig>,
    pub search: SearchConfig,
    pub lifecycle: LifecycleConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
    /// Per-agent profile overrides, keyed by internal agent id.
    pub agents: HashMap<String, ProfileOverride>,
}

/// Run mode. Simulation serves deterministic in-process fixtures so the
/// full pipeline runs without upstream credentials.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    #[default]
    Live,
    Simulation,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: EngineMode,
    pub debug: bool,
    /// Trading cycle cadence.
    pub interval_ms: u64,
    /// Adaptive tuner cadence.
    pub tuner_interval_hours: u64,
    /// State snapshot file; empty disables snapshots.
    pub state_file: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: EngineMode::Live,
            debug: false,
            interval_ms: 60_000,
            tuner_interval_hours: 24,
            state_file: "pantheon_state.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketsConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub api_passphrase_env: String,
    /// Pages fetched per refresh.
    pub max_pages: u32,
    /// Records per page (upstream maximum is 1000).
    pub page_size: u32,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gamma-api.polymarket.com".to_string(),
            api_key_env: "MARKET_API_KEY".to_string(),
            api_secret_env: "MARKET_API_SECRET".to_string(),
            api_passphrase_env: "MARKET_API_PASSPHRASE".to_string(),
            max_pages: 5,
            page_size: 1000,
        }
    }
}

/// News provider credentials, one env-var name per provider. A provider
/// is enabled iff its variable is set and non-empty.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NewsConfig {
    pub newsapi_key_env: String,
    pub gnews_key_env: String,
    pub thenewsapi_key_env: String,
    pub currents_key_env: String,
    pub mediastack_key_env: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            newsapi_key_env: "NEWSAPI_KEY".to_string(),
            gnews_key_env: "GNEWS_API_KEY".to_string(),
            thenewsapi_key_env: "THENEWSAPI_KEY".to_string(),
            currents_key_env: "CURRENTS_API_KEY".to_string(),
            mediastack_key_env: "MEDIASTACK_KEY".to_string(),
        }
    }
}

/// One agent's LLM endpoint configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmProviderConfig {
    pub api_key_env: String,
    pub model: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub serpapi_key_env: String,
    pub google_cse_key_env: String,
    pub google_cse_engine_env: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serpapi_key_env: "SERPAPI_KEY".to_string(),
            google_cse_key_env: "GOOGLE_CSE_KEY".to_string(),
            google_cse_engine_env: "GOOGLE_CSE_ENGINE_ID".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Close FROZEN markets at zero PnL instead of holding.
    pub flat_close_frozen: bool,
    /// Minimum opposite-side confidence to flip an open position.
    pub flip_confidence_threshold: f64,
    /// Position age limit.
    pub timeout_hours: i64,
    /// Drawdown cooldown duration.
    pub cooldown_hours: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            flat_close_frozen: false,
            flip_confidence_threshold: 0.60,
            timeout_hours: 72,
            cooldown_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub market_ttl_secs: i64,
    pub news_ttl_secs: i64,
    /// 5 minutes by default; raise to 10 to save credits.
    pub decision_ttl_secs: i64,
    pub trade_set_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            market_ttl_secs: 60,
            news_ttl_secs: 300,
            decision_ttl_secs: 300,
            trade_set_ttl_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist, then apply environment overrides.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let mut config = if Path::new(path).exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| EngineError::Config(format!("read {path}: {e}")))?;
            toml::from_str(&contents)
                .map_err(|e| EngineError::Config(format!("parse {path}: {e}")))?
        } else {
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject agent-keyed sections that name no known agent; a typo'd
    /// override would otherwise be silently ignored.
    fn validate(&self) -> Result<(), EngineError> {
        for key in self.agents.keys().chain(self.llm.keys()) {
            if AgentId::from_key(key).is_none() {
                return Err(EngineError::Config(format!("unknown agent id: {key}")));
            }
        }
        Ok(())
    }

    /// Apply `PREDICTION_ENGINE_*` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(mode) = std::env::var("PREDICTION_ENGINE_MODE") {
            match mode.to_lowercase().as_str() {
                "simulation" => self.engine.mode = EngineMode::Simulation,
                "live" => self.engine.mode = EngineMode::Live,
                _ => {}
            }
        }
        if let Ok(debug) = std::env::var("PREDICTION_ENGINE_DEBUG") {
            self.engine.debug = debug.eq_ignore_ascii_case("true");
        }
        if let Ok(interval) = std::env::var("PREDICTION_ENGINE_INTERVAL_MS") {
            if let Ok(ms) = interval.parse::<u64>() {
                self.engine.interval_ms = ms;
            }
        }
    }

    /// The LLM endpoint configuration for one agent, merged over the
    /// built-in defaults.
    pub fn llm_for(&self, agent_id: AgentId) -> LlmProviderConfig {
        self.llm
            .get(agent_id.as_str())
            .cloned()
            .unwrap_or_else(|| default_llm_config(agent_id))
    }

    /// Resolve an env-var name to its value, treating empty as unset.
    pub fn resolve_secret(env_name: &str) -> Option<String> {
        std::env::var(env_name).ok().filter(|v| !v.is_empty())
    }
}

/// Built-in endpoint defaults per agent identity.
fn default_llm_config(agent_id: AgentId) -> LlmProviderConfig {
    let (api_key_env, model) = match agent_id {
        AgentId::Grok4 => ("XAI_API_KEY", "grok-4"),
        AgentId::Gpt5 => ("OPENAI_API_KEY", "gpt-5"),
        AgentId::DeepseekV3 => ("DEEPSEEK_API_KEY", "deepseek-chat"),
        AgentId::Gemini25 => ("GEMINI_API_KEY", "gemini-2.5-flash"),
        AgentId::Claude45 => ("ANTHROPIC_API_KEY", "claude-sonnet-4-5"),
        AgentId::Qwen25 => ("DASHSCOPE_API_KEY", "qwen2.5-72b-instruct"),
    };
    LlmProviderConfig {
        api_key_env: api_key_env.to_string(),
        model: model.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.mode, EngineMode::Live);
        assert_eq!(cfg.engine.interval_ms, 60_000);
        assert_eq!(cfg.markets.max_pages, 5);
        assert_eq!(cfg.markets.page_size, 1000);
        assert_eq!(cfg.cache.market_ttl_secs, 60);
        assert_eq!(cfg.cache.news_ttl_secs, 300);
        assert_eq!(cfg.cache.trade_set_ttl_secs, 30);
        assert_eq!(cfg.lifecycle.flip_confidence_threshold, 0.60);
        assert_eq!(cfg.lifecycle.timeout_hours, 72);
        assert!(cfg.api.enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_src = r#"
            [engine]
            mode = "simulation"
            interval_ms = 5000

            [lifecycle]
            flat_close_frozen = true

            [agents.GROK_4]
            enabled = false
            max_trades = 2
        "#;
        let cfg: AppConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.engine.mode, EngineMode::Simulation);
        assert_eq!(cfg.engine.interval_ms, 5000);
        assert!(cfg.lifecycle.flat_close_frozen);
        // Unspecified sections take defaults
        assert_eq!(cfg.markets.max_pages, 5);

        let ov = cfg.agents.get("GROK_4").unwrap();
        assert_eq!(ov.enabled, Some(false));
        assert_eq!(ov.max_trades, Some(2));
        assert_eq!(ov.min_volume, None);
    }

    #[test]
    fn test_llm_for_defaults() {
        let cfg = AppConfig::default();
        let grok = cfg.llm_for(AgentId::Grok4);
        assert_eq!(grok.api_key_env, "XAI_API_KEY");
        assert_eq!(grok.model, "grok-4");
        let claude = cfg.llm_for(AgentId::Claude45);
        assert_eq!(claude.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_llm_for_override() {
        let toml_src = r#"
            [llm.GPT_5]
            api_key_env = "MY_OPENAI_KEY"
            model = "gpt-5-mini"
        "#;
        let cfg: AppConfig = toml::from_str(toml_src).unwrap();
        let gpt = cfg.llm_for(AgentId::Gpt5);
        assert_eq!(gpt.api_key_env, "MY_OPENAI_KEY");
        assert_eq!(gpt.model, "gpt-5-mini");
        // Other agents still fall back to defaults
        assert_eq!(cfg.llm_for(AgentId::Qwen25).api_key_env, "DASHSCOPE_API_KEY");
    }

    #[test]
    fn test_resolve_secret_empty_is_none() {
        std::env::set_var("PANTHEON_TEST_EMPTY_SECRET", "");
        assert_eq!(AppConfig::resolve_secret("PANTHEON_TEST_EMPTY_SECRET"), None);
        std::env::set_var("PANTHEON_TEST_SECRET", "k-123");
        assert_eq!(
            AppConfig::resolve_secret("PANTHEON_TEST_SECRET"),
            Some("k-123".to_string())
        );
        assert_eq!(AppConfig::resolve_secret("PANTHEON_TEST_MISSING"), None);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = AppConfig::load("/tmp/pantheon_no_such_config_492.toml").unwrap();
        assert_eq!(cfg.markets.max_pages, 5);
    }

    #[test]
    fn test_validate_rejects_unknown_agent_key() {
        let cfg: AppConfig = toml::from_str("[agents.NOT_AN_AGENT]\nenabled = false").unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));

        let cfg: AppConfig = toml::from_str(
            "[llm.HAL_9000]\napi_key_env = \"HAL_KEY\"\nmodel = \"hal\"",
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_validate_accepts_known_agent_keys() {
        let cfg: AppConfig = toml::from_str(
            "[agents.GROK_4]\nenabled = false\n\n[llm.GPT_5]\napi_key_env = \"K\"\nmodel = \"m\"",
        )
        .unwrap();
        assert!(cfg.validate().is_ok());
    }
}
