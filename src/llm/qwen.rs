//! Qwen client (DashScope OpenAI-compatible mode).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use super::openai_compat::{chat_completion, http_client};
use super::LlmClient;

const API_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";

pub struct QwenClient {
    http: Client,
    api_key: String,
    model: String,
}

impl QwenClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for QwenClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        chat_completion(&self.http, API_URL, &self.api_key, &self.model, system, user).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "dashscope"
    }
}
