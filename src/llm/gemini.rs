//! Google Gemini client.
//!
//! Uses the `generateContent` API: key in the `x-goog-api-key` header,
//! system prompt as `system_instruction`, content as parts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::openai_compat::http_client;
use super::LlmClient;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    system_instruction: ContentPayload<'a>,
    contents: Vec<ContentPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct ContentPayload<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let request = GenerateRequest {
            system_instruction: ContentPayload {
                parts: vec![Part { text: system }],
            },
            contents: vec![ContentPayload {
                parts: vec![Part { text: user }],
            }],
        };

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("Gemini response contained no text");
        }
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}
