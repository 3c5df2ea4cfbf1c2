//! Shared chat-completions wire format.
//!
//! Four of the six providers (x.ai, OpenAI, DeepSeek, DashScope) speak
//! the same Bearer-authenticated chat-completions shape; this module
//! holds the request/response types and the POST helper they share.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f64 = 0.2;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// POST a system+user message pair to a chat-completions endpoint and
/// return the assistant text.
pub async fn chat_completion(
    http: &Client,
    url: &str,
    api_key: &str,
    model: &str,
    system: &str,
    user: &str,
) -> Result<String> {
    let request = ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system,
            },
            ChatMessage {
                role: "user",
                content: user,
            },
        ],
        temperature: DEFAULT_TEMPERATURE,
        max_tokens: DEFAULT_MAX_TOKENS,
    };

    let resp = http
        .post(url)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .context("Chat completion request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Chat completion error {status}: {body}");
    }

    let body: ChatResponse = resp
        .json()
        .await
        .context("Failed to parse chat completion response")?;

    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.is_empty())
        .context("Chat completion returned no content")
}

/// Standard client builder shared by the compat providers.
pub fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("pantheon/0.1.0 (prediction-engine)")
        .build()
        .context("Failed to build LLM HTTP client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parse() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"side\":\"YES\"}"}}]
        }))
        .unwrap();
        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap();
        assert!(text.contains("YES"));
    }

    #[test]
    fn test_response_parse_empty_choices() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(body.choices.is_empty());
    }

    #[test]
    fn test_request_serializes() {
        let request = ChatRequest {
            model: "grok-4",
            messages: vec![ChatMessage {
                role: "user",
                content: "hello",
            }],
            temperature: 0.2,
            max_tokens: 1024,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"grok-4\""));
        assert!(json.contains("\"max_tokens\":1024"));
    }
}
