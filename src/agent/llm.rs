//! Client for OpenAI-compatible chat completion APIs

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;

/// Something that turns a prompt into text.
///
/// Translation and insight generation both go through this seam so the
/// network client can be swapped out in tests.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

/// One completion request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Configuration for an API provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL for the API (e.g., "https://api.openai.com/v1")
    pub base_url: String,
    pub api_key: String,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

/// HTTP chat completion client
#[derive(Clone)]
pub struct ChatClient {
    client: Arc<Client>,
    provider: ProviderConfig,
}

impl ChatClient {
    /// Create a client with a request timeout
    pub fn new(provider: ProviderConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client: Arc::new(client),
            provider,
        })
    }

    /// Create a client from config, reading the API key from the keyring
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = crate::security::get_api_key()?;
        Self::new(ProviderConfig::new(&config.base_url, api_key), config.timeout())
    }

    /// Send a chat completion request and return the first choice's text
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        let request = ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.provider.base_url))
            .header("Authorization", format!("Bearer {}", self.provider.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM provider")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("LLM API error ({}): {}", status, body);
        }

        let body = response.text().await.context("Failed to read response body")?;
        debug!("LLM response: {} bytes", body.len());

        let raw: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse LLM response: {}", truncate(&body, 500)))?;
        extract_content(&raw).context("LLM response has no message content")
    }
}

#[async_trait::async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        self.complete(
            &request.model,
            &request.messages,
            request.temperature,
            request.max_tokens,
        )
        .await
    }
}

/// Pull `choices[0].message.content`, accepting either a plain string or an
/// array of `{"type": "text", "text": ...}` parts.
fn extract_content(raw: &serde_json::Value) -> Option<String> {
    let content = raw
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))?;

    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.concat())
            }
        }
        _ => None,
    }
}

/// Truncate on a char boundary
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_string_content() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]});
        assert_eq!(extract_content(&raw).as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_extract_content_parts() {
        let raw = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hello "},
            {"type": "image_url", "image_url": {"url": "x"}},
            {"type": "text", "text": "world"}
        ]}}]});
        assert_eq!(extract_content(&raw).as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_extract_missing_content() {
        assert!(extract_content(&json!({"choices": []})).is_none());
        assert!(extract_content(&json!({"error": "nope"})).is_none());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
            temperature: 0.3,
            max_tokens: 1000,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn test_provider_trims_trailing_slash() {
        let provider = ProviderConfig::new("http://localhost:8080/v1/", "key");
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
