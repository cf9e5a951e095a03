//! Natural language to SQL translation

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::llm::{ChatMessage, GenerationRequest, TextGenerator};
use crate::config::LlmConfig;
use crate::learning::INVALID_JSON_ERROR;

/// Intent reported when translation did not yield a usable answer
pub const ERROR_INTENT: &str = "error";

const SYSTEM_PROMPT: &str = "You are a SQL expert that converts natural language questions into SQL.\n\
Respond with a single JSON object and nothing else, using exactly these keys:\n\
  \"intent\": a short description of what the user wants,\n\
  \"sql\": the SQL statement, or null if no statement can be written,\n\
  \"entities\": an object listing the tables, columns and values referenced.\n\
Do not wrap the JSON in markdown.";

/// Structured result of one translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub intent: String,
    pub sql: Option<String>,
    #[serde(default)]
    pub entities: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Translation {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            intent: ERROR_INTENT.to_string(),
            sql: None,
            entities: Value::Object(Default::default()),
            error: Some(error.into()),
        }
    }
}

/// Reply shape requested from the model; every key is optional so partial
/// answers still parse.
#[derive(Debug, Deserialize)]
struct RawTranslation {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    sql: Option<String>,
    #[serde(default)]
    entities: Option<Value>,
}

pub struct QueryTranslator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl QueryTranslator {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &LlmConfig) -> Self {
        Self {
            generator,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    pub fn build_messages(&self, query: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Query: {}", query)),
        ]
    }

    /// Translate a query. Failures are folded into the result, never raised.
    pub async fn translate(&self, query: &str) -> Translation {
        let request = GenerationRequest {
            model: self.model.clone(),
            messages: self.build_messages(query),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match self.generator.generate(request).await {
            Ok(reply) => parse_reply(&reply),
            Err(e) => {
                warn!("Translation request failed: {:#}", e);
                Translation::failed(format!("{:#}", e))
            }
        }
    }
}

/// Parse the model's reply into a translation
pub fn parse_reply(reply: &str) -> Translation {
    let body = strip_code_fences(reply);
    match serde_json::from_str::<RawTranslation>(body) {
        Ok(raw) => Translation {
            intent: raw.intent.unwrap_or_default(),
            sql: raw.sql.filter(|s| !s.trim().is_empty()),
            entities: raw.entities.unwrap_or_else(|| Value::Object(Default::default())),
            error: None,
        },
        Err(e) => {
            debug!("Unparseable translation reply: {}", e);
            Translation::failed(INVALID_JSON_ERROR)
        }
    }
}

/// Remove a surrounding markdown fence, if any
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let inner = if let Some(s) = trimmed.strip_prefix("```json") {
        s
    } else if let Some(s) = trimmed.strip_prefix("```") {
        s
    } else {
        trimmed
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
