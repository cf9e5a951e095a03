//! Agent module - query translation and interaction recording

pub mod llm;
pub mod translator;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::learning::{LearningStore, StoreError};
pub use llm::{ChatClient, ChatMessage, GenerationRequest, TextGenerator};
pub use translator::{QueryTranslator, Translation};

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Answer for one processed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedQuery {
    pub original: String,
    pub parsed: Translation,
}

/// Translates queries and records every attempt in the learning store
pub struct Assistant {
    translator: QueryTranslator,
    store: Arc<RwLock<LearningStore>>,
}

impl Assistant {
    pub fn new(translator: QueryTranslator, store: Arc<RwLock<LearningStore>>) -> Self {
        Self { translator, store }
    }

    pub fn store(&self) -> &Arc<RwLock<LearningStore>> {
        &self.store
    }

    /// Translate a query and record the outcome.
    ///
    /// Translation failures are part of the returned answer; only an empty
    /// query or a failed save is an error.
    pub async fn process_query(&self, query: &str) -> Result<ProcessedQuery, AssistantError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AssistantError::EmptyQuery);
        }

        // The store lock is not held across the network call.
        let parsed = self.translator.translate(query).await;
        let sql = parsed.sql.as_deref();
        let success = sql.is_some();

        {
            let mut store = self.store.write().await;
            store.record_interaction(query, sql, success, None, parsed.error.as_deref())?;
            if let Some(sql) = sql {
                store.record_query_pattern(query, sql, parsed.error.is_none())?;
            }
        }

        info!(
            "Processed query ({}): {}",
            if success { "sql generated" } else { "no sql" },
            query
        );
        Ok(ProcessedQuery {
            original: query.to_string(),
            parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use anyhow::{bail, Result};
    use tempfile::TempDir;

    struct FixedReply(Option<&'static str>);

    #[async_trait::async_trait]
    impl TextGenerator for FixedReply {
        async fn generate(&self, _request: GenerationRequest) -> Result<String> {
            match self.0 {
                Some(reply) => Ok(reply.to_string()),
                None => bail!("service unavailable"),
            }
        }
    }

    fn assistant(dir: &TempDir, reply: Option<&'static str>) -> Assistant {
        let store = LearningStore::open(dir.path().join("learning.json")).unwrap();
        let translator = QueryTranslator::new(Arc::new(FixedReply(reply)), &LlmConfig::default());
        Assistant::new(translator, Arc::new(RwLock::new(store)))
    }

    #[tokio::test]
    async fn test_successful_query_records_interaction_and_pattern() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant(
            &dir,
            Some(r#"{"intent": "list users", "sql": "SELECT * FROM users", "entities": {}}"#),
        );

        let answer = assistant.process_query("  show all users ").await.unwrap();
        assert_eq!(answer.original, "show all users");
        assert_eq!(answer.parsed.sql.as_deref(), Some("SELECT * FROM users"));

        let store = assistant.store().read().await;
        let interactions = store.get_interactions(None);
        assert_eq!(interactions.len(), 1);
        assert!(interactions[0].success);
        assert_eq!(interactions[0].generated_sql.as_deref(), Some("SELECT * FROM users"));
        assert_eq!(store.patterns().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_translation_is_recorded_without_pattern() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant(&dir, None);

        let answer = assistant.process_query("show all users").await.unwrap();
        assert_eq!(answer.parsed.intent, "error");
        assert!(answer.parsed.sql.is_none());

        let store = assistant.store().read().await;
        let record = &store.get_interactions(None)[0];
        assert!(!record.success);
        assert!(record.generated_sql.is_none());
        assert!(record.error.as_deref().unwrap().contains("service unavailable"));
        assert!(store.patterns().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_recording() {
        let dir = TempDir::new().unwrap();
        let assistant = assistant(&dir, Some("{}"));

        let err = assistant.process_query("   ").await.unwrap_err();
        assert!(matches!(err, AssistantError::EmptyQuery));
        assert!(assistant.store().read().await.get_interactions(None).is_empty());
    }
}
