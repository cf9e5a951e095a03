//! AI insight reports over feedback analysis
//!
//! Sends the analyzer's summary to the text-generation service and returns
//! its free-text recommendations. Nothing here is stateful and nothing here
//! raises: a failed or timed-out request becomes an error string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::analysis::{AnalysisReport, FeedbackAnalyzer};
use crate::agent::llm::{ChatMessage, GenerationRequest, TextGenerator};
use crate::config::Config;

/// Prefix of every insight failure message
pub const INSIGHT_ERROR_PREFIX: &str = "Error generating AI insights: ";

/// Exported analysis document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub analysis: AnalysisReport,
    pub suggestions: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_insights: Option<String>,
}

impl FeedbackReport {
    /// Report without AI insights
    pub fn new(analysis: AnalysisReport, suggestions: Vec<String>) -> Self {
        Self {
            analysis,
            suggestions,
            generated_at: Utc::now(),
            ai_insights: None,
        }
    }
}

pub struct InsightGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl InsightGenerator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
        temperature: f64,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            model: model.into(),
            temperature,
            max_tokens,
            timeout,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self::new(
            generator,
            config.insights_model(),
            config.insights.temperature,
            config.insights.max_tokens,
            config.insights.timeout(),
        )
    }

    pub fn build_prompt(analysis: &AnalysisReport) -> String {
        let data = serde_json::to_string_pretty(analysis).unwrap_or_else(|_| "{}".to_string());
        format!(
            "Based on the following analysis of user feedback and system performance data, \
             provide insights and recommendations for improving the natural language to SQL \
             conversion system:\n\n\
             Analysis Data:\n{}\n\n\
             Please provide:\n\
             1. Key insights from the data\n\
             2. Potential root causes for issues\n\
             3. Specific recommendations for prompt improvements\n\
             4. Suggestions for system enhancements\n\
             5. Metrics to monitor going forward\n\n\
             Focus on actionable improvements that can enhance accuracy and user satisfaction.",
            data
        )
    }

    /// Ask the service for recommendations on `analysis`
    pub async fn get_ai_insights(&self, analysis: &AnalysisReport) -> String {
        let request = GenerationRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(Self::build_prompt(analysis))],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        match tokio::time::timeout(self.timeout, self.generator.generate(request)).await {
            Ok(Ok(text)) => {
                info!("Generated AI insights ({} chars)", text.len());
                text.trim().to_string()
            }
            Ok(Err(e)) => {
                warn!("AI insight request failed: {:#}", e);
                format!("{}{:#}", INSIGHT_ERROR_PREFIX, e)
            }
            Err(_) => {
                warn!("AI insight request timed out after {:?}", self.timeout);
                format!(
                    "{}request timed out after {}s",
                    INSIGHT_ERROR_PREFIX,
                    self.timeout.as_secs()
                )
            }
        }
    }

    /// Insights for `analysis`, or for a fresh analysis from `analyzer` when none is given
    pub async fn get_ai_insights_for(
        &self,
        analyzer: &FeedbackAnalyzer<'_>,
        analysis: Option<&AnalysisReport>,
    ) -> String {
        match analysis {
            Some(analysis) => self.get_ai_insights(analysis).await,
            None => {
                let analysis = analyzer.analyze_feedback_patterns();
                self.get_ai_insights(&analysis).await
            }
        }
    }

    /// Compose a report from an already computed analysis
    pub async fn build_report(
        &self,
        analysis: AnalysisReport,
        suggestions: Vec<String>,
        include_ai_insights: bool,
    ) -> FeedbackReport {
        let ai_insights = if include_ai_insights {
            Some(self.get_ai_insights(&analysis).await)
        } else {
            None
        };
        FeedbackReport {
            ai_insights,
            ..FeedbackReport::new(analysis, suggestions)
        }
    }

    /// Analyze, suggest and (optionally) ask for insights in one go
    pub async fn export_report(
        &self,
        analyzer: &FeedbackAnalyzer<'_>,
        include_ai_insights: bool,
    ) -> FeedbackReport {
        let analysis = analyzer.analyze_feedback_patterns();
        let suggestions = analyzer.generate_improvement_suggestions(Some(&analysis));
        self.build_report(analysis, suggestions, include_ai_insights).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::{LearningStore, SUGGEST_ALL_GOOD};
    use anyhow::{bail, Result};
    use std::sync::Mutex;
    use tempfile::TempDir;

    enum Behavior {
        Reply(&'static str),
        Fail(&'static str),
        Hang,
    }

    struct MockGenerator {
        behavior: Behavior,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl MockGenerator {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl TextGenerator for MockGenerator {
        async fn generate(&self, request: GenerationRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request);
            match self.behavior {
                Behavior::Reply(text) => Ok(text.to_string()),
                Behavior::Fail(msg) => bail!("{}", msg),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn generator(mock: Arc<MockGenerator>) -> InsightGenerator {
        InsightGenerator::from_config(mock, &Config::default())
    }

    #[test]
    fn test_prompt_embeds_analysis_and_asks_five_things() {
        let prompt = InsightGenerator::build_prompt(&AnalysisReport::no_data());
        assert!(prompt.contains("No feedback data available for analysis"));
        for item in [
            "1. Key insights",
            "2. Potential root causes",
            "3. Specific recommendations for prompt improvements",
            "4. Suggestions for system enhancements",
            "5. Metrics to monitor",
        ] {
            assert!(prompt.contains(item), "missing {}", item);
        }
    }

    #[tokio::test]
    async fn test_insights_use_low_temperature() {
        let mock = MockGenerator::new(Behavior::Reply("  Tighten the JSON prompt.\n"));
        let text = generator(mock.clone()).get_ai_insights(&AnalysisReport::no_data()).await;
        assert_eq!(text, "Tighten the JSON prompt.");

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen[0].temperature, 0.3);
        assert_eq!(seen[0].max_tokens, 1000);
        assert_eq!(seen[0].model, "gpt-3.5-turbo");
        assert_eq!(seen[0].messages.len(), 1);
        assert_eq!(seen[0].messages[0].role, "user");
    }

    #[tokio::test]
    async fn test_failure_becomes_error_string() {
        let mock = MockGenerator::new(Behavior::Fail("quota exceeded"));
        let text = generator(mock).get_ai_insights(&AnalysisReport::no_data()).await;
        assert!(text.starts_with(INSIGHT_ERROR_PREFIX));
        assert!(text.contains("quota exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_string() {
        let mock = MockGenerator::new(Behavior::Hang);
        let insights = InsightGenerator::new(mock, "m", 0.3, 1000, Duration::from_secs(5));
        let text = insights.get_ai_insights(&AnalysisReport::no_data()).await;
        assert!(text.starts_with(INSIGHT_ERROR_PREFIX));
        assert!(text.contains("timed out"));
    }

    #[tokio::test]
    async fn test_insights_compute_analysis_when_absent() {
        let dir = TempDir::new().unwrap();
        let mut store = LearningStore::open(dir.path().join("learning.json")).unwrap();
        store.record_interaction("show users", None, false, None, None).unwrap();
        store.add_feedback_to_interaction(0, "wrong table").unwrap();
        let analyzer = FeedbackAnalyzer::new(&store);

        let mock = MockGenerator::new(Behavior::Reply("ok"));
        let insights = generator(mock.clone());
        assert_eq!(insights.get_ai_insights_for(&analyzer, None).await, "ok");
        assert_eq!(
            insights
                .get_ai_insights_for(&analyzer, Some(&AnalysisReport::no_data()))
                .await,
            "ok"
        );

        let seen = mock.seen.lock().unwrap();
        assert!(seen[0].messages[0].content.contains("\"total_feedback\": 1"));
        assert!(seen[1].messages[0].content.contains("No feedback data available"));
    }

    #[tokio::test]
    async fn test_export_report_with_and_without_insights() {
        let dir = TempDir::new().unwrap();
        let store = LearningStore::open(dir.path().join("learning.json")).unwrap();
        let analyzer = FeedbackAnalyzer::new(&store);

        let mock = MockGenerator::new(Behavior::Reply("all good"));
        let insights = generator(mock.clone());

        let plain = insights.export_report(&analyzer, false).await;
        assert_eq!(plain.analysis, AnalysisReport::no_data());
        assert_eq!(plain.suggestions, vec![SUGGEST_ALL_GOOD.to_string()]);
        assert!(plain.ai_insights.is_none());
        assert!(mock.seen.lock().unwrap().is_empty());
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("ai_insights").is_none());

        let full = insights.export_report(&analyzer, true).await;
        assert_eq!(full.ai_insights.as_deref(), Some("all good"));
    }
}
