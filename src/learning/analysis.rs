//! Feedback analysis
//!
//! Reads feedback-bearing interactions from the learning store and derives
//! keyword, error, trend and query-type statistics, plus a list of
//! improvement suggestions. Nothing computed here is written back.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

use super::store::{InteractionRecord, LearningStore};

/// Message of the report returned when no interaction carries feedback
pub const NO_FEEDBACK_MESSAGE: &str = "No feedback data available for analysis";

pub const SUGGEST_JSON_PROMPTS: &str =
    "Improve prompt engineering to ensure consistent JSON responses from OpenAI";
pub const SUGGEST_SQL_PROMPTS: &str = "Review and enhance SQL generation prompts for better accuracy";
pub const SUGGEST_INVESTIGATE_DECLINE: &str =
    "Investigate recent decline in success rates - check for prompt degradation or API changes";
pub const SUGGEST_JOIN_HANDLING: &str = "Add specific handling for complex JOIN queries in the prompt";
pub const SUGGEST_AB_TESTING: &str = "Consider implementing A/B testing for different prompt versions";
pub const SUGGEST_ALL_GOOD: &str = "System performing well - continue monitoring feedback patterns";

/// Error string the translator records when the model reply is not JSON
pub const INVALID_JSON_ERROR: &str = "Invalid JSON response";

const MAX_KEYWORDS: usize = 20;
const MAX_ERRORS: usize = 5;
const RECENT_DAYS: usize = 7;
const LOW_SUCCESS_RATE: f64 = 0.7;
const JOIN_THRESHOLD: usize = 10;
const AB_TEST_THRESHOLD: usize = 50;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w+").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "will",
    "would", "could", "should", "may", "might", "must", "can", "this", "that", "these", "those",
];

/// Classification bucket for free-text feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTheme {
    IncorrectSql,
    Performance,
    MissingData,
    Formatting,
    Other,
}

impl FeedbackTheme {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackTheme::IncorrectSql => "incorrect_sql",
            FeedbackTheme::Performance => "performance",
            FeedbackTheme::MissingData => "missing_data",
            FeedbackTheme::Formatting => "formatting",
            FeedbackTheme::Other => "other",
        }
    }

    /// First matching rule wins, in declaration order.
    pub fn classify(feedback: &str) -> Self {
        const RULES: [(&[&str], FeedbackTheme); 4] = [
            (&["wrong", "incorrect"], FeedbackTheme::IncorrectSql),
            (&["slow", "performance"], FeedbackTheme::Performance),
            (&["missing", "not found"], FeedbackTheme::MissingData),
            (&["format", "display"], FeedbackTheme::Formatting),
        ];

        let text = feedback.to_lowercase();
        RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| text.contains(n)))
            .map(|(_, theme)| *theme)
            .unwrap_or(FeedbackTheme::Other)
    }
}

/// Kind of SQL statement a natural-language query seems to ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
    Join,
    Aggregate,
}

impl QueryType {
    pub const ALL: [QueryType; 6] = [
        QueryType::Select,
        QueryType::Insert,
        QueryType::Update,
        QueryType::Delete,
        QueryType::Join,
        QueryType::Aggregate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QueryType::Select => "select",
            QueryType::Insert => "insert",
            QueryType::Update => "update",
            QueryType::Delete => "delete",
            QueryType::Join => "join",
            QueryType::Aggregate => "aggregate",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            QueryType::Select => &["show", "list", "get", "find", "display"],
            QueryType::Insert => &["add", "create", "insert", "new"],
            QueryType::Update => &["update", "change", "modify", "edit"],
            QueryType::Delete => &["delete", "remove", "erase"],
            QueryType::Join => &["combine", "join", "merge", "link"],
            QueryType::Aggregate => &["count", "sum", "average", "total", "group"],
        }
    }

    /// Every bucket whose keywords occur in `query`; buckets are not exclusive.
    pub fn matching(query: &str) -> Vec<QueryType> {
        let query = query.to_lowercase();
        Self::ALL
            .into_iter()
            .filter(|t| t.keywords().iter().any(|k| query.contains(k)))
            .collect()
    }
}

/// Counts ordered by descending frequency; serialized as a JSON object that
/// keeps that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedCounts(Vec<(String, usize)>);

impl RankedCounts {
    /// Rank `items` by count, ties in first-seen order, keeping at most `limit`.
    pub fn most_common<I, S>(items: I, limit: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order: Vec<(String, usize)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in items {
            let item = item.into();
            match index.get(&item) {
                Some(&i) => order[i].1 += 1,
                None => {
                    index.insert(item.clone(), order.len());
                    order.push((item, 1));
                }
            }
        }
        // stable sort keeps first-seen order among equal counts
        order.sort_by(|a, b| b.1.cmp(&a.1));
        order.truncate(limit);
        Self(order)
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, c)| (k.as_str(), *c))
    }
}

impl Serialize for RankedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, count) in &self.0 {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RankedCounts {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RankedVisitor;

        impl<'de> Visitor<'de> for RankedVisitor {
            type Value = RankedCounts;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of string to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, count)) = access.next_entry::<String, usize>()? {
                    entries.push((key, count));
                }
                Ok(RankedCounts(entries))
            }
        }

        deserializer.deserialize_map(RankedVisitor)
    }
}

/// Error strings and feedback themes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPatterns {
    pub common_errors: RankedCounts,
    pub feedback_themes: BTreeMap<FeedbackTheme, usize>,
}

/// Per-day totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub total_queries: usize,
    pub success_rate: f64,
}

/// Full statistics over feedback-bearing interactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAnalysis {
    pub total_feedback: usize,
    pub common_keywords: RankedCounts,
    pub error_patterns: ErrorPatterns,
    /// Keyed by `YYYY-MM-DD`, ascending
    pub success_trends: BTreeMap<String, DailyStats>,
    pub query_type_analysis: BTreeMap<QueryType, usize>,
    pub analysis_timestamp: DateTime<Utc>,
}

/// Result of [`FeedbackAnalyzer::analyze_feedback_patterns`].
///
/// Callers must handle the `NoData` shape, which serializes to
/// `{"message": "No feedback data available for analysis"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Summary(FeedbackAnalysis),
    NoData { message: String },
}

impl AnalysisReport {
    pub fn no_data() -> Self {
        AnalysisReport::NoData {
            message: NO_FEEDBACK_MESSAGE.to_string(),
        }
    }

    pub fn summary(&self) -> Option<&FeedbackAnalysis> {
        match self {
            AnalysisReport::Summary(analysis) => Some(analysis),
            AnalysisReport::NoData { .. } => None,
        }
    }
}

/// Read-only analyzer over a learning store
pub struct FeedbackAnalyzer<'a> {
    store: &'a LearningStore,
}

impl<'a> FeedbackAnalyzer<'a> {
    pub fn new(store: &'a LearningStore) -> Self {
        Self { store }
    }

    /// Interactions carrying non-empty feedback, in log order
    pub fn feedback_data(&self) -> Vec<&'a InteractionRecord> {
        self.store
            .get_interactions(None)
            .iter()
            .filter(|i| i.has_feedback())
            .collect()
    }

    /// Compute the full report, or the "no data" report when no
    /// interaction has feedback.
    pub fn analyze_feedback_patterns(&self) -> AnalysisReport {
        let feedback = self.feedback_data();
        if feedback.is_empty() {
            return AnalysisReport::no_data();
        }
        debug!("Analyzing {} feedback-bearing interactions", feedback.len());
        AnalysisReport::Summary(analyze_records(&feedback))
    }

    /// Suggestions for `analysis`, computing a fresh analysis when `None`.
    pub fn generate_improvement_suggestions(&self, analysis: Option<&AnalysisReport>) -> Vec<String> {
        match analysis {
            Some(report) => improvement_suggestions(report),
            None => improvement_suggestions(&self.analyze_feedback_patterns()),
        }
    }
}

/// Analyze an already-filtered set of feedback-bearing records
pub fn analyze_records(records: &[&InteractionRecord]) -> FeedbackAnalysis {
    let texts: Vec<&str> = records.iter().filter_map(|r| r.feedback.as_deref()).collect();

    FeedbackAnalysis {
        total_feedback: records.len(),
        common_keywords: extract_keywords(&texts),
        error_patterns: analyze_error_patterns(records),
        success_trends: analyze_success_trends(records),
        query_type_analysis: analyze_query_types(records),
        analysis_timestamp: Utc::now(),
    }
}

/// Top keywords across feedback texts
pub fn extract_keywords(texts: &[&str]) -> RankedCounts {
    let words = texts.iter().flat_map(|text| {
        let lower = text.to_lowercase();
        WORD.find_iter(&lower)
            .map(|m| m.as_str().to_string())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(&w.as_str()))
            .collect::<Vec<_>>()
    });
    RankedCounts::most_common(words, MAX_KEYWORDS)
}

pub fn analyze_error_patterns(records: &[&InteractionRecord]) -> ErrorPatterns {
    let errors = records
        .iter()
        .filter_map(|r| r.error.as_deref())
        .filter(|e| !e.is_empty());

    let mut feedback_themes = BTreeMap::new();
    for record in records {
        let theme = FeedbackTheme::classify(record.feedback.as_deref().unwrap_or_default());
        *feedback_themes.entry(theme).or_default() += 1;
    }

    ErrorPatterns {
        common_errors: RankedCounts::most_common(errors, MAX_ERRORS),
        feedback_themes,
    }
}

pub fn analyze_success_trends(records: &[&InteractionRecord]) -> BTreeMap<String, DailyStats> {
    let mut daily: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for record in records {
        let day = daily
            .entry(record.timestamp.date_naive().format("%Y-%m-%d").to_string())
            .or_default();
        day.0 += 1;
        if record.success {
            day.1 += 1;
        }
    }

    daily
        .into_iter()
        .map(|(date, (total, successes))| {
            let rate = if total > 0 {
                successes as f64 / total as f64
            } else {
                0.0
            };
            (
                date,
                DailyStats {
                    total_queries: total,
                    success_rate: round2(rate),
                },
            )
        })
        .collect()
}

pub fn analyze_query_types(records: &[&InteractionRecord]) -> BTreeMap<QueryType, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        for query_type in QueryType::matching(&record.natural_query) {
            *counts.entry(query_type).or_default() += 1;
        }
    }
    counts
}

/// Apply the suggestion heuristics to a report. Never returns an empty list.
pub fn improvement_suggestions(report: &AnalysisReport) -> Vec<String> {
    let mut suggestions = Vec::new();

    if let Some(analysis) = report.summary() {
        let errors = &analysis.error_patterns;
        if errors.common_errors.contains_key(INVALID_JSON_ERROR) {
            suggestions.push(SUGGEST_JSON_PROMPTS.to_string());
        }

        let theme = |t: FeedbackTheme| errors.feedback_themes.get(&t).copied().unwrap_or(0);
        if theme(FeedbackTheme::IncorrectSql) > theme(FeedbackTheme::Other) {
            suggestions.push(SUGGEST_SQL_PROMPTS.to_string());
        }

        let recent: Vec<f64> = analysis
            .success_trends
            .values()
            .rev()
            .take(RECENT_DAYS)
            .map(|d| d.success_rate)
            .collect();
        if !recent.is_empty() && recent.iter().sum::<f64>() / (recent.len() as f64) < LOW_SUCCESS_RATE {
            suggestions.push(SUGGEST_INVESTIGATE_DECLINE.to_string());
        }

        let joins = analysis
            .query_type_analysis
            .get(&QueryType::Join)
            .copied()
            .unwrap_or(0);
        if joins > JOIN_THRESHOLD {
            suggestions.push(SUGGEST_JOIN_HANDLING.to_string());
        }

        if analysis.total_feedback > AB_TEST_THRESHOLD {
            suggestions.push(SUGGEST_AB_TESTING.to_string());
        }
    }

    if suggestions.is_empty() {
        suggestions.push(SUGGEST_ALL_GOOD.to_string());
    }
    suggestions
}

/// Round to two decimals from the exact binary value, ties to even.
fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse().unwrap_or(value)
}
