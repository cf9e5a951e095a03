//! Learning system
//!
//! Records every query interaction durably, lets feedback be attached after
//! the fact, and derives statistics, suggestions and AI insight reports from
//! the accumulated history.

pub mod analysis;
pub mod insights;
pub mod store;

pub use analysis::{
    AnalysisReport, DailyStats, ErrorPatterns, FeedbackAnalysis, FeedbackAnalyzer, FeedbackTheme,
    QueryType, RankedCounts, INVALID_JSON_ERROR, NO_FEEDBACK_MESSAGE, SUGGEST_ALL_GOOD,
};
pub use insights::{FeedbackReport, InsightGenerator, INSIGHT_ERROR_PREFIX};
pub use store::{
    Correction, InteractionRecord, LearningData, LearningStore, QueryPattern, StoreError,
    SCHEMA_VERSION,
};
