//! SQL Assistant - natural-language to SQL with a learning loop
//!
//! - Translates free-text questions into SQL through an OpenAI-compatible API
//! - Records every interaction in a durable learning store
//! - Accepts feedback and corrections after the fact
//! - Analyzes feedback into keyword, error, trend and query-type statistics
//! - Produces improvement suggestions and optional AI insight reports
//!
//! # Example
//!
//! ```ignore
//! use sql_assistant::learning::{FeedbackAnalyzer, LearningStore};
//!
//! let mut store = LearningStore::open("learning_data.json")?;
//! store.record_interaction("show all users", Some("SELECT * FROM users"), true, None, None)?;
//! store.add_feedback_to_interaction(0, "wrong table")?;
//!
//! let analyzer = FeedbackAnalyzer::new(&store);
//! for suggestion in analyzer.generate_improvement_suggestions(None) {
//!     println!("{}", suggestion);
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod learning;
pub mod security;
pub mod server;

pub use agent::{Assistant, AssistantError, ChatClient, ProcessedQuery, QueryTranslator, TextGenerator, Translation};

pub use config::Config;

pub use learning::{
    AnalysisReport, FeedbackAnalyzer, FeedbackReport, InsightGenerator, InteractionRecord,
    LearningStore, StoreError,
};

pub use security::{delete_api_key, get_api_key, set_api_key};

pub use server::{router, start as start_server, ServerState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
