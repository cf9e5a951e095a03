//! CLI interface for sql-assistant

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::agent::{Assistant, ChatClient, QueryTranslator};
use crate::config::Config;
use crate::learning::{AnalysisReport, FeedbackAnalyzer, FeedbackReport, InsightGenerator, LearningStore};

#[derive(Parser)]
#[command(name = "sql-assistant")]
#[command(about = "Natural-language to SQL assistant that learns from feedback", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Translate a natural-language query to SQL
    Query {
        /// The question to translate
        text: String,
    },
    /// Show recorded interactions
    History {
        /// Only show the most recent N interactions
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Attach feedback to a recorded interaction
    Feedback {
        /// Interaction index as shown by `history`
        index: usize,
        /// Feedback text
        text: String,
    },
    /// Record a corrected version of a query
    Correct {
        original: String,
        corrected: String,
    },
    /// Analyze feedback and print suggestions
    Analyze {
        /// Print the raw analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export a full feedback report as JSON
    Report {
        /// Skip the AI insights request
        #[arg(long)]
        no_ai_insights: bool,
        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Configure the assistant
    Config {
        /// Store the text-generation API key
        #[arg(long)]
        set_api_key: Option<String>,
        /// Remove the stored API key
        #[arg(long)]
        delete_api_key: bool,
        /// Set the translation model
        #[arg(long)]
        set_model: Option<String>,
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
}

fn open_store(config: &Config) -> Result<LearningStore> {
    let path = config.learning.storage_path()?;
    LearningStore::open(&path)
        .with_context(|| format!("Failed to open learning store at {}", path.display()))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            crate::server::start(host, port).await?;
        }
        Commands::Query { text } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let client = Arc::new(ChatClient::from_config(&config.llm)?);
            let assistant = Assistant::new(
                QueryTranslator::new(client, &config.llm),
                Arc::new(RwLock::new(store)),
            );

            let answer = assistant.process_query(&text).await?;
            let index = assistant.store().read().await.get_interactions(None).len() - 1;
            print_translation(index, &answer.parsed);
        }
        Commands::History { limit } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let total = store.get_interactions(None).len();
            let shown = store.get_interactions(limit);
            if shown.is_empty() {
                println!("No interactions recorded yet.");
            }
            for (offset, record) in shown.iter().enumerate() {
                let index = total - shown.len() + offset;
                println!(
                    "[{}] {} {} {}",
                    index,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    if record.success { "ok  " } else { "FAIL" },
                    record.natural_query
                );
                if let Some(sql) = &record.generated_sql {
                    println!("      sql:      {}", sql);
                }
                if let Some(error) = &record.error {
                    println!("      error:    {}", error);
                }
                if let Some(feedback) = &record.feedback {
                    println!("      feedback: {}", feedback);
                }
            }
        }
        Commands::Feedback { index, text } => {
            let config = Config::load()?;
            let mut store = open_store(&config)?;
            if store.add_feedback_to_interaction(index, &text)? {
                println!("Feedback attached to interaction {}.", index);
            } else {
                println!(
                    "No interaction at index {} ({} recorded); nothing changed.",
                    index,
                    store.get_interactions(None).len()
                );
            }
        }
        Commands::Correct { original, corrected } => {
            let config = Config::load()?;
            let mut store = open_store(&config)?;
            store.record_correction(&original, &corrected)?;
            println!("Correction recorded ({} total).", store.corrections().len());
        }
        Commands::Analyze { json } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let analyzer = FeedbackAnalyzer::new(&store);
            let analysis = analyzer.analyze_feedback_patterns();
            let suggestions = analyzer.generate_improvement_suggestions(Some(&analysis));
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "analysis": analysis,
                        "suggestions": suggestions
                    }))?
                );
            } else {
                print_analysis(&analysis, &suggestions);
            }
        }
        Commands::Report { no_ai_insights, output } => {
            let config = Config::load()?;
            let store = open_store(&config)?;
            let analyzer = FeedbackAnalyzer::new(&store);

            let report = if no_ai_insights {
                let analysis = analyzer.analyze_feedback_patterns();
                let suggestions = analyzer.generate_improvement_suggestions(Some(&analysis));
                FeedbackReport::new(analysis, suggestions)
            } else {
                let client = Arc::new(ChatClient::from_config(&config.llm)?);
                InsightGenerator::from_config(client, &config)
                    .export_report(&analyzer, true)
                    .await
            };

            let rendered = serde_json::to_string_pretty(&report)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write report to {}", path.display()))?;
                    println!("Report written to {}", path.display());
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Config { set_api_key, delete_api_key, set_model, show, reset } => {
            if let Some(key) = set_api_key {
                crate::security::set_api_key(&key)?;
                println!("API key stored securely in keyring.");
            } else if delete_api_key {
                crate::security::delete_api_key()?;
                println!("API key removed.");
            } else if let Some(model) = set_model {
                crate::config::set_model(&model)?;
            } else if reset {
                crate::config::reset_config()?;
            } else if show {
                crate::config::show_config()?;
            } else {
                println!("Use --show to view configuration, or --help for options.");
            }
        }
    }

    Ok(())
}

fn print_translation(index: usize, parsed: &crate::agent::Translation) {
    println!("Interaction #{}", index);
    println!("  Intent: {}", parsed.intent);
    match &parsed.sql {
        Some(sql) => println!("  SQL:    {}", sql),
        None => println!("  SQL:    (none)"),
    }
    if let Some(error) = &parsed.error {
        println!("  Error:  {}", error);
    }
}

fn print_analysis(analysis: &AnalysisReport, suggestions: &[String]) {
    match analysis.summary() {
        None => println!("{}", crate::learning::NO_FEEDBACK_MESSAGE),
        Some(summary) => {
            println!("Feedback Analysis");
            println!("=================");
            println!("Interactions with feedback: {}", summary.total_feedback);

            if !summary.common_keywords.is_empty() {
                println!("\nCommon keywords:");
                for (word, count) in summary.common_keywords.iter() {
                    println!("  {:<20} {}", word, count);
                }
            }

            if !summary.error_patterns.common_errors.is_empty() {
                println!("\nCommon errors:");
                for (error, count) in summary.error_patterns.common_errors.iter() {
                    println!("  {:>4}  {}", count, error);
                }
            }

            println!("\nFeedback themes:");
            for (theme, count) in &summary.error_patterns.feedback_themes {
                println!("  {:<20} {}", theme.as_str(), count);
            }

            println!("\nDaily success rate:");
            for (date, stats) in &summary.success_trends {
                println!("  {}  {:>5.2}  ({} queries)", date, stats.success_rate, stats.total_queries);
            }

            println!("\nQuery types:");
            for (kind, count) in &summary.query_type_analysis {
                println!("  {:<20} {}", kind.as_str(), count);
            }
        }
    }

    println!("\nSuggestions:");
    for suggestion in suggestions {
        println!("  - {}", suggestion);
    }
}
