//! Configuration management
//!
//! Manages model settings for translation and insights, the learning store
//! location, and the HTTP server binding.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LEARNING_DATA_FILE: &str = "learning_data.json";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Text-generation service used for translation
    #[serde(default)]
    pub llm: LlmConfig,
    /// Settings for AI insight reports
    #[serde(default)]
    pub insights: InsightsConfig,
    /// Learning store settings
    #[serde(default)]
    pub learning: LearningConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used to translate queries
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// Model for insight reports (defaults to the translation model)
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_insights_temperature")]
    pub temperature: f64,
    #[serde(default = "default_insights_max_tokens")]
    pub max_tokens: u32,
    /// Deadline for one insight request in seconds
    #[serde(default = "default_insights_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_insights_temperature() -> f64 {
    0.3
}

fn default_insights_max_tokens() -> u32 {
    1000
}

fn default_insights_timeout_secs() -> u64 {
    60
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_insights_temperature(),
            max_tokens: default_insights_max_tokens(),
            timeout_secs: default_insights_timeout_secs(),
        }
    }
}

impl InsightsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Path of the learning document (defaults to the data directory)
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

impl LearningConfig {
    /// Resolve the storage path
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join(LEARNING_DATA_FILE)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing defaults if absent
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let parent = path.parent().context("Config path has no parent")?;
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Model used for insight reports
    pub fn insights_model(&self) -> &str {
        self.insights.model.as_deref().unwrap_or(&self.llm.model)
    }
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "sql-assistant", "sql-assistant")
        .context("Failed to get project directories")
}

/// Get the configuration directory path
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Show current configuration
pub fn show_config() -> Result<()> {
    let config = Config::load()?;

    println!("Configuration ({})", config_path()?.display());
    println!("==========================================");
    println!("  LLM endpoint:      {}", config.llm.base_url);
    println!("  Translation model: {}", config.llm.model);
    println!("  Temperature:       {}", config.llm.temperature);
    println!("  Max tokens:        {}", config.llm.max_tokens);
    println!("  Timeout:           {}s", config.llm.timeout_secs);
    println!();
    println!("  Insights model:    {}", config.insights_model());
    println!("  Insights timeout:  {}s", config.insights.timeout_secs);
    println!();
    println!("  Learning data:     {}", config.learning.storage_path()?.display());
    println!("  Server:            {}:{}", config.server.host, config.server.port);
    println!("  CORS origins:      {}", config.server.cors_origins.join(", "));
    println!();
    println!(
        "  API key:           {}",
        if crate::security::has_api_key() { "Configured" } else { "Not configured" }
    );

    Ok(())
}

/// Set the translation model
pub fn set_model(model: &str) -> Result<()> {
    let mut config = Config::load()?;
    config.llm.model = model.to_string();
    config.save()?;
    println!("Translation model set to: {}", model);
    Ok(())
}

/// Reset configuration to defaults
pub fn reset_config() -> Result<()> {
    Config::default().save()?;
    println!("Configuration reset to defaults.");
    Ok(())
}
