//! Learning Store - durable log of query interactions, patterns and corrections
//!
//! The whole store is a single JSON document rewritten on every mutation.
//! Records are only ever appended; positions are stable for the lifetime of
//! the file, and `feedback` is the only field that changes after creation.
//!
//! There is no cross-process locking. Two processes writing the same file
//! race and the last writer wins.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Top-level collections every document must carry
const COLLECTIONS: [&str; 4] = ["patterns", "corrections", "interactions", "usage_stats"];

/// Errors raised by the learning store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Writing the document failed
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be serialized
    #[error("failed to serialize learning data: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The document on disk has the wrong shape
    #[error("learning data at {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// The document was written by a newer schema
    #[error("learning data at {} has unsupported schema version {found} (max {})", path.display(), SCHEMA_VERSION)]
    UnsupportedVersion { path: PathBuf, found: u64 },
}

/// One recorded attempt to translate (and maybe run) a natural-language query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub natural_query: String,
    #[serde(default)]
    pub generated_sql: Option<String>,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    /// Whether a human has attached non-empty feedback
    pub fn has_feedback(&self) -> bool {
        self.feedback.as_deref().is_some_and(|f| !f.is_empty())
    }
}

/// A logged translation attempt, kept for future similarity features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPattern {
    pub natural_query: String,
    pub generated_sql: String,
    pub success: bool,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_usage_count")]
    pub usage_count: u64,
}

/// A user-submitted correction to a previously generated query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub original: String,
    pub corrected: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// The persisted document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningData {
    pub version: u32,
    pub patterns: Vec<QueryPattern>,
    pub corrections: Vec<Correction>,
    pub interactions: Vec<InteractionRecord>,
    pub usage_stats: BTreeMap<String, u64>,
}

impl Default for LearningData {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            patterns: Vec::new(),
            corrections: Vec::new(),
            interactions: Vec::new(),
            usage_stats: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_usage_count() -> u64 {
    1
}

/// Accept RFC 3339 timestamps and naive ISO-8601 ones (read as UTC).
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}

/// Persistent learning store backed by one JSON file
pub struct LearningStore {
    path: PathBuf,
    data: LearningData,
}

impl LearningStore {
    /// Open the store at `path`.
    ///
    /// A missing file yields an empty store. A file that cannot be read also
    /// yields an empty store (startup never blocks on a bad disk), but a file
    /// that reads fine and has the wrong shape is rejected.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => migrate(&path, &content)?,
                Err(e) => {
                    warn!("Could not read learning data at {}: {}; starting empty", path.display(), e);
                    LearningData::default()
                }
            }
        } else {
            debug!("No learning data at {}; starting empty", path.display());
            LearningData::default()
        };

        info!(
            "Learning store opened at {} ({} interactions)",
            path.display(),
            data.interactions.len()
        );
        Ok(Self { path, data })
    }

    /// Append an interaction and persist
    pub fn record_interaction(
        &mut self,
        natural_query: &str,
        generated_sql: Option<&str>,
        success: bool,
        feedback: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let record = InteractionRecord {
            natural_query: natural_query.to_string(),
            generated_sql: generated_sql.map(str::to_string),
            success,
            feedback: feedback.map(str::to_string),
            error: error.map(str::to_string),
            timestamp: Utc::now(),
        };
        self.commit(|data| {
            data.interactions.push(record);
            bump(data, "interactions");
            if !success {
                bump(data, "failures");
            }
        })?;
        debug!("Recorded interaction #{}", self.data.interactions.len() - 1);
        Ok(())
    }

    /// Attach feedback to the interaction at `index`.
    ///
    /// An out-of-range index is silently ignored: nothing is written and no
    /// error is raised. Returns whether the feedback was applied.
    pub fn add_feedback_to_interaction(&mut self, index: usize, feedback: &str) -> Result<bool, StoreError> {
        if index >= self.data.interactions.len() {
            debug!("Ignoring feedback for out-of-range interaction {}", index);
            return Ok(false);
        }
        self.commit(|data| {
            data.interactions[index].feedback = Some(feedback.to_string());
            bump(data, "feedback");
        })?;
        info!("Attached feedback to interaction {}", index);
        Ok(true)
    }

    /// Recorded interactions, oldest first.
    ///
    /// With `Some(k)` only the last `k` are returned, still oldest first.
    /// `Some(0)` behaves like `None`.
    pub fn get_interactions(&self, limit: Option<usize>) -> &[InteractionRecord] {
        let all = &self.data.interactions;
        match limit {
            Some(k) if k > 0 => &all[all.len().saturating_sub(k)..],
            _ => all,
        }
    }

    /// Append a query pattern and persist
    pub fn record_query_pattern(
        &mut self,
        natural_query: &str,
        generated_sql: &str,
        success: bool,
    ) -> Result<(), StoreError> {
        let pattern = QueryPattern {
            natural_query: natural_query.to_string(),
            generated_sql: generated_sql.to_string(),
            success,
            timestamp: Utc::now(),
            usage_count: 1,
        };
        self.commit(|data| {
            data.patterns.push(pattern);
            bump(data, "patterns");
        })
    }

    /// Append a correction and persist
    pub fn record_correction(&mut self, original: &str, corrected: &str) -> Result<(), StoreError> {
        let correction = Correction {
            original: original.to_string(),
            corrected: corrected.to_string(),
            timestamp: Utc::now(),
        };
        self.commit(|data| {
            data.corrections.push(correction);
            bump(data, "corrections");
        })?;
        info!("Recorded correction ({} total)", self.data.corrections.len());
        Ok(())
    }

    /// Patterns similar to `query`. Not implemented; always empty.
    pub fn find_similar_patterns(&self, _query: &str, _threshold: f64) -> Vec<QueryPattern> {
        Vec::new()
    }

    /// Completions for a partially typed query. Not implemented; always empty.
    pub fn get_query_suggestions(&self, _partial_query: &str) -> Vec<String> {
        Vec::new()
    }

    pub fn patterns(&self) -> &[QueryPattern] {
        &self.data.patterns
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.data.corrections
    }

    pub fn usage_stats(&self) -> &BTreeMap<String, u64> {
        &self.data.usage_stats
    }

    /// The full in-memory document
    pub fn data(&self) -> &LearningData {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the document and adopt it only once the
    /// copy is on disk. A failed write leaves memory untouched.
    fn commit(&mut self, change: impl FnOnce(&mut LearningData)) -> Result<(), StoreError> {
        let mut next = self.data.clone();
        change(&mut next);
        write_document(&self.path, &next)?;
        self.data = next;
        Ok(())
    }
}

fn bump(data: &mut LearningData, counter: &str) {
    *data.usage_stats.entry(counter.to_string()).or_default() += 1;
}

/// Write `data` to `path` (temp file, then rename)
fn write_document(path: &Path, data: &LearningData) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let content = serde_json::to_string_pretty(data)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, content).map_err(|source| StoreError::Io {
        path: temp_path.clone(),
        source,
    })?;
    std::fs::rename(&temp_path, path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Validate a raw document and bring it to the current schema.
fn migrate(path: &Path, content: &str) -> Result<LearningData, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let mut raw: Value = serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;
    let Some(object) = raw.as_object_mut() else {
        return Err(corrupt("root is not an object".to_string()));
    };

    let found = match object.get("version") {
        None => 0,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| corrupt(format!("version is not an integer: {}", v)))?,
    };
    if found > u64::from(SCHEMA_VERSION) {
        return Err(StoreError::UnsupportedVersion {
            path: path.to_path_buf(),
            found,
        });
    }

    // v0 -> v1: fill in any missing top-level collection
    for key in COLLECTIONS {
        if !object.contains_key(key) {
            debug!("Backfilling missing '{}' in {}", key, path.display());
            let empty = if key == "usage_stats" {
                Value::Object(serde_json::Map::new())
            } else {
                Value::Array(Vec::new())
            };
            object.insert(key.to_string(), empty);
        }
    }
    object.insert("version".to_string(), Value::from(SCHEMA_VERSION));

    serde_json::from_value(raw).map_err(|e| corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, LearningStore) {
        let dir = TempDir::new().unwrap();
        let store = LearningStore::open(dir.path().join("learning_data.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.get_interactions(None).is_empty());
        assert!(store.patterns().is_empty());
        assert!(store.corrections().is_empty());
        assert!(store.usage_stats().is_empty());
        assert_eq!(store.data().version, SCHEMA_VERSION);
    }

    #[test]
    fn test_record_interaction_appends_in_order() {
        let (_dir, mut store) = temp_store();
        store.record_interaction("select users", Some("SELECT * FROM users"), true, Some("good"), None).unwrap();
        store.record_interaction("bad query", None, false, None, Some("SQL error")).unwrap();

        let all = store.get_interactions(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].natural_query, "select users");
        assert_eq!(all[0].generated_sql.as_deref(), Some("SELECT * FROM users"));
        assert_eq!(all[0].feedback.as_deref(), Some("good"));
        assert!(all[0].error.is_none());
        assert_eq!(all[1].natural_query, "bad query");
        assert!(all[1].generated_sql.is_none());
        assert!(!all[1].success);
        assert_eq!(all[1].error.as_deref(), Some("SQL error"));
    }

    #[test]
    fn test_absent_values_serialize_as_null() {
        let (_dir, mut store) = temp_store();
        store.record_interaction("q", None, false, None, None).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        let record = &raw["interactions"][0];
        assert!(record["generated_sql"].is_null());
        assert!(record["feedback"].is_null());
        assert!(record["error"].is_null());
    }

    #[test]
    fn test_limit_returns_suffix_window() {
        let (_dir, mut store) = temp_store();
        for i in 0..5 {
            store.record_interaction(&format!("query{}", i), None, true, None, None).unwrap();
        }

        let last_two = store.get_interactions(Some(2));
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].natural_query, "query3");
        assert_eq!(last_two[1].natural_query, "query4");

        assert_eq!(store.get_interactions(Some(50)).len(), 5);
        assert_eq!(store.get_interactions(Some(0)).len(), 5);
    }

    #[test]
    fn test_feedback_updates_only_feedback() {
        let (_dir, mut store) = temp_store();
        store.record_interaction("query", Some("sql"), true, None, None).unwrap();
        let before = store.get_interactions(None)[0].clone();

        assert!(store.add_feedback_to_interaction(0, "feedback added").unwrap());

        let after = &store.get_interactions(None)[0];
        assert_eq!(after.feedback.as_deref(), Some("feedback added"));
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.natural_query, before.natural_query);
        assert_eq!(after.generated_sql, before.generated_sql);
    }

    #[test]
    fn test_out_of_range_feedback_is_noop() {
        let (_dir, mut store) = temp_store();
        store.record_interaction("query", None, true, None, None).unwrap();
        let before = store.data().clone();

        assert!(!store.add_feedback_to_interaction(1, "x").unwrap());
        assert!(!store.add_feedback_to_interaction(99, "x").unwrap());
        assert_eq!(store.data(), &before);
    }

    #[test]
    fn test_reload_round_trip() {
        let (dir, mut store) = temp_store();
        store.record_interaction("show users", Some("SELECT * FROM users"), true, None, None).unwrap();
        store.record_query_pattern("show users", "SELECT * FROM users", true).unwrap();
        store.record_correction("wrong query", "corrected query").unwrap();
        store.add_feedback_to_interaction(0, "nice").unwrap();

        let reopened = LearningStore::open(dir.path().join("learning_data.json")).unwrap();
        assert_eq!(reopened.data(), store.data());
    }

    #[test]
    fn test_pattern_and_correction_logs() {
        let (_dir, mut store) = temp_store();
        store.record_query_pattern("select users", "SELECT * FROM users", true).unwrap();
        store.record_correction("wrong query", "corrected query").unwrap();

        assert_eq!(store.patterns().len(), 1);
        assert_eq!(store.patterns()[0].usage_count, 1);
        assert_eq!(store.corrections()[0].original, "wrong query");
        assert_eq!(store.corrections()[0].corrected, "corrected query");
        assert_eq!(store.usage_stats().get("patterns"), Some(&1));
        assert_eq!(store.usage_stats().get("corrections"), Some(&1));
    }

    #[test]
    fn test_legacy_document_is_backfilled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("learning_data.json");
        std::fs::write(
            &path,
            r#"{"interactions": [{"natural_query": "q", "generated_sql": null, "success": true,
                "feedback": "ok", "error": null, "timestamp": "2024-01-15T10:30:00.123456"}]}"#,
        )
        .unwrap();

        let store = LearningStore::open(&path).unwrap();
        assert_eq!(store.get_interactions(None).len(), 1);
        assert_eq!(
            store.get_interactions(None)[0].timestamp.date_naive().to_string(),
            "2024-01-15"
        );
        assert!(store.patterns().is_empty());
        assert!(store.usage_stats().is_empty());
        assert_eq!(store.data().version, SCHEMA_VERSION);
    }

    #[test]
    fn test_corrupt_document_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("learning_data.json");

        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(matches!(LearningStore::open(&path), Err(StoreError::Corrupt { .. })));

        std::fs::write(&path, r#"{"interactions": {"not": "a list"}}"#).unwrap();
        assert!(matches!(LearningStore::open(&path), Err(StoreError::Corrupt { .. })));

        std::fs::write(&path, r#"{"version": 99}"#).unwrap();
        assert!(matches!(
            LearningStore::open(&path),
            Err(StoreError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_save_failure_propagates() {
        let dir = TempDir::new().unwrap();
        // The store path is a directory, so the rename over it must fail
        let path = dir.path().join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let mut store = LearningStore {
            path,
            data: LearningData::default(),
        };

        assert!(store.record_interaction("q", None, true, None, None).is_err());
    }

    #[test]
    fn test_failed_save_leaves_memory_unchanged() {
        let (dir, mut store) = temp_store();
        store.record_interaction("show users", None, true, None, None).unwrap();
        let before = store.data().clone();

        // Occupy the target path with a non-empty directory so every write fails
        std::fs::remove_file(store.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("learning_data.json").join("child")).unwrap();

        assert!(store.record_interaction("q", None, false, None, Some("e")).is_err());
        assert!(store.add_feedback_to_interaction(0, "wrong").is_err());
        assert!(store.record_query_pattern("q", "SELECT 1", true).is_err());
        assert!(store.record_correction("a", "b").is_err());

        assert_eq!(store.data(), &before);
        assert_eq!(store.get_interactions(None).len(), 1);
        assert!(store.get_interactions(None)[0].feedback.is_none());
        assert_eq!(store.usage_stats().get("interactions"), Some(&1));
        assert!(store.usage_stats().get("failures").is_none());
    }

    #[test]
    fn test_placeholders_return_empty() {
        let (_dir, store) = temp_store();
        assert!(store.find_similar_patterns("query", 0.8).is_empty());
        assert!(store.get_query_suggestions("part").is_empty());
    }
}
