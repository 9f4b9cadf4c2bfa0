//! Date-partitioned JSON session log.
//!
//! Each task summary lives in its own file at
//! `<base>/YYYY/MM/DD/<session_id>.json`, partitioned by the date it was
//! recorded.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use lifeline_core::{Interaction, MemoryError, MemoryService, RecallQuery};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::InMemoryStore;

/// Default location of the log, relative to the working directory.
pub const DEFAULT_BASE_DIR: &str = "memory/session_logs";

/// Writes and reads per-session JSON files.
#[derive(Debug, Clone)]
pub struct SessionLog {
    base_dir: PathBuf,
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

impl SessionLog {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File holding `session_id` when recorded at `at`.
    pub fn path_for(&self, session_id: Uuid, at: DateTime<Utc>) -> PathBuf {
        self.base_dir
            .join(format!("{:04}", at.year()))
            .join(format!("{:02}", at.month()))
            .join(format!("{:02}", at.day()))
            .join(format!("{session_id}.json"))
    }

    /// Write `interaction`, replacing any earlier version of the same session.
    pub fn store(&self, interaction: &Interaction) -> Result<PathBuf, MemoryError> {
        let path = self.path_for(interaction.session_id, interaction.recorded_at);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Ok(existing) = fs::read_to_string(&path) {
            let existing = existing.trim();
            if !existing.is_empty() && serde_json::from_str::<Value>(existing).is_err() {
                warn!(path = ?path, "Corrupt session file detected; overwriting");
            }
        }

        let json = serde_json::to_string_pretty(interaction)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;

        debug!(path = ?path, session = %interaction.session_id, "Stored session");
        Ok(path)
    }

    pub fn load(&self, path: &Path) -> Result<Interaction, MemoryError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Every readable session under the base directory, oldest first.
    ///
    /// Unreadable or corrupt files are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<Interaction>, MemoryError> {
        let mut files = Vec::new();
        match collect_json_files(&self.base_dir, &mut files) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        }

        let mut sessions: Vec<Interaction> = files
            .iter()
            .filter_map(|path| match self.load(path) {
                Ok(interaction) => Some(interaction),
                Err(err) => {
                    warn!(path = ?path, error = %err, "Skipping unreadable session file");
                    None
                }
            })
            .collect();
        sessions.sort_by_key(|s| s.recorded_at);
        Ok(sessions)
    }
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Keyword-recall memory persisted through a [`SessionLog`].
///
/// Opening loads every stored session into the in-process index; each new
/// summary is written to disk before it becomes recallable.
#[derive(Debug)]
pub struct SessionMemory {
    log: SessionLog,
    index: InMemoryStore,
}

impl SessionMemory {
    pub fn open(log: SessionLog) -> Result<Self, MemoryError> {
        let index = InMemoryStore::new();
        for interaction in log.load_all()? {
            index.insert(interaction);
        }
        debug!(base = ?log.base_dir(), sessions = index.len(), "Opened session memory");
        Ok(Self { log, index })
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    pub fn index(&self) -> &InMemoryStore {
        &self.index
    }
}

#[async_trait]
impl MemoryService for SessionMemory {
    async fn summarize_and_store(&self, interaction: &Interaction) -> Result<(), MemoryError> {
        self.log.store(interaction)?;
        self.index.insert(interaction.clone());
        Ok(())
    }

    async fn recall(&self, query: &RecallQuery) -> Result<Option<Value>, MemoryError> {
        Ok(self.index.lookup(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lifeline_core::{ResultSource, StepStatus, ToolUsage};
    use serde_json::json;
    use tempfile::TempDir;

    fn interaction(query: &str, at: DateTime<Utc>) -> Interaction {
        Interaction {
            session_id: Uuid::new_v4(),
            query: query.into(),
            answer: Some("8".into()),
            outcome: "completed".into(),
            tools: vec![ToolUsage {
                capability: "add".into(),
                arguments: json!([5, 3]),
                status: StepStatus::Succeeded,
                source: ResultSource::Tool,
                output: Some(json!(8)),
                error: None,
            }],
            recorded_at: at,
        }
    }

    #[test]
    fn test_path_is_date_partitioned() {
        let log = SessionLog::new("/logs");
        let id = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2025, 3, 7, 12, 0, 0).unwrap();
        assert_eq!(
            log.path_for(id, at),
            PathBuf::from(format!("/logs/2025/03/07/{id}.json"))
        );
    }

    #[test]
    fn test_store_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());
        let original = interaction("add 5 and 3", Utc::now());

        let path = log.store(&original).unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(log.load(&path).unwrap(), original);
    }

    #[test]
    fn test_corrupt_file_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());
        let original = interaction("q", Utc::now());
        let path = log.path_for(original.session_id, original.recorded_at);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        log.store(&original).unwrap();
        assert_eq!(log.load(&path).unwrap(), original);
    }

    #[test]
    fn test_load_all_skips_corrupt_and_sorts() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path());
        let later = interaction("later", Utc.with_ymd_and_hms(2025, 5, 2, 0, 0, 0).unwrap());
        let earlier = interaction("earlier", Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap());
        log.store(&later).unwrap();
        log.store(&earlier).unwrap();
        fs::write(dir.path().join("2025").join("junk.json"), "nope").unwrap();

        let queries: Vec<String> = log.load_all().unwrap().into_iter().map(|s| s.query).collect();
        assert_eq!(queries, vec!["earlier", "later"]);
    }

    #[test]
    fn test_missing_base_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = SessionLog::new(dir.path().join("absent"));
        assert!(log.load_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_memory_persists_and_recalls_after_reopen() {
        let dir = TempDir::new().unwrap();
        let memory = SessionMemory::open(SessionLog::new(dir.path())).unwrap();
        memory
            .summarize_and_store(&interaction("add 5 and 3", Utc::now()))
            .await
            .unwrap();

        let reopened = SessionMemory::open(SessionLog::new(dir.path())).unwrap();
        assert_eq!(reopened.index().len(), 1);

        let query = RecallQuery {
            query: "something else".into(),
            capability: "add".into(),
            arguments: json!([5, 3]),
            description: String::new(),
        };
        assert_eq!(reopened.recall(&query).await.unwrap(), Some(json!(8)));
    }
}
