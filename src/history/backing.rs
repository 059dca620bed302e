//! Durable storage behind the history store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::types::{SessionId, Snapshot, Turn, TurnId};

/// One history log entry: a terminal turn and, if it completed, its snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub turn: Turn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl HistoryEntry {
    pub fn new(turn: Turn, snapshot: Option<Snapshot>) -> Self {
        Self { turn, snapshot }
    }

    pub fn turn_id(&self) -> TurnId {
        self.turn.id
    }

    /// Whether this entry can be used as a revert target.
    pub fn is_revert_point(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Storage abstraction for a session's history log.
#[async_trait]
pub trait HistoryBacking: Send + Sync {
    /// Load every entry for the session, in log order.
    async fn load(&self, session: &SessionId) -> Result<Vec<HistoryEntry>>;
    /// Durably append one entry.
    async fn append(&self, session: &SessionId, entry: &HistoryEntry) -> Result<()>;
    /// Keep only the first `keep` entries.
    async fn truncate(&self, session: &SessionId, keep: usize) -> Result<()>;
}

/// In-process backing, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    sessions: Mutex<HashMap<SessionId, Vec<HistoryEntry>>>,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryBacking for MemoryBacking {
    async fn load(&self, session: &SessionId) -> Result<Vec<HistoryEntry>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions.get(session).cloned().unwrap_or_default())
    }

    async fn append(&self, session: &SessionId, entry: &HistoryEntry) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(session.clone()).or_default().push(entry.clone());
        Ok(())
    }

    async fn truncate(&self, session: &SessionId, keep: usize) -> Result<()> {
        let mut sessions = self.sessions.lock().await;
        if let Some(entries) = sessions.get_mut(session) {
            entries.truncate(keep);
        }
        Ok(())
    }
}

/// File-backed history: one JSON-lines file per session.
///
/// Appends write a single line and sync it. Truncation rewrites the file
/// through a temporary sibling and an atomic rename.
#[derive(Debug, Clone)]
pub struct FileBacking {
    base_dir: PathBuf,
}

impl FileBacking {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Backing rooted at the platform data directory.
    pub fn new_default() -> Self {
        Self::new(crate::config::default_data_dir().join("history"))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, session: &SessionId) -> PathBuf {
        self.base_dir
            .join(format!("{}.jsonl", normalize_label(session.as_str())))
    }

    async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryBacking for FileBacking {
    async fn load(&self, session: &SessionId) -> Result<Vec<HistoryEntry>> {
        let path = self.session_path(session);
        let raw = match fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        // Every append ends with a newline, so an unterminated tail is an
        // append that never finished.
        let (complete, tail) = match raw.rfind('\n') {
            Some(end) => raw.split_at(end + 1),
            None => ("", raw.as_str()),
        };
        let mut entries = Vec::new();
        for line in complete.lines().filter(|line| !line.trim().is_empty()) {
            entries.push(serde_json::from_str(line)?);
        }
        if tail.trim().is_empty() {
            return Ok(entries);
        }

        match serde_json::from_str::<HistoryEntry>(tail) {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::warn!(
                session_id = %session,
                path = %path.display(),
                bytes = tail.len(),
                error = %err,
                "dropping incomplete trailing history line"
            ),
        }
        self.rewrite(session, &entries).await?;
        Ok(entries)
    }

    async fn append(&self, session: &SessionId, entry: &HistoryEntry) -> Result<()> {
        self.ensure_dir().await?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(session))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn truncate(&self, session: &SessionId, keep: usize) -> Result<()> {
        let entries = self.load(session).await?;
        if entries.len() <= keep {
            return Ok(());
        }
        self.rewrite(session, &entries[..keep]).await
    }
}

impl FileBacking {
    /// Replace the session file with `entries` through a temporary sibling.
    async fn rewrite(&self, session: &SessionId, entries: &[HistoryEntry]) -> Result<()> {
        self.ensure_dir().await?;
        let path = self.session_path(session);
        let tmp = path.with_extension("jsonl.tmp");

        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let out: String = trimmed
        .chars()
        .map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_alphanumeric() || lower == '-' || lower == '_' {
                lower
            } else {
                '-'
            }
        })
        .collect();
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}
