//! Checkpoints persisted as JSON lines
//!
//! Each line is one [`CheckpointEntry`]. When a shard appears on several
//! lines the last one wins, so appending is always a valid update. Lines
//! that fail to parse are skipped with a warning.

use crate::checkpoint::Checkpoint;
use crate::store::CheckpointStore;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How saves are written to the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Add a line per save
    #[default]
    Append,
    /// Rewrite the file with one line per shard
    Replace,
}

/// One line of the checkpoint file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointEntry {
    pub stream_name: String,
    pub shard_id: String,
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    mode: WriteMode,
    // serializes writers within this process
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            path: path.into(),
            mode,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Every parseable entry in file order; a missing file has none
    async fn read_entries(&self) -> anyhow::Result<Vec<CheckpointEntry>> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Checkpoint file does not exist yet");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read checkpoint file {}", self.path.display())
                })
            }
        };

        let mut entries = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CheckpointEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed checkpoint line"
                ),
            }
        }
        Ok(entries)
    }

    /// Latest entry per shard of `stream_name`
    async fn latest(&self, stream_name: &str) -> anyhow::Result<HashMap<String, Checkpoint>> {
        Ok(self
            .read_entries()
            .await?
            .into_iter()
            .filter(|entry| entry.stream_name == stream_name)
            .map(|entry| (entry.shard_id, entry.checkpoint))
            .collect())
    }

    async fn append(&self, entry: &CheckpointEntry) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open checkpoint file {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Rewrite the file keeping one line per shard, via a temporary file
    async fn replace(&self, entry: CheckpointEntry) -> anyhow::Result<()> {
        let mut entries: Vec<CheckpointEntry> = Vec::new();
        for existing in self.read_entries().await? {
            match entries
                .iter_mut()
                .find(|e| e.stream_name == existing.stream_name && e.shard_id == existing.shard_id)
            {
                Some(slot) => *slot = existing,
                None => entries.push(existing),
            }
        }
        match entries
            .iter_mut()
            .find(|e| e.stream_name == entry.stream_name && e.shard_id == entry.shard_id)
        {
            Some(slot) => *slot = entry,
            None => entries.push(entry),
        }

        let mut contents = String::new();
        for entry in &entries {
            contents.push_str(&serde_json::to_string(entry)?);
            contents.push('\n');
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, stream_name: &str, shard_id: &str) -> anyhow::Result<Option<Checkpoint>> {
        Ok(self.latest(stream_name).await?.remove(shard_id))
    }

    async fn load_all(&self, stream_name: &str) -> anyhow::Result<HashMap<String, Checkpoint>> {
        let checkpoints = self.latest(stream_name).await?;
        debug!(
            path = %self.path.display(),
            stream = %stream_name,
            shards = checkpoints.len(),
            "Loaded checkpoints"
        );
        Ok(checkpoints)
    }

    async fn save(
        &self,
        stream_name: &str,
        shard_id: &str,
        checkpoint: &Checkpoint,
    ) -> anyhow::Result<()> {
        let entry = CheckpointEntry {
            stream_name: stream_name.to_string(),
            shard_id: shard_id.to_string(),
            checkpoint: checkpoint.clone(),
            written_at: Utc::now(),
        };

        let _guard = self.write_lock.lock().await;
        match self.mode {
            WriteMode::Append => self.append(&entry).await?,
            WriteMode::Replace => self.replace(entry).await?,
        }

        debug!(
            path = %self.path.display(),
            shard_id = %shard_id,
            mode = ?self.mode,
            last_sequence = ?checkpoint.last_read_sequence_number,
            "Saved checkpoint"
        );
        Ok(())
    }
}
