//! Checkpoint storage for shard reads

use async_trait::async_trait;
use std::collections::HashMap;

use crate::checkpoint::Checkpoint;

pub mod file;
pub mod memory;

/// Trait for checkpoint storage implementations
///
/// Checkpoints are keyed by stream name and shard ID.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Retrieve the checkpoint for a given shard
    async fn load(&self, stream_name: &str, shard_id: &str) -> anyhow::Result<Option<Checkpoint>>;

    /// Every stored checkpoint for a stream, keyed by shard ID
    async fn load_all(&self, stream_name: &str) -> anyhow::Result<HashMap<String, Checkpoint>>;

    /// Save a checkpoint for a given shard
    async fn save(
        &self,
        stream_name: &str,
        shard_id: &str,
        checkpoint: &Checkpoint,
    ) -> anyhow::Result<()>;
}

pub use file::{CheckpointEntry, FileCheckpointStore, WriteMode};
pub use memory::InMemoryCheckpointStore;
