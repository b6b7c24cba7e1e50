use crate::checkpoint::Checkpoint;
use crate::store::CheckpointStore;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

type ShardKey = (String, String);

/// In-memory implementation of checkpoint storage
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<ShardKey, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        debug!("Initializing in-memory checkpoint store");
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    #[instrument(skip(self))]
    async fn load(&self, stream_name: &str, shard_id: &str) -> anyhow::Result<Option<Checkpoint>> {
        let checkpoint = self
            .checkpoints
            .read()
            .await
            .get(&(stream_name.to_string(), shard_id.to_string()))
            .cloned();

        trace!(checkpoint = ?checkpoint, "Retrieved checkpoint from memory");
        Ok(checkpoint)
    }

    async fn load_all(&self, stream_name: &str) -> anyhow::Result<HashMap<String, Checkpoint>> {
        Ok(self
            .checkpoints
            .read()
            .await
            .iter()
            .filter(|((stream, _), _)| stream == stream_name)
            .map(|((_, shard), checkpoint)| (shard.clone(), checkpoint.clone()))
            .collect())
    }

    #[instrument(skip(self, checkpoint))]
    async fn save(
        &self,
        stream_name: &str,
        shard_id: &str,
        checkpoint: &Checkpoint,
    ) -> anyhow::Result<()> {
        debug!(
            last_sequence = ?checkpoint.last_read_sequence_number,
            "Saving checkpoint to memory"
        );

        self.checkpoints
            .write()
            .await
            .insert((stream_name.to_string(), shard_id.to_string()), checkpoint.clone());

        Ok(())
    }
}
