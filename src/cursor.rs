//! Batch-at-a-time iteration over a shard
//!
//! A [`ShardCursor`] is a value: advancing consumes it and yields the batch
//! plus, unless the shard is exhausted, the cursor for the next batch. The
//! checkpoint carried by every [`BatchResult`] is enough to resume the read
//! in a later run.

use aws_sdk_kinesis::types::Record;
use tracing::debug;

use crate::checkpoint::Checkpoint;
use crate::client::KinesisClientTrait;
use crate::error::Result;
use crate::shard::ShardClient;

/// Position within one shard from which the next batch will be read
pub struct ShardCursor<C: KinesisClientTrait> {
    client: ShardClient<C>,
    checkpoint: Checkpoint,
}

/// One batch and how to continue after it
pub struct BatchResult<C: KinesisClientTrait> {
    pub records: Vec<Record>,
    /// Position after this batch; resuming from it yields the next batch
    pub checkpoint: Checkpoint,
    pub millis_behind_latest: i64,
    /// `None` once the shard is exhausted
    pub next: Option<ShardCursor<C>>,
}

impl<C: KinesisClientTrait> BatchResult<C> {
    pub fn is_exhausted(&self) -> bool {
        self.next.is_none()
    }
}

impl<C: KinesisClientTrait> std::fmt::Debug for BatchResult<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchResult")
            .field("records", &self.records.len())
            .field("checkpoint", &self.checkpoint)
            .field("millis_behind_latest", &self.millis_behind_latest)
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

/// Read the first batch of a shard, from its start or from `checkpoint`
pub async fn start_reading<C: KinesisClientTrait>(
    client: ShardClient<C>,
    checkpoint: Option<Checkpoint>,
) -> Result<BatchResult<C>> {
    ShardCursor::new(client, checkpoint).advance().await
}

impl<C: KinesisClientTrait> ShardCursor<C> {
    pub fn new(client: ShardClient<C>, checkpoint: Option<Checkpoint>) -> Self {
        Self {
            client,
            checkpoint: checkpoint.unwrap_or_default(),
        }
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn shard_id(&self) -> &str {
        self.client.shard_id()
    }

    /// Fetch the next batch
    ///
    /// A shard counts as exhausted only when the service reports zero lag
    /// and no next iterator. An empty batch on its own never ends the read.
    pub async fn advance(self) -> Result<BatchResult<C>> {
        let iterator = self.client.iterator_from_checkpoint(&self.checkpoint).await?;
        let page = self.client.fetch_one_batch(iterator, &self.checkpoint).await?;

        let last_sequence = page.records.last().map(|r| r.sequence_number());
        let checkpoint = self
            .checkpoint
            .advanced(page.next_iterator.clone(), last_sequence);
        let exhausted = page.millis_behind_latest == 0 && page.next_iterator.is_none();

        debug!(
            shard_id = %self.client.shard_id(),
            records = page.records.len(),
            millis_behind_latest = page.millis_behind_latest,
            last_sequence = ?checkpoint.last_read_sequence_number,
            exhausted,
            "Advanced cursor"
        );

        let next = if exhausted {
            None
        } else {
            Some(ShardCursor {
                client: self.client,
                checkpoint: checkpoint.clone(),
            })
        };

        Ok(BatchResult {
            records: page.records,
            checkpoint,
            millis_behind_latest: page.millis_behind_latest,
            next,
        })
    }
}
