//! Reading a whole stream
//!
//! [`StreamReader`] resolves the shards to read, starts each one from its
//! stored checkpoint, and drives one [`ShardCursor`] per shard in its own
//! task. Records go to a [`RecordSink`]; checkpoints go back to the
//! [`CheckpointStore`] after every batch.
//!
//! A failing shard never stops the others. Its last good checkpoint is
//! persisted, so a later run picks up exactly the shards that did not finish.

use async_trait::async_trait;
use aws_sdk_kinesis::types::Record;
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{debug, error, info, warn};

use crate::checkpoint::Checkpoint;
use crate::client::KinesisClientTrait;
use crate::cursor::ShardCursor;
use crate::error::{ReaderError, Result};
use crate::monitoring::{EventSink, MonitoringConfig, ReaderEvent};
use crate::retry::RetryConfig;
use crate::shard::{AdaptiveBatchSize, ShardClient, INITIAL_BATCH_SIZE};
use crate::store::CheckpointStore;

/// Destination for records read from the stream
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn write(&self, shard_id: &str, record: &Record) -> anyhow::Result<()>;

    /// Called after every batch, before its checkpoint is saved, and once
    /// more after every shard has finished
    async fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Configuration for a stream read
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Name of the Kinesis stream to read
    pub stream_name: String,
    /// Shards to read; empty reads every shard of the stream
    pub shard_ids: Vec<String>,
    /// Starting point for shards without a stored checkpoint
    pub since: Option<DateTime<Utc>>,
    /// Records that arrived after this instant are not read
    pub until: Option<DateTime<Utc>>,
    pub retry: RetryConfig,
    /// Maximum number of shards to read concurrently
    pub max_concurrent_shards: Option<u32>,
    /// Starting `GetRecords` limit, adjusted as the read goes
    pub initial_batch_size: u32,
    /// Keep polling open shards after catching up with the tip
    pub follow: bool,
    /// Wait after an empty batch while following
    pub poll_interval: Duration,
    pub monitoring: MonitoringConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            shard_ids: Vec::new(),
            since: None,
            until: None,
            retry: RetryConfig::default(),
            max_concurrent_shards: None,
            initial_batch_size: INITIAL_BATCH_SIZE,
            follow: false,
            poll_interval: Duration::from_secs(1),
            monitoring: MonitoringConfig::default(),
        }
    }
}

/// How one shard's read ended
#[derive(Debug)]
pub enum ShardOutcome {
    Completed {
        checkpoint: Checkpoint,
        records: u64,
    },
    Failed {
        /// Last good position; resuming from it re-reads nothing already emitted
        checkpoint: Checkpoint,
        records: u64,
        error: ReaderError,
    },
}

impl ShardOutcome {
    pub fn checkpoint(&self) -> &Checkpoint {
        match self {
            ShardOutcome::Completed { checkpoint, .. } | ShardOutcome::Failed { checkpoint, .. } => {
                checkpoint
            }
        }
    }

    pub fn records(&self) -> u64 {
        match self {
            ShardOutcome::Completed { records, .. } | ShardOutcome::Failed { records, .. } => *records,
        }
    }

    pub fn error(&self) -> Option<&ReaderError> {
        match self {
            ShardOutcome::Completed { .. } => None,
            ShardOutcome::Failed { error, .. } => Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error().is_some()
    }
}

/// Per-shard outcomes of one run
#[derive(Debug, Default)]
pub struct ReadSummary {
    pub shards: BTreeMap<String, ShardOutcome>,
}

impl ReadSummary {
    pub fn is_success(&self) -> bool {
        self.shards.values().all(|outcome| !outcome.is_failed())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ReaderError)> {
        self.shards
            .iter()
            .filter_map(|(shard_id, outcome)| outcome.error().map(|e| (shard_id.as_str(), e)))
    }

    pub fn total_records(&self) -> u64 {
        self.shards.values().map(ShardOutcome::records).sum()
    }

    pub fn checkpoint(&self, shard_id: &str) -> Option<&Checkpoint> {
        self.shards.get(shard_id).map(ShardOutcome::checkpoint)
    }
}

/// Reads the shards of one stream into a sink
pub struct StreamReader<C, S>
where
    C: KinesisClientTrait + 'static,
    S: CheckpointStore + 'static,
{
    config: ReaderConfig,
    client: Arc<C>,
    store: Arc<S>,
    batch_size: Arc<AdaptiveBatchSize>,
    events: EventSink,
}

impl<C, S> StreamReader<C, S>
where
    C: KinesisClientTrait + 'static,
    S: CheckpointStore + 'static,
{
    /// Returns the reader and, when monitoring is enabled, the event receiver
    pub fn new(
        config: ReaderConfig,
        client: C,
        store: S,
    ) -> (Self, Option<mpsc::Receiver<ReaderEvent>>) {
        let (events, monitoring_rx) = EventSink::from_config(&config.monitoring);
        let batch_size = Arc::new(AdaptiveBatchSize::new(config.initial_batch_size));

        (
            Self {
                config,
                client: Arc::new(client),
                store: Arc::new(store),
                batch_size,
                events,
            },
            monitoring_rx,
        )
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// `GetRecords` limit shared by every shard of this reader
    pub fn batch_size(&self) -> &Arc<AdaptiveBatchSize> {
        &self.batch_size
    }

    pub fn shard_client(&self, shard_id: &str) -> ShardClient<C> {
        ShardClient::new(
            self.client.clone(),
            self.config.stream_name.as_str(),
            shard_id,
            self.batch_size.clone(),
            self.config.retry.clone(),
        )
        .with_events(self.events.clone())
    }

    /// The configured shards, or every shard of the stream
    pub async fn resolve_shards(&self) -> Result<Vec<String>> {
        let shard_ids = if self.config.shard_ids.is_empty() {
            self.client
                .list_shards(&self.config.stream_name)
                .await?
                .iter()
                .map(|shard| shard.shard_id().to_string())
                .collect()
        } else {
            self.config.shard_ids.clone()
        };

        if shard_ids.is_empty() {
            return Err(ReaderError::Caller(format!(
                "No shards to read for stream {}",
                self.config.stream_name
            )));
        }
        Ok(shard_ids)
    }

    /// Starting checkpoint per shard: the stored one, else `since`, else the trim horizon
    async fn starting_checkpoints(&self, shard_ids: &[String]) -> Result<HashMap<String, Checkpoint>> {
        let stored = self
            .store
            .load_all(&self.config.stream_name)
            .await
            .map_err(|e| ReaderError::Checkpoint(format!("Failed to load checkpoints: {:#}", e)))?;

        Ok(shard_ids
            .iter()
            .map(|shard_id| {
                let start = match stored.get(shard_id) {
                    Some(checkpoint) => {
                        debug!(shard_id = %shard_id, checkpoint = ?checkpoint, "Resuming from stored checkpoint");
                        checkpoint.clone()
                    }
                    None => self
                        .config
                        .since
                        .map(Checkpoint::at_timestamp)
                        .unwrap_or_default(),
                };
                (shard_id.clone(), start)
            })
            .collect())
    }

    /// Read every resolved shard until it is exhausted, caught up, past the
    /// cutoff, failed, or `shutdown` turns true
    pub async fn run<K: RecordSink + 'static>(
        &self,
        sink: Arc<K>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ReadSummary> {
        info!(stream = %self.config.stream_name, "Starting stream read");

        let shard_ids = self.resolve_shards().await?;
        let starts = self.starting_checkpoints(&shard_ids).await?;

        let semaphore = self
            .config
            .max_concurrent_shards
            .map(|limit| Arc::new(Semaphore::new(limit.max(1) as usize)));

        let mut handles = Vec::with_capacity(shard_ids.len());
        for shard_id in &shard_ids {
            let start = starts.get(shard_id).cloned().unwrap_or_default();
            let task = ShardTask {
                client: self.shard_client(shard_id),
                store: self.store.clone(),
                sink: sink.clone(),
                start,
                until: self.config.until,
                follow: self.config.follow,
                poll_interval: self.config.poll_interval,
                events: self.events.clone(),
            };
            let semaphore = semaphore.clone();
            let shutdown = shutdown.clone();

            let handle = tokio::spawn(task.run(semaphore, shutdown));
            handles.push((shard_id.clone(), handle));
        }

        let results = futures::future::join_all(
            handles
                .into_iter()
                .map(|(shard_id, handle)| async move { (shard_id, handle.await) }),
        )
        .await;

        let mut summary = ReadSummary::default();
        for (shard_id, result) in results {
            let outcome = result.unwrap_or_else(|join_error| {
                error!(shard_id = %shard_id, error = %join_error, "Shard task panicked");
                ShardOutcome::Failed {
                    checkpoint: starts.get(&shard_id).cloned().unwrap_or_default(),
                    records: 0,
                    error: join_error.into(),
                }
            });
            summary.shards.insert(shard_id, outcome);
        }

        sink.flush()
            .await
            .map_err(|e| ReaderError::Output(format!("{:#}", e)))?;

        info!(
            stream = %self.config.stream_name,
            shards = summary.shards.len(),
            failed = summary.failed().count(),
            records = summary.total_records(),
            "Stream read finished"
        );
        Ok(summary)
    }
}

/// Everything one shard's task owns
struct ShardTask<C: KinesisClientTrait, S, K> {
    client: ShardClient<C>,
    store: Arc<S>,
    sink: Arc<K>,
    start: Checkpoint,
    until: Option<DateTime<Utc>>,
    follow: bool,
    poll_interval: Duration,
    events: EventSink,
}

impl<C, S, K> ShardTask<C, S, K>
where
    C: KinesisClientTrait + 'static,
    S: CheckpointStore + 'static,
    K: RecordSink + 'static,
{
    async fn run(
        self,
        semaphore: Option<Arc<Semaphore>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ShardOutcome {
        let _permit = match semaphore {
            Some(semaphore) => match semaphore.acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => return self.finish(self.start.clone(), 0, Err(e.into())).await,
            },
            None => None,
        };

        let mut checkpoint = self.start.clone();
        let mut records = 0;
        let result = self
            .read(&mut checkpoint, &mut records, &mut shutdown)
            .await;
        self.finish(checkpoint, records, result).await
    }

    fn shard_id(&self) -> &str {
        self.client.shard_id()
    }

    fn past_cutoff(&self, record: &Record) -> bool {
        let Some(until) = self.until else {
            return false;
        };
        record
            .approximate_arrival_timestamp()
            .and_then(|ts| ts.to_chrono_utc().ok())
            .is_some_and(|arrival| arrival > until)
    }

    /// Push written records out before a checkpoint can move past them
    async fn flush_sink(&self) -> Result<()> {
        self.sink
            .flush()
            .await
            .map_err(|e| ReaderError::Output(format!("{:#}", e)))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.store
            .save(self.client.stream_name(), self.shard_id(), checkpoint)
            .await
            .map_err(|e| ReaderError::Checkpoint(format!("{:#}", e)))
    }

    async fn read(
        &self,
        checkpoint: &mut Checkpoint,
        records: &mut u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let mut cursor = Some(ShardCursor::new(self.client.clone(), Some(checkpoint.clone())));

        while let Some(current) = cursor.take() {
            if *shutdown.borrow() {
                info!(shard_id = %self.shard_id(), "Shutdown requested, stopping shard");
                return Ok(());
            }

            let batch = current.advance().await?;

            let mut last_emitted: Option<&str> = None;
            let mut cut_off = false;
            for record in &batch.records {
                if self.past_cutoff(record) {
                    cut_off = true;
                    break;
                }
                if let Err(e) = self.sink.write(self.shard_id(), record).await {
                    if last_emitted.is_some() && self.flush_sink().await.is_ok() {
                        *checkpoint = checkpoint.advanced(None, last_emitted);
                    }
                    return Err(ReaderError::Output(format!("{:#}", e)));
                }
                last_emitted = Some(record.sequence_number());
                *records += 1;
            }

            self.flush_sink().await?;

            if cut_off {
                *checkpoint = checkpoint.advanced(None, last_emitted);
                self.save(checkpoint).await?;
                info!(shard_id = %self.shard_id(), until = ?self.until, "Reached cutoff");
                return Ok(());
            }

            *checkpoint = batch.checkpoint.clone();
            self.save(checkpoint).await?;

            let caught_up = batch.millis_behind_latest == 0;
            if caught_up && (!self.follow || self.until.is_some_and(|until| Utc::now() >= until)) {
                debug!(shard_id = %self.shard_id(), "Caught up with the tip");
                return Ok(());
            }

            let Some(next) = batch.next else {
                debug!(shard_id = %self.shard_id(), "Shard exhausted");
                return Ok(());
            };

            if batch.records.is_empty() && self.follow {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            tokio::time::sleep(self.poll_interval).await;
                        }
                    }
                }
            }
            cursor = Some(next);
        }

        Ok(())
    }

    async fn finish(&self, checkpoint: Checkpoint, records: u64, result: Result<()>) -> ShardOutcome {
        match result {
            Ok(()) => {
                info!(shard_id = %self.shard_id(), records, "Shard read complete");
                self.events.send(ReaderEvent::shard_completed(self.shard_id()));
                ShardOutcome::Completed { checkpoint, records }
            }
            Err(error) => {
                error!(shard_id = %self.shard_id(), records, error = %error, "Shard read failed");
                if let Err(e) = self.save(&checkpoint).await {
                    warn!(shard_id = %self.shard_id(), error = %e, "Failed to persist last good checkpoint");
                }
                self.events
                    .send(ReaderEvent::shard_failed(self.shard_id(), error.to_string()));
                ShardOutcome::Failed {
                    checkpoint,
                    records,
                    error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCheckpointStore;
    use crate::test::mocks::{MockKinesisClient, MockRecordSink};
    use crate::test::TestUtils;
    use pretty_assertions::assert_eq;

    fn config() -> ReaderConfig {
        ReaderConfig {
            stream_name: "test-stream".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_shards_is_a_caller_error() {
        let client = MockKinesisClient::new();
        client.mock_list_shards(Ok(vec![])).await;

        let (reader, _) = StreamReader::new(config(), client, InMemoryCheckpointStore::new());
        let (_tx, rx) = watch::channel(false);
        let result = reader.run(Arc::new(MockRecordSink::new()), rx).await;

        assert!(matches!(result, Err(ReaderError::Caller(_))));
    }

    #[tokio::test]
    async fn test_explicit_shards_skip_listing() -> anyhow::Result<()> {
        let client = MockKinesisClient::new();
        let (reader, _) = StreamReader::new(
            ReaderConfig {
                shard_ids: vec!["shard-7".to_string()],
                ..config()
            },
            client.clone(),
            InMemoryCheckpointStore::new(),
        );

        assert_eq!(reader.resolve_shards().await?, vec!["shard-7".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_since_applies_only_without_stored_checkpoint() -> anyhow::Result<()> {
        let since = TestUtils::timestamp(1_700_000_000);
        let store = InMemoryCheckpointStore::new();
        store
            .save("test-stream", "shard-1", &Checkpoint::after_sequence_number("41"))
            .await?;

        let (reader, _) = StreamReader::new(
            ReaderConfig {
                since: Some(since),
                ..config()
            },
            MockKinesisClient::new(),
            store,
        );
        let starts = reader
            .starting_checkpoints(&["shard-1".to_string(), "shard-2".to_string()])
            .await?;

        assert_eq!(starts["shard-1"], Checkpoint::after_sequence_number("41"));
        assert_eq!(starts["shard-2"], Checkpoint::at_timestamp(since));
        Ok(())
    }

    #[tokio::test]
    async fn test_stops_at_tip_unless_following() -> anyhow::Result<()> {
        let client = MockKinesisClient::new();
        client
            .mock_list_shards(Ok(vec![TestUtils::create_test_shard("shard-1")]))
            .await;
        client
            .mock_get_records(Ok(TestUtils::page(2, Some("shard-1/next"), 0)))
            .await;

        let sink = Arc::new(MockRecordSink::new());
        let (reader, _) = StreamReader::new(config(), client.clone(), InMemoryCheckpointStore::new());
        let (_tx, rx) = watch::channel(false);
        let summary = reader.run(sink.clone(), rx).await?;

        assert!(summary.is_success());
        assert_eq!(summary.total_records(), 2);
        assert_eq!(client.get_records_count().await, 1);
        // once for the batch, once at the end of the run
        assert_eq!(sink.flush_count(), 2);
        Ok(())
    }
}
