//! Reads against a single shard
//!
//! [`ShardClient`] owns one shard's identity and layers shard-specific
//! recovery on top of the generic [`RetryExecutor`]:
//!
//! - throttling shrinks the shared [`AdaptiveBatchSize`] and goes through the
//!   normal backoff cycle
//! - an expired iterator leaves the retry loop without spending budget; the
//!   iterator is re-derived from the last known sequence number and the fetch
//!   starts over
//! - every successful page grows the shared batch size

mod batch_size;

pub use batch_size::{AdaptiveBatchSize, INITIAL_BATCH_SIZE, MAX_BATCH_SIZE, MIN_BATCH_SIZE};

use aws_sdk_kinesis::types::ShardIteratorType;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::checkpoint::Checkpoint;
use crate::client::{IteratorStatus, KinesisClientError, KinesisClientTrait, RecordsPage};
use crate::error::Result;
use crate::monitoring::{EventSink, ReaderEvent};
use crate::retry::{RetryConfig, RetryExecutor};

/// Consecutive renewals within one fetch after which a warning is logged
const RENEWAL_WARNING_INTERVAL: u32 = 10;

/// Result of one `GetRecords` attempt as seen by the retry loop
enum FetchAttempt {
    Fetched(RecordsPage),
    /// Leaves the retry loop without counting as a failure
    IteratorExpired,
}

/// Client bound to one shard of one stream
pub struct ShardClient<C: KinesisClientTrait> {
    client: Arc<C>,
    stream_name: String,
    shard_id: String,
    batch_size: Arc<AdaptiveBatchSize>,
    retry: RetryExecutor,
    events: EventSink,
}

impl<C: KinesisClientTrait> Clone for ShardClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            stream_name: self.stream_name.clone(),
            shard_id: self.shard_id.clone(),
            batch_size: self.batch_size.clone(),
            retry: self.retry.clone(),
            events: self.events.clone(),
        }
    }
}

impl<C: KinesisClientTrait> ShardClient<C> {
    pub fn new(
        client: Arc<C>,
        stream_name: impl Into<String>,
        shard_id: impl Into<String>,
        batch_size: Arc<AdaptiveBatchSize>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            stream_name: stream_name.into(),
            shard_id: shard_id.into(),
            batch_size,
            retry: RetryExecutor::new(retry),
            events: EventSink::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn batch_size(&self) -> &Arc<AdaptiveBatchSize> {
        &self.batch_size
    }

    fn on_retry(&self) -> impl FnMut(u32, Duration, &KinesisClientError) + '_ {
        move |attempt: u32, delay: Duration, error: &KinesisClientError| {
            self.events.send(ReaderEvent::retry_scheduled(
                self.shard_id.as_str(),
                attempt,
                delay,
                error.to_string(),
            ));
        }
    }

    /// Request a fresh shard iterator, retrying per the configured policy
    pub async fn request_iterator(
        &self,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<String> {
        debug!(
            shard_id = %self.shard_id,
            iterator_type = ?iterator_type,
            sequence_number = ?sequence_number,
            timestamp = ?timestamp,
            "Requesting shard iterator"
        );

        let client = &self.client;
        let stream_name = self.stream_name.as_str();
        let shard_id = self.shard_id.as_str();
        let timestamp = timestamp.as_ref();

        let iterator = self
            .retry
            .execute_observed(
                || {
                    client.get_shard_iterator(
                        stream_name,
                        shard_id,
                        iterator_type.clone(),
                        sequence_number,
                        timestamp,
                    )
                },
                self.on_retry(),
            )
            .await?;

        Ok(iterator)
    }

    /// Iterator to continue from `checkpoint`
    ///
    /// Resolution order: the checkpoint's own iterator, then right after its
    /// last read sequence number, then its timestamp, then the trim horizon.
    pub async fn iterator_from_checkpoint(&self, checkpoint: &Checkpoint) -> Result<String> {
        if let Some(token) = &checkpoint.position_token {
            trace!(shard_id = %self.shard_id, "Reusing iterator from checkpoint");
            return Ok(token.clone());
        }

        if let Some(sequence) = &checkpoint.last_read_sequence_number {
            return self
                .request_iterator(
                    ShardIteratorType::AfterSequenceNumber,
                    Some(sequence.as_str()),
                    None,
                )
                .await;
        }

        if let Some(timestamp) = checkpoint.timestamp {
            return self
                .request_iterator(ShardIteratorType::AtTimestamp, None, Some(timestamp))
                .await;
        }

        self.request_iterator(ShardIteratorType::TrimHorizon, None, None)
            .await
    }

    /// One `GetRecords` call at the current adaptive batch size
    async fn fetch_attempt(&self, iterator: &str) -> std::result::Result<FetchAttempt, KinesisClientError> {
        let used = self.batch_size.current();

        match self.client.get_records(iterator, used as i32).await {
            Ok(page) => {
                let next = self.batch_size.grow(used);
                trace!(
                    shard_id = %self.shard_id,
                    records = page.records.len(),
                    used_batch_size = used,
                    next_batch_size = next,
                    millis_behind_latest = page.millis_behind_latest,
                    "Fetched records"
                );
                self.events.send(ReaderEvent::batch_fetched(
                    self.shard_id.as_str(),
                    page.records.len(),
                    used,
                    page.millis_behind_latest,
                ));
                Ok(FetchAttempt::Fetched(page))
            }
            Err(KinesisClientError::ExpiredIterator) => Ok(FetchAttempt::IteratorExpired),
            Err(KinesisClientError::ThroughputExceeded) => {
                let next = self.batch_size.shrink(used);
                debug!(
                    shard_id = %self.shard_id,
                    used_batch_size = used,
                    next_batch_size = next,
                    "Throughput exceeded, reducing batch size"
                );
                self.events
                    .send(ReaderEvent::throttled(self.shard_id.as_str(), used, next));
                Err(KinesisClientError::ThroughputExceeded)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch one page of records starting at `iterator`
    ///
    /// `resume_from` is the checkpoint the iterator was derived from. If the
    /// iterator expires, a replacement is derived from that checkpoint with
    /// its iterator removed, so the read resumes right after the last record
    /// already consumed.
    pub async fn fetch_one_batch(
        &self,
        iterator: String,
        resume_from: &Checkpoint,
    ) -> Result<RecordsPage> {
        let resume_from = resume_from.without_position_token();
        let mut iterator = iterator;
        let mut renewals: u32 = 0;

        loop {
            let attempt = self
                .retry
                .execute_observed(|| self.fetch_attempt(&iterator), self.on_retry())
                .await?;

            match attempt {
                FetchAttempt::Fetched(page) => return Ok(page),
                FetchAttempt::IteratorExpired => {
                    renewals += 1;
                    if renewals % RENEWAL_WARNING_INTERVAL == 0 {
                        warn!(
                            shard_id = %self.shard_id,
                            renewals,
                            last_sequence = ?resume_from.last_read_sequence_number,
                            "Renewed iterators keep expiring before use"
                        );
                    } else {
                        info!(
                            shard_id = %self.shard_id,
                            renewals,
                            last_sequence = ?resume_from.last_read_sequence_number,
                            "Iterator expired, renewing"
                        );
                    }
                    self.events
                        .send(ReaderEvent::iterator_renewed(self.shard_id.as_str()));
                    iterator = self.iterator_from_checkpoint(&resume_from).await?;
                }
            }
        }
    }

    /// Report whether the iterator for `checkpoint` is usable and how far behind it is
    pub async fn check_iterator(&self, checkpoint: &Checkpoint) -> Result<IteratorStatus> {
        let iterator = self.iterator_from_checkpoint(checkpoint).await?;
        let status = self.client.check_iterator(&iterator).await?;
        info!(shard_id = %self.shard_id, status = ?status, "Checked iterator");
        Ok(status)
    }
}
