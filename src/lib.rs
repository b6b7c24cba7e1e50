//! Kinesis Reader - resumable, self-tuning reads of AWS Kinesis shards
//!
//! The crate is layered bottom-up:
//!
//! - [`retry`]: a bounded retry executor with exponential backoff and jitter
//! - [`shard`]: a per-shard client that renews expired iterators and adapts
//!   the `GetRecords` batch size to throttling
//! - [`cursor`]: batch-at-a-time iteration that yields a resumable
//!   [`Checkpoint`] with every batch
//! - [`reader`]: reads whole streams into a [`RecordSink`], persisting
//!   checkpoints through a [`CheckpointStore`]

pub mod checkpoint;
pub mod client;
pub mod cursor;
pub mod error;
pub mod monitoring;
pub mod output;
pub mod reader;
pub mod retry;
pub mod shard;
pub mod store;
pub mod timestamp;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
#[cfg(test)]
mod tests;

pub use checkpoint::Checkpoint;
pub use client::{IteratorStatus, KinesisClientError, KinesisClientTrait, RecordsPage};
pub use cursor::{start_reading, BatchResult, ShardCursor};
pub use error::{ReaderError, Result};
pub use output::{format_payload, OutputFormat, WriterSink};
pub use reader::{ReadSummary, ReaderConfig, RecordSink, ShardOutcome, StreamReader};
pub use retry::{Backoff, ExponentialBackoff, RetryConfig, RetryError, RetryExecutor, Retryable};
pub use shard::{AdaptiveBatchSize, ShardClient};
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, WriteMode};
pub use timestamp::parse_timestamp;
