use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::trace;

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
        }
    }
}

/// A monitoring event from a shard read
#[derive(Debug, Clone)]
pub struct ReaderEvent {
    /// When the event occurred
    pub timestamp: SystemTime,
    /// ID of the shard this event relates to
    pub shard_id: String,
    /// The type of event and its details
    pub event_type: ReaderEventType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEventType {
    BatchFetched {
        records: usize,
        batch_size: u32,
        millis_behind_latest: i64,
    },
    Throttled {
        used_batch_size: u32,
        new_batch_size: u32,
    },
    IteratorRenewed,
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        error: String,
    },
    ShardCompleted,
    ShardFailed {
        error: String,
    },
}

impl ReaderEvent {
    pub fn new(shard_id: impl Into<String>, event_type: ReaderEventType) -> Self {
        Self {
            timestamp: SystemTime::now(),
            shard_id: shard_id.into(),
            event_type,
        }
    }

    pub fn batch_fetched(
        shard_id: impl Into<String>,
        records: usize,
        batch_size: u32,
        millis_behind_latest: i64,
    ) -> Self {
        Self::new(
            shard_id,
            ReaderEventType::BatchFetched {
                records,
                batch_size,
                millis_behind_latest,
            },
        )
    }

    pub fn throttled(shard_id: impl Into<String>, used_batch_size: u32, new_batch_size: u32) -> Self {
        Self::new(
            shard_id,
            ReaderEventType::Throttled {
                used_batch_size,
                new_batch_size,
            },
        )
    }

    pub fn iterator_renewed(shard_id: impl Into<String>) -> Self {
        Self::new(shard_id, ReaderEventType::IteratorRenewed)
    }

    pub fn retry_scheduled(
        shard_id: impl Into<String>,
        attempt: u32,
        delay: Duration,
        error: String,
    ) -> Self {
        Self::new(
            shard_id,
            ReaderEventType::RetryScheduled {
                attempt,
                delay,
                error,
            },
        )
    }

    pub fn shard_completed(shard_id: impl Into<String>) -> Self {
        Self::new(shard_id, ReaderEventType::ShardCompleted)
    }

    pub fn shard_failed(shard_id: impl Into<String>, error: String) -> Self {
        Self::new(shard_id, ReaderEventType::ShardFailed { error })
    }
}

/// Non-blocking handle for publishing events
///
/// A full or closed channel drops the event; reads never wait on monitoring.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ReaderEvent>>,
}

impl EventSink {
    pub fn new(tx: Option<mpsc::Sender<ReaderEvent>>) -> Self {
        Self { tx }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Build a sink and its receiver according to `config`
    pub fn from_config(config: &MonitoringConfig) -> (Self, Option<mpsc::Receiver<ReaderEvent>>) {
        if config.enabled {
            let (tx, rx) = mpsc::channel(config.channel_size.max(1));
            (Self::new(Some(tx)), Some(rx))
        } else {
            (Self::disabled(), None)
        }
    }

    pub fn send(&self, event: ReaderEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                trace!(error = %e, "Dropped monitoring event");
            }
        }
    }
}
