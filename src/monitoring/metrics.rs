use super::types::{ReaderEvent, ReaderEventType};
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Aggregated counters for a single shard
#[derive(Debug, Clone)]
pub struct ShardMetrics {
    pub records_read: u64,
    pub batches_fetched: u64,
    pub throttles: u64,
    pub iterator_renewals: u64,
    pub retries: u64,
    pub max_millis_behind_latest: i64,
    pub last_batch_size: u32,
    pub completed: bool,
    pub failed: bool,
    pub first_seen: Instant,
    pub last_updated: Instant,
}

impl Default for ShardMetrics {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            records_read: 0,
            batches_fetched: 0,
            throttles: 0,
            iterator_renewals: 0,
            retries: 0,
            max_millis_behind_latest: 0,
            last_batch_size: 0,
            completed: false,
            failed: false,
            first_seen: now,
            last_updated: now,
        }
    }
}

/// Folds monitoring events into per-shard metrics
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: BTreeMap<String, ShardMetrics>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume events until every sender is dropped, then return the totals
    pub async fn run(mut self, mut monitoring_rx: mpsc::Receiver<ReaderEvent>) -> Self {
        while let Some(event) = monitoring_rx.recv().await {
            self.process_event(event);
        }
        self
    }

    pub fn process_event(&mut self, event: ReaderEvent) {
        let shard_metrics = self.metrics.entry(event.shard_id.clone()).or_default();
        shard_metrics.last_updated = Instant::now();

        match event.event_type {
            ReaderEventType::BatchFetched {
                records,
                batch_size,
                millis_behind_latest,
            } => {
                shard_metrics.batches_fetched += 1;
                shard_metrics.records_read += records as u64;
                shard_metrics.last_batch_size = batch_size;
                shard_metrics.max_millis_behind_latest =
                    shard_metrics.max_millis_behind_latest.max(millis_behind_latest);
            }
            ReaderEventType::Throttled {
                used_batch_size,
                new_batch_size,
            } => {
                shard_metrics.throttles += 1;
                shard_metrics.last_batch_size = new_batch_size;
                debug!(
                    shard_id = %event.shard_id,
                    used_batch_size,
                    new_batch_size,
                    "Throughput exceeded"
                );
            }
            ReaderEventType::IteratorRenewed => {
                shard_metrics.iterator_renewals += 1;
            }
            ReaderEventType::RetryScheduled { .. } => {
                shard_metrics.retries += 1;
            }
            ReaderEventType::ShardCompleted => {
                shard_metrics.completed = true;
            }
            ReaderEventType::ShardFailed { error } => {
                shard_metrics.failed = true;
                warn!(shard_id = %event.shard_id, error = %error, "Shard read failed");
            }
        }
    }

    pub fn shard(&self, shard_id: &str) -> Option<&ShardMetrics> {
        self.metrics.get(shard_id)
    }

    pub fn shards(&self) -> impl Iterator<Item = (&String, &ShardMetrics)> {
        self.metrics.iter()
    }

    pub fn total_records(&self) -> u64 {
        self.metrics.values().map(|m| m.records_read).sum()
    }

    /// Log one line per shard
    pub fn emit_metrics(&self) {
        for (shard_id, m) in &self.metrics {
            info!(
                shard_id = %shard_id,
                records = m.records_read,
                batches = m.batches_fetched,
                throttles = m.throttles,
                iterator_renewals = m.iterator_renewals,
                retries = m.retries,
                max_millis_behind_latest = m.max_millis_behind_latest,
                last_batch_size = m.last_batch_size,
                completed = m.completed,
                failed = m.failed,
                elapsed_ms = ?m.last_updated.duration_since(m.first_seen).as_millis(),
                "Shard read metrics"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_aggregates_until_senders_drop() {
        let (tx, rx) = mpsc::channel(16);
        tx.send(ReaderEvent::batch_fetched("shard-1", 3, 2500, 1000))
            .await
            .unwrap();
        tx.send(ReaderEvent::throttled("shard-1", 3750, 1875))
            .await
            .unwrap();
        tx.send(ReaderEvent::retry_scheduled(
            "shard-1",
            1,
            Duration::from_millis(12),
            "Provisioned throughput exceeded".into(),
        ))
        .await
        .unwrap();
        tx.send(ReaderEvent::batch_fetched("shard-1", 2, 1875, 0))
            .await
            .unwrap();
        tx.send(ReaderEvent::iterator_renewed("shard-2")).await.unwrap();
        tx.send(ReaderEvent::shard_completed("shard-1")).await.unwrap();
        tx.send(ReaderEvent::shard_failed("shard-2", "boom".into()))
            .await
            .unwrap();
        drop(tx);

        let aggregator = MetricsAggregator::new().run(rx).await;

        let shard1 = aggregator.shard("shard-1").expect("shard-1 metrics");
        assert_eq!(shard1.records_read, 5);
        assert_eq!(shard1.batches_fetched, 2);
        assert_eq!(shard1.throttles, 1);
        assert_eq!(shard1.retries, 1);
        assert_eq!(shard1.max_millis_behind_latest, 1000);
        assert_eq!(shard1.last_batch_size, 1875);
        assert!(shard1.completed);

        let shard2 = aggregator.shard("shard-2").expect("shard-2 metrics");
        assert_eq!(shard2.iterator_renewals, 1);
        assert!(shard2.failed);

        assert_eq!(aggregator.total_records(), 5);
        aggregator.emit_metrics();
    }
}
