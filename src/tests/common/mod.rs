use std::sync::{Arc, Once};
use tokio::sync::watch;

use crate::reader::{ReadSummary, ReaderConfig, StreamReader};
use crate::store::CheckpointStore;
use crate::test::mocks::{MockKinesisClient, MockRecordSink};
use crate::test::TestUtils;

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "kinesis_reader=debug".into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config() -> ReaderConfig {
    ReaderConfig {
        stream_name: "test-stream".to_string(),
        ..Default::default()
    }
}

/// A mock client that lists `shard_ids` and a sink to collect the output
pub async fn setup(shard_ids: &[&str]) -> (MockKinesisClient, Arc<MockRecordSink>) {
    init_logging();
    let client = MockKinesisClient::new();
    client
        .mock_list_shards(Ok(shard_ids
            .iter()
            .map(|id| TestUtils::create_test_shard(id))
            .collect()))
        .await;
    (client, Arc::new(MockRecordSink::new()))
}

/// Run a reader to completion with no shutdown signal
pub async fn run_reader<S: CheckpointStore + 'static>(
    config: ReaderConfig,
    client: &MockKinesisClient,
    store: S,
    sink: Arc<MockRecordSink>,
) -> anyhow::Result<ReadSummary> {
    let (reader, _) = StreamReader::new(config, client.clone(), store);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    Ok(reader.run(sink, shutdown_rx).await?)
}
