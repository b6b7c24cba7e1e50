// tests/common/mod.rs
#![allow(dead_code)]

use kinesis_reader::test::mocks::MockKinesisClient;
use kinesis_reader::test::TestUtils;
use kinesis_reader::{ReaderConfig, RetryConfig};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::{Arc, Once};
use std::time::Duration;

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

pub fn create_test_config() -> ReaderConfig {
    ReaderConfig {
        stream_name: "test-stream".to_string(),
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub async fn client_with_shards(shard_ids: &[&str]) -> MockKinesisClient {
    init_logging();
    let client = MockKinesisClient::new();
    client
        .mock_list_shards(Ok(shard_ids
            .iter()
            .map(|id| TestUtils::create_test_shard(id))
            .collect()))
        .await;
    client
}

/// In-memory writer whose contents stay readable while a sink owns a clone
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(String::from)
            .collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
