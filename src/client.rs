//! Boundary to the Kinesis data plane
//!
//! Everything the reader needs from the service goes through
//! [`KinesisClientTrait`]; the SDK client implements it and tests use the
//! mock in [`crate::test::mocks`].

use async_trait::async_trait;
use aws_sdk_kinesis::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{Record, Shard, ShardIteratorType},
    Client,
};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, trace};

use crate::retry::Retryable;

/// Failures reported by the data plane, classified by how the reader reacts to them
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KinesisClientError {
    #[error("Shard iterator expired")]
    ExpiredIterator,

    #[error("Provisioned throughput exceeded")]
    ThroughputExceeded,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("KMS error: {0}")]
    KmsError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transient service error: {0}")]
    Transient(String),

    #[error("{0}")]
    Other(String),
}

impl Retryable for KinesisClientError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            KinesisClientError::ExpiredIterator
                | KinesisClientError::ThroughputExceeded
                | KinesisClientError::Timeout(_)
                | KinesisClientError::ConnectionError(_)
                | KinesisClientError::Transient(_)
        )
    }

    fn kind(&self) -> Cow<'static, str> {
        Cow::Borrowed(match self {
            KinesisClientError::ExpiredIterator => "ExpiredIterator",
            KinesisClientError::ThroughputExceeded => "ThroughputExceeded",
            KinesisClientError::AccessDenied(_) => "AccessDenied",
            KinesisClientError::InvalidArgument(_) => "InvalidArgument",
            KinesisClientError::ResourceNotFound(_) => "ResourceNotFound",
            KinesisClientError::KmsError(_) => "KmsError",
            KinesisClientError::Timeout(_) => "Timeout",
            KinesisClientError::ConnectionError(_) => "ConnectionError",
            KinesisClientError::Transient(_) => "Transient",
            KinesisClientError::Other(_) => "Other",
        })
    }
}

/// One page returned by `GetRecords`
#[derive(Debug, Clone, Default)]
pub struct RecordsPage {
    pub records: Vec<Record>,
    pub next_iterator: Option<String>,
    pub millis_behind_latest: i64,
}

/// Outcome of probing an iterator without consuming the shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IteratorStatus {
    /// The iterator is usable; lag reported by the service
    Valid { millis_behind_latest: i64 },
    /// The iterator has expired or was rejected by the service
    Invalid { reason: String },
}

#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>, KinesisClientError>;

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<&DateTime<Utc>>,
    ) -> Result<String, KinesisClientError>;

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordsPage, KinesisClientError>;

    /// Fetch a single record to learn whether `iterator` is still usable.
    ///
    /// Expiry and argument errors are reported as [`IteratorStatus::Invalid`]
    /// rather than as errors.
    async fn check_iterator(&self, iterator: &str) -> Result<IteratorStatus, KinesisClientError> {
        match self.get_records(iterator, 1).await {
            Ok(page) => Ok(IteratorStatus::Valid {
                millis_behind_latest: page.millis_behind_latest,
            }),
            Err(KinesisClientError::ExpiredIterator) => Ok(IteratorStatus::Invalid {
                reason: KinesisClientError::ExpiredIterator.to_string(),
            }),
            Err(KinesisClientError::InvalidArgument(msg)) => {
                Ok(IteratorStatus::Invalid { reason: msg })
            }
            Err(e) => Err(e),
        }
    }
}

/// Map an SDK failure onto the reader's error classes
fn classify_sdk_error<E, R>(err: SdkError<E, R>) -> KinesisClientError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();

    match &err {
        SdkError::TimeoutError(_) => return KinesisClientError::Timeout(message),
        SdkError::DispatchFailure(_) => return KinesisClientError::ConnectionError(message),
        SdkError::ResponseError(_) => return KinesisClientError::Transient(message),
        _ => {}
    }

    let code = err.code().unwrap_or_default();
    trace!(code = %code, "Classifying Kinesis service error");

    match code {
        "ExpiredIteratorException" => KinesisClientError::ExpiredIterator,
        "ProvisionedThroughputExceededException" | "LimitExceededException" => {
            KinesisClientError::ThroughputExceeded
        }
        "AccessDeniedException" => KinesisClientError::AccessDenied(message),
        "InvalidArgumentException" => KinesisClientError::InvalidArgument(message),
        "ResourceNotFoundException" => KinesisClientError::ResourceNotFound(message),
        "KMSThrottlingException" | "InternalFailureException" | "ServiceUnavailable" => {
            KinesisClientError::Transient(message)
        }
        c if c.starts_with("KMS") => KinesisClientError::KmsError(message),
        _ => KinesisClientError::Other(message),
    }
}

#[async_trait]
impl KinesisClientTrait for Client {
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<Shard>, KinesisClientError> {
        let mut shards = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            // ListShards rejects a stream name alongside a continuation token
            let request = match &next_token {
                Some(token) => self.list_shards().next_token(token),
                None => self.list_shards().stream_name(stream_name),
            };

            let response = request.send().await.map_err(classify_sdk_error)?;
            shards.extend(response.shards().iter().cloned());

            match response.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!(stream = %stream_name, count = shards.len(), "Listed shards");
        Ok(shards)
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        iterator_type: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<&DateTime<Utc>>,
    ) -> Result<String, KinesisClientError> {
        let mut req = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(iterator_type);

        if let Some(seq) = sequence_number {
            req = req.starting_sequence_number(seq);
        }

        if let Some(ts) = timestamp {
            req = req.timestamp(aws_smithy_types::DateTime::from_chrono_utc(*ts));
        }

        let response = req.send().await.map_err(classify_sdk_error)?;
        response
            .shard_iterator()
            .map(String::from)
            .ok_or_else(|| {
                KinesisClientError::Other(format!("No shard iterator returned for {}", shard_id))
            })
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordsPage, KinesisClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(RecordsPage {
            records: response.records().to_vec(),
            next_iterator: response.next_shard_iterator().map(String::from),
            millis_behind_latest: response.millis_behind_latest().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::mocks::MockKinesisClient;

    #[test]
    fn test_retryable_classification() {
        assert!(KinesisClientError::ExpiredIterator.is_retryable());
        assert!(KinesisClientError::ThroughputExceeded.is_retryable());
        assert!(KinesisClientError::Timeout("t".into()).is_retryable());
        assert!(KinesisClientError::Transient("5xx".into()).is_retryable());
        assert!(!KinesisClientError::AccessDenied("no".into()).is_retryable());
        assert!(!KinesisClientError::ResourceNotFound("shard".into()).is_retryable());
        assert!(!KinesisClientError::Other("boom".into()).is_retryable());
    }

    #[test]
    fn test_kind_ignores_message() {
        let a = KinesisClientError::Timeout("first".into());
        let b = KinesisClientError::Timeout("second".into());
        assert_eq!(a.kind(), b.kind());
        assert_ne!(a.kind(), KinesisClientError::ThroughputExceeded.kind());
    }

    #[tokio::test]
    async fn test_check_iterator_reports_expiry_without_error() -> anyhow::Result<()> {
        let client = MockKinesisClient::new();
        client.mock_expired_iterator().await;

        let status = client.check_iterator("it-1").await?;
        assert!(matches!(status, IteratorStatus::Invalid { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_check_iterator_reports_lag() -> anyhow::Result<()> {
        let client = MockKinesisClient::new();
        client
            .mock_get_records(Ok(RecordsPage {
                records: vec![],
                next_iterator: Some("it-2".to_string()),
                millis_behind_latest: 1500,
            }))
            .await;

        let status = client.check_iterator("it-1").await?;
        assert_eq!(
            status,
            IteratorStatus::Valid {
                millis_behind_latest: 1500
            }
        );
        assert_eq!(client.get_records_limits().await, vec![1]);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_iterator_propagates_other_failures() {
        let client = MockKinesisClient::new();
        client
            .mock_get_records(Err(KinesisClientError::AccessDenied("denied".into())))
            .await;

        let result = client.check_iterator("it-1").await;
        assert!(matches!(result, Err(KinesisClientError::AccessDenied(_))));
    }
}
