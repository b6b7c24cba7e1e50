//! Error types for the shard reader

use crate::client::KinesisClientError;
use crate::retry::{distinct_kinds, RetryError, Retryable};
use tokio::sync::AcquireError;
use tokio::task::JoinError;
use thiserror::Error;

/// Main error type for reader operations
///
/// The first four variants follow how a failure reached the caller: a bad
/// invocation, a retryable service failure surfaced outside the retry loop,
/// a fatal service failure, or a retry budget that ran out.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Invalid invocation: {0}")]
    Caller(String),

    #[error("Retryable Kinesis failure: {0}")]
    Retryable(KinesisClientError),

    #[error("Kinesis request failed after {} earlier attempt(s): {error}", .previous.len())]
    NonRetryable {
        #[source]
        error: KinesisClientError,
        previous: Vec<KinesisClientError>,
    },

    #[error(
        "Maximum retries exceeded after {} attempts: {}",
        .attempts.len(),
        distinct_kinds(.attempts)
    )]
    ExhaustedRetries { attempts: Vec<KinesisClientError> },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReaderError {
    /// Every service error that contributed to this failure, oldest first
    pub fn attempt_errors(&self) -> Vec<&KinesisClientError> {
        match self {
            ReaderError::Retryable(e) => vec![e],
            ReaderError::NonRetryable { error, previous } => {
                previous.iter().chain(std::iter::once(error)).collect()
            }
            ReaderError::ExhaustedRetries { attempts } => attempts.iter().collect(),
            _ => Vec::new(),
        }
    }
}

impl From<RetryError<KinesisClientError>> for ReaderError {
    fn from(err: RetryError<KinesisClientError>) -> Self {
        match err {
            RetryError::NonRetryable { error, previous } => {
                ReaderError::NonRetryable { error, previous }
            }
            RetryError::ExhaustedRetries { errors } => {
                ReaderError::ExhaustedRetries { attempts: errors }
            }
        }
    }
}

impl From<KinesisClientError> for ReaderError {
    fn from(err: KinesisClientError) -> Self {
        if err.is_retryable() {
            ReaderError::Retryable(err)
        } else {
            ReaderError::NonRetryable {
                error: err,
                previous: Vec::new(),
            }
        }
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Checkpoint(err.to_string())
    }
}

impl From<AcquireError> for ReaderError {
    fn from(err: AcquireError) -> Self {
        ReaderError::Other(err.into())
    }
}

impl From<JoinError> for ReaderError {
    fn from(err: JoinError) -> Self {
        ReaderError::Other(err.into())
    }
}

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, ReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        let err: ReaderError = RetryError::ExhaustedRetries {
            errors: vec![
                KinesisClientError::ThroughputExceeded,
                KinesisClientError::ThroughputExceeded,
            ],
        }
        .into();
        assert!(matches!(err, ReaderError::ExhaustedRetries { ref attempts } if attempts.len() == 2));

        let err: ReaderError = RetryError::NonRetryable {
            error: KinesisClientError::AccessDenied("nope".into()),
            previous: vec![KinesisClientError::Timeout("slow".into())],
        }
        .into();
        assert_eq!(err.attempt_errors().len(), 2);

        let err: ReaderError = KinesisClientError::ThroughputExceeded.into();
        assert!(matches!(err, ReaderError::Retryable(_)));

        let err: ReaderError = KinesisClientError::ResourceNotFound("s".into()).into();
        assert!(matches!(err, ReaderError::NonRetryable { ref previous, .. } if previous.is_empty()));
    }

    #[test]
    fn test_error_messages() {
        let err = ReaderError::ExhaustedRetries {
            attempts: vec![
                KinesisClientError::ThroughputExceeded,
                KinesisClientError::Timeout("a".into()),
                KinesisClientError::Timeout("b".into()),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("ThroughputExceeded"));
        assert_eq!(message.matches("Timeout").count(), 1);

        let err = ReaderError::Caller("no shards".to_string());
        assert!(err.to_string().contains("no shards"));
    }
}
