//! Resumable read position within one shard

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a shard read left off
///
/// An empty checkpoint means "start of shard". The position token is a
/// short-lived shard iterator; the last read sequence number survives its
/// expiry and is what a later run resumes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_token: Option<String>,
    #[serde(default)]
    pub last_read_sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Checkpoint {
    /// Checkpoint positioned at the start of the shard
    pub fn start_of_shard() -> Self {
        Self::default()
    }

    /// Checkpoint resuming right after `sequence_number`
    pub fn after_sequence_number(sequence_number: impl Into<String>) -> Self {
        Self {
            last_read_sequence_number: Some(sequence_number.into()),
            ..Default::default()
        }
    }

    /// Checkpoint starting at the first record at or after `timestamp`
    pub fn at_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position_token.is_none()
            && self.last_read_sequence_number.is_none()
            && self.timestamp.is_none()
    }

    /// Same position with the iterator dropped, for re-deriving a fresh one
    pub fn without_position_token(&self) -> Self {
        Self {
            position_token: None,
            ..self.clone()
        }
    }

    /// Checkpoint following a batch: the new iterator, and the batch's last
    /// sequence number or the previous one if the batch was empty
    pub fn advanced(
        &self,
        next_position_token: Option<String>,
        last_sequence_in_batch: Option<&str>,
    ) -> Self {
        Self {
            position_token: next_position_token,
            last_read_sequence_number: last_sequence_in_batch
                .map(String::from)
                .or_else(|| self.last_read_sequence_number.clone()),
            timestamp: self.timestamp,
        }
    }
}
