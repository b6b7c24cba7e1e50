//! Test utilities and mock implementations for testing the shard reader


use aws_sdk_kinesis::types::{Record, Shard};
use aws_smithy_types_convert::date_time::DateTimeExt;
use chrono::{DateTime, TimeZone, Utc};

use crate::client::RecordsPage;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// UTC instant `secs` seconds after the epoch
    pub fn timestamp(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0)
            .single()
            .expect("Valid test timestamp")
    }

    /// Create a test record with given sequence number and data
    pub fn create_test_record(sequence_number: &str, data: &[u8]) -> Record {
        Self::create_test_record_at(sequence_number, data, Self::timestamp(1_700_000_000))
    }

    /// Create a test record that arrived at `arrival`
    pub fn create_test_record_at(sequence_number: &str, data: &[u8], arrival: DateTime<Utc>) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(aws_smithy_types::Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .approximate_arrival_timestamp(aws_smithy_types::DateTime::from_chrono_utc(arrival))
            .build()
            .expect("Failed to build test record")
    }

    /// Create a test shard with given ID
    pub fn create_test_shard(shard_id: &str) -> Shard {
        Shard::builder()
            .shard_id(shard_id)
            .build()
            .expect("Failed to build test shard")
    }

    /// Create `count` records numbered from zero
    pub fn create_test_records(count: usize) -> Vec<Record> {
        Self::create_test_records_from(0, count)
    }

    /// Create `count` records numbered from `start`
    pub fn create_test_records_from(start: usize, count: usize) -> Vec<Record> {
        (start..start + count)
            .map(|i| {
                Self::create_test_record(
                    &format!("sequence-{}", i),
                    format!("data-{}", i).as_bytes(),
                )
            })
            .collect()
    }

    /// A page of `count` records numbered from zero
    pub fn page(count: usize, next_iterator: Option<&str>, millis_behind_latest: i64) -> RecordsPage {
        Self::page_from(0, count, next_iterator, millis_behind_latest)
    }

    /// A page of `count` records numbered from `start`
    pub fn page_from(
        start: usize,
        count: usize,
        next_iterator: Option<&str>,
        millis_behind_latest: i64,
    ) -> RecordsPage {
        RecordsPage {
            records: Self::create_test_records_from(start, count),
            next_iterator: next_iterator.map(String::from),
            millis_behind_latest,
        }
    }

    /// The sequence numbers of `records`, in order
    pub fn sequences(records: &[Record]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.sequence_number().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_record() {
        let record = TestUtils::create_test_record("seq-1", b"test-data");
        assert_eq!(record.sequence_number(), "seq-1");
        assert_eq!(record.data().as_ref(), b"test-data");
        assert_eq!(record.partition_key(), "test-partition-key");
        assert!(record.approximate_arrival_timestamp().is_some());
    }

    #[test]
    fn test_create_test_records_from() {
        let records = TestUtils::create_test_records_from(3, 2);
        assert_eq!(
            TestUtils::sequences(&records),
            vec!["sequence-3".to_string(), "sequence-4".to_string()]
        );
    }
}
