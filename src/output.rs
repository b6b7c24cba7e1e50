//! Rendering records for output

use async_trait::async_trait;
use aws_sdk_kinesis::types::Record;
use aws_smithy_types_convert::date_time::DateTimeExt;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::str::FromStr;

use crate::error::ReaderError;
use crate::reader::RecordSink;

/// How record payloads are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Payload bytes as-is, one record per line
    Raw,
    /// Payload as UTF-8 with invalid sequences replaced
    #[default]
    Text,
    Base64,
    Hex,
    /// One JSON envelope per line with record metadata
    Json,
}

impl FromStr for OutputFormat {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "text" => Ok(OutputFormat::Text),
            "base64" => Ok(OutputFormat::Base64),
            "hex" => Ok(OutputFormat::Hex),
            "json" => Ok(OutputFormat::Json),
            other => Err(ReaderError::Caller(format!(
                "Unknown output format '{}', expected raw, text, base64, hex or json",
                other
            ))),
        }
    }
}

/// Render a payload as a single string
///
/// `Raw` and `Text` both decode lossily here; [`WriterSink`] writes `Raw`
/// payload bytes without any decoding.
pub fn format_payload(format: OutputFormat, data: &[u8]) -> String {
    match format {
        OutputFormat::Raw | OutputFormat::Text => String::from_utf8_lossy(data).into_owned(),
        OutputFormat::Base64 => base64::engine::general_purpose::STANDARD.encode(data),
        OutputFormat::Hex => hex::encode(data),
        OutputFormat::Json => payload_value(data).to_string(),
    }
}

/// Payload as JSON if it parses, else a string, else base64
fn payload_value(data: &[u8]) -> Value {
    if let Ok(value) = serde_json::from_slice::<Value>(data) {
        return value;
    }
    match std::str::from_utf8(data) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(data)),
    }
}

/// JSON envelope for one record
pub fn record_envelope(shard_id: &str, record: &Record) -> Value {
    let arrival = record
        .approximate_arrival_timestamp()
        .and_then(|ts| ts.to_chrono_utc().ok())
        .map(|ts| ts.to_rfc3339());

    json!({
        "shardId": shard_id,
        "sequenceNumber": record.sequence_number(),
        "partitionKey": record.partition_key(),
        "approximateArrivalTimestamp": arrival,
        "data": payload_value(record.data().as_ref()),
    })
}

/// Writes one line per record to any writer
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
    format: OutputFormat,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_record(&self, shard_id: &str, record: &Record) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        match self.format {
            OutputFormat::Raw => writer.write_all(record.data().as_ref())?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *writer, &record_envelope(shard_id, record))?
            }
            format => writer.write_all(format_payload(format, record.data().as_ref()).as_bytes())?,
        }
        writer.write_all(b"\n")
    }
}

#[async_trait]
impl<W: Write + Send> RecordSink for WriterSink<W> {
    async fn write(&self, shard_id: &str, record: &Record) -> anyhow::Result<()> {
        self.write_record(shard_id, record)?;
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.writer.lock().flush()?;
        Ok(())
    }
}
