use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tick::SinkRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("delivery stream '{stream}' rejected batch: {reason}")]
    Rejected { stream: String, reason: String },

    #[error("delivery IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("delivery serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Streaming-delivery endpoint. Returns how many records it accepted.
pub trait DeliverySink {
    fn put_record_batch(
        &mut self,
        stream_name: &str,
        records: &[SinkRecord],
    ) -> Result<usize, SinkError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    batches: Vec<(String, Vec<SinkRecord>)>,
}

impl MemorySink {
    /// Calls received so far, each as `(stream, records)`.
    pub fn batches(&self) -> &[(String, Vec<SinkRecord>)] {
        &self.batches
    }

    pub fn records(&self) -> impl Iterator<Item = &SinkRecord> {
        self.batches.iter().flat_map(|(_, records)| records.iter())
    }
}

impl DeliverySink for MemorySink {
    fn put_record_batch(
        &mut self,
        stream_name: &str,
        records: &[SinkRecord],
    ) -> Result<usize, SinkError> {
        self.batches.push((stream_name.to_string(), records.to_vec()));
        Ok(records.len())
    }
}

#[derive(Serialize)]
struct DeliveredLine<'a> {
    stream: &'a str,
    #[serde(flatten)]
    record: &'a SinkRecord,
}

/// Appends one JSON line per record, tagged with the stream name.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DeliverySink for JsonLinesSink {
    fn put_record_batch(
        &mut self,
        stream_name: &str,
        records: &[SinkRecord],
    ) -> Result<usize, SinkError> {
        if stream_name.trim().is_empty() {
            return Err(SinkError::Rejected {
                stream: stream_name.to_string(),
                reason: "delivery stream name is empty".into(),
            });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(
                &mut writer,
                &DeliveredLine {
                    stream: stream_name,
                    record,
                },
            )?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(records.len())
    }
}

/// Line shape written by [`JsonLinesSink`], for readers of the delivery file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveredRecord {
    pub stream: String,
    #[serde(flatten)]
    pub record: SinkRecord,
}

/// Reads every line a [`JsonLinesSink`] wrote to `path`.
pub fn read_delivered(path: &Path) -> anyhow::Result<Vec<DeliveredRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read delivery file {:?}", path))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("malformed record on line {} of {:?}", idx + 1, path))
        })
        .collect()
}
