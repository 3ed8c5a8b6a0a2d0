use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// How a [`TickRecord`] is rendered into the `Data` field of a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Self-describing JSON object.
    #[default]
    Json,
    /// Free-text `{ticker : .., timestamp : .., price : ..}` for consumers of
    /// the old stream layout. Not valid JSON. The timestamp is always UTC with
    /// six fractional digits, even when the microseconds are zero, so it does
    /// not match text stamped with a local wall clock.
    Legacy,
}

impl FromStr for RecordFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(RecordFormat::Json),
            "legacy" => Ok(RecordFormat::Legacy),
            other => bail!("unknown record format '{other}', expected 'json' or 'legacy'"),
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordFormat::Json => "json",
            RecordFormat::Legacy => "legacy",
        })
    }
}

/// Opaque record handed to a delivery stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRecord {
    #[serde(rename = "Data")]
    pub data: String,
}

impl TickRecord {
    pub fn encode(&self, format: RecordFormat) -> serde_json::Result<SinkRecord> {
        let data = match format {
            RecordFormat::Json => serde_json::to_string(self)?,
            RecordFormat::Legacy => format!(
                "{{ticker : {}, timestamp : {}, price : {:?}}}",
                self.ticker,
                self.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
                self.price
            ),
        };
        Ok(SinkRecord { data })
    }
}

impl SinkRecord {
    /// Recovers the tick from a JSON-encoded payload. Legacy payloads yield
    /// `None`.
    pub fn decode(&self) -> Option<TickRecord> {
        serde_json::from_str(&self.data).ok()
    }
}
