use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;

use crate::constants::{
    DELIVERY_PATH, DELIVERY_STREAM, MAX_BATCH_RECORDS, NOTIFY_OUTBOX_PATH, NOTIFY_TOPIC,
    OPERATOR_NAME, ROUNDS, ROUND_INTERVAL_SECS, STORE_PATH, TICKER_PREFIX, VOLATILITY,
};
use crate::generator::{round_timestamp, BatchParams};
use crate::tick::RecordFormat;

/// Everything one invocation needs to know about its surroundings.
///
/// Loaded from TOML with every field optional; missing keys fall back to
/// [`StreamConfig::default`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Store items whose id contains this string are generated.
    pub ticker_prefix: String,
    pub rounds: usize,
    pub round_interval_secs: i64,
    /// Maximum relative swing per round, in `[0, 1)`.
    pub volatility: f64,
    pub record_format: RecordFormat,
    /// Largest number of records handed to the sink in one call.
    pub max_batch_records: usize,
    pub store_path: PathBuf,
    pub delivery_stream: String,
    pub delivery_path: PathBuf,
    pub notify_topic: String,
    /// When unset, failure notices only go to the error log.
    pub notify_outbox: Option<PathBuf>,
    pub operator_name: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ticker_prefix: TICKER_PREFIX.to_string(),
            rounds: ROUNDS,
            round_interval_secs: ROUND_INTERVAL_SECS,
            volatility: VOLATILITY,
            record_format: RecordFormat::default(),
            max_batch_records: MAX_BATCH_RECORDS,
            store_path: PathBuf::from(STORE_PATH),
            delivery_stream: DELIVERY_STREAM.to_string(),
            delivery_path: PathBuf::from(DELIVERY_PATH),
            notify_topic: NOTIFY_TOPIC.to_string(),
            notify_outbox: Some(PathBuf::from(NOTIFY_OUTBOX_PATH)),
            operator_name: OPERATOR_NAME.to_string(),
        }
    }
}

impl StreamConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: StreamConfig =
            toml::from_str(&raw).with_context(|| format!("invalid config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.volatility) {
            bail!("volatility must be within [0, 1), got {}", self.volatility);
        }
        if self.round_interval_secs < 0 {
            bail!(
                "round interval must not be negative, got {}s",
                self.round_interval_secs
            );
        }
        let params = self.batch_params()?;
        if let Some(last) = self.rounds.checked_sub(1) {
            round_timestamp(Utc::now(), params.round_interval, last).with_context(|| {
                format!(
                    "{} rounds spaced {}s apart run past the supported date range",
                    self.rounds, self.round_interval_secs
                )
            })?;
        }
        if self.max_batch_records == 0 {
            bail!("max_batch_records must be at least 1");
        }
        if self.delivery_stream.trim().is_empty() {
            bail!("delivery stream name must not be empty");
        }
        Ok(())
    }

    pub fn batch_params(&self) -> Result<BatchParams> {
        let round_interval = Duration::try_seconds(self.round_interval_secs).with_context(|| {
            format!(
                "round interval of {}s is too large",
                self.round_interval_secs
            )
        })?;
        Ok(BatchParams {
            rounds: self.rounds,
            round_interval,
            volatility: self.volatility,
        })
    }
}
