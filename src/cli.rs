use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::chart::ChartArgs;
use crate::config::StreamConfig;
use crate::constants::SCHEDULE_PERIOD_SECS;
use crate::tail::TailArgs;
use crate::tick::RecordFormat;

#[derive(Debug, Parser)]
#[command(author, version, about = "Synthetic ticker stream generator")]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(self) -> Command {
        self.command.unwrap_or_default()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate one batch, persist prices and deliver it
    Run(RunArgs),
    /// Trigger a run on a fixed period until interrupted
    Schedule(ScheduleArgs),
    /// Write opening prices for a ticker set into the store
    Seed(SeedArgs),
    /// Publish a failure notice for an event
    Notify(NotifyArgs),
    /// Print records from the delivery stream file
    Tail(TailArgs),
    /// Render delivered prices for one ticker as an ASCII chart
    Chart(ChartArgs),
}

impl Default for Command {
    fn default() -> Self {
        Command::Run(RunArgs::default())
    }
}

/// Overrides layered on top of the defaults or a `--config` file.
#[derive(Debug, Args, Clone, Default)]
pub struct StreamArgs {
    /// TOML file with stream settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only store items whose id contains this string are generated
    #[arg(long)]
    pub prefix: Option<String>,

    /// Number of rounds per invocation
    #[arg(long)]
    pub rounds: Option<usize>,

    /// Simulated spacing between rounds, in seconds
    #[arg(long)]
    pub interval_secs: Option<i64>,

    /// Maximum relative price swing per round, in [0, 1)
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Payload encoding for delivered records (json or legacy)
    #[arg(long)]
    pub record_format: Option<RecordFormat>,

    /// Price table file
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Delivery stream name
    #[arg(long)]
    pub stream: Option<String>,

    /// File the delivery stream appends to
    #[arg(long)]
    pub delivery: Option<PathBuf>,

    /// Outbox file for failure notices
    #[arg(long, conflicts_with = "no_outbox")]
    pub outbox: Option<PathBuf>,

    /// Send failure notices to the error log only
    #[arg(long)]
    pub no_outbox: bool,

    /// Operator named in failure notice subjects
    #[arg(long)]
    pub operator: Option<String>,
}

impl StreamArgs {
    pub fn into_config(self) -> Result<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => StreamConfig::load(path)?,
            None => StreamConfig::default(),
        };

        if let Some(prefix) = self.prefix {
            config.ticker_prefix = prefix;
        }
        if let Some(rounds) = self.rounds {
            config.rounds = rounds;
        }
        if let Some(secs) = self.interval_secs {
            config.round_interval_secs = secs;
        }
        if let Some(volatility) = self.volatility {
            config.volatility = volatility;
        }
        if let Some(format) = self.record_format {
            config.record_format = format;
        }
        if let Some(store) = self.store {
            config.store_path = store;
        }
        if let Some(stream) = self.stream {
            config.delivery_stream = stream;
        }
        if let Some(delivery) = self.delivery {
            config.delivery_path = delivery;
        }
        if let Some(outbox) = self.outbox {
            config.notify_outbox = Some(outbox);
        }
        if self.no_outbox {
            config.notify_outbox = None;
        }
        if let Some(operator) = self.operator {
            config.operator_name = operator;
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct EventArgs {
    /// Trigger event as inline JSON, echoed in failure notices
    #[arg(long, conflicts_with = "event_file")]
    pub event: Option<String>,

    /// File holding the trigger event JSON
    #[arg(long)]
    pub event_file: Option<PathBuf>,
}

impl EventArgs {
    pub fn load(&self) -> Result<Value> {
        if let Some(raw) = &self.event {
            return serde_json::from_str(raw).context("--event is not valid JSON");
        }
        if let Some(path) = &self.event_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read event file {:?}", path))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("event file {:?} is not valid JSON", path));
        }
        Ok(Value::Object(Default::default()))
    }
}

#[derive(Debug, Args, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    #[command(flatten)]
    pub event: EventArgs,

    /// Seed the price RNG for a reproducible batch
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ScheduleArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Seconds between invocations
    #[arg(long, default_value_t = SCHEDULE_PERIOD_SECS)]
    pub period_secs: u64,

    /// Stop after this many invocations
    #[arg(long)]
    pub max_invocations: Option<usize>,

    /// Seed the price RNG shared by all invocations
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct SeedArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    /// Explicit ticker as ID=PRICE; repeatable. Overrides --count
    #[arg(long = "ticker", value_parser = parse_ticker)]
    pub tickers: Vec<(String, f64)>,

    /// Number of generated `{prefix}{n}` tickers when none are given
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Seed for generated opening prices
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct NotifyArgs {
    #[command(flatten)]
    pub stream: StreamArgs,

    #[command(flatten)]
    pub event: EventArgs,
}

fn parse_ticker(raw: &str) -> Result<(String, f64), String> {
    let (id, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=PRICE, got '{raw}'"))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(format!("ticker id is empty in '{raw}'"));
    }
    let price: f64 = price
        .trim()
        .parse()
        .map_err(|err| format!("invalid price in '{raw}': {err}"))?;
    if !price.is_finite() {
        return Err(format!("price must be finite in '{raw}'"));
    }
    Ok((id.to_string(), price))
}
