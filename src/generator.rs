use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use rand::Rng;
use thiserror::Error;

use crate::model::Ticker;
use crate::price;
use crate::tick::TickRecord;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchParams {
    pub rounds: usize,
    pub round_interval: Duration,
    pub volatility: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("timestamp of round {round} falls outside the supported date range")]
    TimestampOutOfRange { round: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedBatch {
    /// Round-major, ticker-minor.
    pub records: Vec<TickRecord>,
    pub final_prices: IndexMap<String, f64>,
}

impl GeneratedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub fn generate_batch<R: Rng + ?Sized>(
    tickers: &[Ticker],
    params: BatchParams,
    base_time: DateTime<Utc>,
    rng: &mut R,
) -> Result<GeneratedBatch, BatchError> {
    run_rounds(tickers, params, base_time, rng, |_| Ok::<(), BatchError>(()))
}

/// Same as [`generate_batch`], but hands every updated ticker to `on_update`
/// as soon as its new price exists. The first callback error stops
/// generation; updates reported before it stand. A [`BatchError`] is raised
/// before the first update, so it never leaves partial writes behind.
pub fn generate_batch_with<R, F>(
    tickers: &[Ticker],
    params: BatchParams,
    base_time: DateTime<Utc>,
    rng: &mut R,
    on_update: F,
) -> Result<GeneratedBatch>
where
    R: Rng + ?Sized,
    F: FnMut(&Ticker) -> Result<()>,
{
    run_rounds(tickers, params, base_time, rng, on_update)
}

/// `base_time + interval * round`, or an error when either step overflows.
pub fn round_timestamp(
    base_time: DateTime<Utc>,
    interval: Duration,
    round: usize,
) -> Result<DateTime<Utc>, BatchError> {
    i32::try_from(round)
        .ok()
        .and_then(|k| interval.checked_mul(k))
        .and_then(|offset| base_time.checked_add_signed(offset))
        .ok_or(BatchError::TimestampOutOfRange { round })
}

fn run_rounds<R, F, E>(
    tickers: &[Ticker],
    params: BatchParams,
    base_time: DateTime<Utc>,
    rng: &mut R,
    mut on_update: F,
) -> Result<GeneratedBatch, E>
where
    R: Rng + ?Sized,
    F: FnMut(&Ticker) -> Result<(), E>,
    E: From<BatchError>,
{
    // Offsets grow monotonically, so the last round bounds every other one.
    if let Some(last) = params.rounds.checked_sub(1) {
        round_timestamp(base_time, params.round_interval, last)?;
    }

    let mut current: Vec<Ticker> = tickers.to_vec();
    let mut records = Vec::with_capacity(params.rounds.saturating_mul(current.len()));

    for round in 0..params.rounds {
        let timestamp = round_timestamp(base_time, params.round_interval, round)?;
        for ticker in current.iter_mut() {
            ticker.price = price::evolve(rng, ticker.price, params.volatility);
            records.push(TickRecord {
                ticker: ticker.id.clone(),
                timestamp,
                price: ticker.price,
            });
            on_update(ticker)?;
        }
    }

    Ok(GeneratedBatch {
        records,
        final_prices: current.into_iter().map(|t| (t.id, t.price)).collect(),
    })
}
