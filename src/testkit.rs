//! In-process collaborators and helpers for driving invocations without
//! touching the filesystem.

use anyhow::{bail, Result};
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use crate::config::StreamConfig;
use crate::handler::{Invocation, InvocationReport};
use crate::model::Ticker;
use crate::notify::MemoryNotifier;
use crate::sink::{DeliverySink, MemorySink, SinkError};
use crate::store::{MemoryStore, PriceStore};
use crate::tick::SinkRecord;

pub const SEED: u64 = 0xBADF00D;

/// Accepts `accept_calls` batches, then rejects every call after that.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub accept_calls: usize,
    pub calls: usize,
    pub accepted: Vec<SinkRecord>,
}

impl DeliverySink for FailingSink {
    fn put_record_batch(
        &mut self,
        stream_name: &str,
        records: &[SinkRecord],
    ) -> Result<usize, SinkError> {
        self.calls += 1;
        if self.calls > self.accept_calls {
            return Err(SinkError::Rejected {
                stream: stream_name.to_string(),
                reason: "service unavailable".into(),
            });
        }
        self.accepted.extend_from_slice(records);
        Ok(records.len())
    }
}

/// In-memory table that can be told to fail its scan or its Nth `put`
/// (1-based). Successful writes are kept in `committed`, in order.
#[derive(Debug, Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    pub fail_scan: bool,
    pub fail_on_put: Option<usize>,
    pub puts: usize,
    pub committed: Vec<Ticker>,
}

impl FailingStore {
    pub fn with_tickers(tickers: &[Ticker]) -> Self {
        Self {
            inner: MemoryStore::with_tickers(tickers),
            ..Self::default()
        }
    }

    pub fn price(&self, id: &str) -> Option<f64> {
        self.inner.price(id)
    }
}

impl PriceStore for FailingStore {
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<Ticker>> {
        if self.fail_scan {
            bail!("price table unreachable");
        }
        self.inner.scan_prefix(prefix)
    }

    fn put(&mut self, ticker: &Ticker) -> Result<()> {
        self.puts += 1;
        if self.fail_on_put == Some(self.puts) {
            bail!("write throttled for {}", ticker.id);
        }
        self.inner.put(ticker)?;
        self.committed.push(ticker.clone());
        Ok(())
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0)
        .single()
        .unwrap_or_default()
}

pub struct Collected {
    pub report: InvocationReport,
    pub store: MemoryStore,
    pub sink: MemorySink,
}

/// Runs one invocation against in-memory collaborators seeded with
/// `tickers`, using [`SEED`] and [`fixed_time`].
pub fn collect_batch(config: &StreamConfig, tickers: &[Ticker]) -> Result<Collected> {
    let mut store = MemoryStore::with_tickers(tickers);
    let mut sink = MemorySink::default();
    let notifier = MemoryNotifier::default();
    let mut rng = StdRng::seed_from_u64(SEED);

    let report = Invocation::new(config, &mut store, &mut sink, &notifier).handle(
        &json!({ "source": "testkit" }),
        fixed_time(),
        &mut rng,
    )?;

    Ok(Collected {
        report,
        store,
        sink,
    })
}
