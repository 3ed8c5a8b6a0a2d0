use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::StreamConfig;
use crate::generator::generate_batch_with;
use crate::logging;
use crate::notify::{FailureNotice, Notifier};
use crate::sink::{DeliverySink, SinkError};
use crate::store::PriceStore;
use crate::tick::SinkRecord;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationReport {
    pub tickers: usize,
    pub records: usize,
    pub delivered: usize,
    pub final_prices: IndexMap<String, f64>,
}

/// One triggered run: scan, generate with per-update writes, deliver.
pub struct Invocation<'a> {
    config: &'a StreamConfig,
    store: &'a mut dyn PriceStore,
    sink: &'a mut dyn DeliverySink,
    notifier: &'a dyn Notifier,
}

impl<'a> Invocation<'a> {
    pub fn new(
        config: &'a StreamConfig,
        store: &'a mut dyn PriceStore,
        sink: &'a mut dyn DeliverySink,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config,
            store,
            sink,
            notifier,
        }
    }

    /// Store errors abort as-is, leaving earlier writes in place. A delivery
    /// failure publishes exactly one [`FailureNotice`] built from `event`
    /// before the error is returned.
    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        event: &Value,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<InvocationReport> {
        logging::info_simple("invocation.start", "Invocation triggered");
        let prefix = self.config.ticker_prefix.as_str();
        let tickers = self
            .store
            .scan_prefix(prefix)
            .with_context(|| format!("failed to scan price store for prefix '{prefix}'"))?;

        if tickers.is_empty() {
            logging::warn(
                "store.scan",
                "No tickers matched the configured prefix; nothing to generate",
                json!({ "prefix": prefix }),
            );
            return Ok(InvocationReport::default());
        }

        let params = self.config.batch_params()?;
        let store = &mut *self.store;
        let batch = generate_batch_with(
            &tickers,
            params,
            now,
            rng,
            |ticker| {
                store
                    .put(ticker)
                    .with_context(|| format!("failed to persist price for {}", ticker.id))
            },
        )?;

        logging::info(
            "batch.generated",
            "Generated synthetic tick batch",
            json!({
                "tickers": tickers.len(),
                "rounds": self.config.rounds,
                "records": batch.len(),
            }),
        );

        let records = batch
            .records
            .iter()
            .map(|tick| tick.encode(self.config.record_format))
            .collect::<serde_json::Result<Vec<_>>>()
            .context("failed to encode tick records")?;

        let delivered = match self.deliver(&records) {
            Ok(delivered) => delivered,
            Err(err) => {
                self.report_failure(event, &err);
                return Err(err).with_context(|| {
                    format!(
                        "failed to deliver batch to stream '{}'",
                        self.config.delivery_stream
                    )
                });
            }
        };

        logging::info(
            "delivery.complete",
            "Tick batch sent to delivery stream",
            json!({
                "stream": self.config.delivery_stream,
                "delivered": delivered,
            }),
        );

        Ok(InvocationReport {
            tickers: tickers.len(),
            records: batch.len(),
            delivered,
            final_prices: batch.final_prices,
        })
    }

    fn deliver(&mut self, records: &[SinkRecord]) -> Result<usize, SinkError> {
        let stream = self.config.delivery_stream.as_str();
        let mut delivered = 0;
        for chunk in records.chunks(self.config.max_batch_records) {
            delivered += self.sink.put_record_batch(stream, chunk)?;
        }
        Ok(delivered)
    }

    fn report_failure(&self, event: &Value, err: &SinkError) {
        logging::error(
            "delivery.failed",
            "Delivery stream rejected tick batch",
            json!({
                "stream": self.config.delivery_stream,
                "error": err.to_string(),
            }),
        );

        let published = FailureNotice::for_event(
            &self.config.notify_topic,
            &self.config.operator_name,
            event,
        )
        .and_then(|notice| self.notifier.publish(&notice));

        if let Err(notify_err) = published {
            logging::error(
                "notification.failed",
                "Failure notice could not be published",
                json!({ "error": format!("{notify_err:#}") }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ticker;
    use crate::notify::MemoryNotifier;
    use crate::sink::MemorySink;
    use crate::store::MemoryStore;
    use crate::generator::BatchError;
    use crate::testkit::{FailingSink, FailingStore};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_store() -> MemoryStore {
        MemoryStore::with_tickers(&[
            Ticker::new("Index_1", 100.0),
            Ticker::new("Index_2", 50.0),
            Ticker::new("Unrelated", 1.0),
        ])
    }

    #[test]
    fn delivers_one_record_per_round_and_ticker() {
        let config = StreamConfig::default();
        let mut store = seeded_store();
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(11);

        let report = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect("invocation succeeds");

        assert_eq!(report.tickers, 2);
        assert_eq!(report.records, 8);
        assert_eq!(report.delivered, 8);
        assert_eq!(store.writes(), 8);
        assert_eq!(store.price("Index_1"), Some(report.final_prices["Index_1"]));
        assert_eq!(store.price("Unrelated"), Some(1.0));
        assert_eq!(sink.batches().len(), 1);
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn large_batches_are_split_into_chunks() {
        let config = StreamConfig {
            max_batch_records: 3,
            ..StreamConfig::default()
        };
        let mut store = seeded_store();
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(12);

        let report = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect("invocation succeeds");

        let sizes: Vec<_> = sink.batches().iter().map(|(_, r)| r.len()).collect();
        assert_eq!(sizes, [3, 3, 2]);
        assert_eq!(report.delivered, 8);
    }

    #[test]
    fn no_matching_tickers_skips_delivery() {
        let config = StreamConfig {
            ticker_prefix: "Crypto_".into(),
            ..StreamConfig::default()
        };
        let mut store = seeded_store();
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(13);

        let report = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect("empty scan is not an error");

        assert_eq!(report, InvocationReport::default());
        assert!(sink.batches().is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn sink_failure_notifies_once_and_fails() {
        let config = StreamConfig {
            operator_name: "Ops".into(),
            max_batch_records: 2,
            ..StreamConfig::default()
        };
        let event = json!({ "trigger": "manual", "attempt": 3 });
        let mut store = seeded_store();
        let mut sink = FailingSink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(14);

        let err = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&event, Utc::now(), &mut rng)
            .expect_err("delivery failure surfaces");

        assert!(err.downcast_ref::<SinkError>().is_some());
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Failure: Ops, could not generate stream");
        assert_eq!(
            serde_json::from_str::<Value>(&sent[0].message).expect("json message"),
            event
        );
        assert_eq!(store.writes(), 8, "price writes stay committed");
    }

    #[test]
    fn store_write_failure_aborts_before_delivery() {
        let config = StreamConfig::default();
        let mut store = FailingStore {
            fail_on_put: Some(3),
            ..FailingStore::with_tickers(&[
                Ticker::new("Index_1", 100.0),
                Ticker::new("Index_2", 50.0),
            ])
        };
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(15);

        let err = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect_err("store failure surfaces");

        assert!(format!("{err:#}").contains("failed to persist price for Index_1"));
        assert!(sink.batches().is_empty());
        assert!(notifier.sent().is_empty());
        assert_eq!(store.committed.len(), 2, "writes before the failure stay");
        assert_eq!(store.committed[0].id, "Index_1");
        assert_eq!(store.committed[1].id, "Index_2");
        assert_ne!(store.price("Index_1"), Some(100.0));
    }

    #[test]
    fn store_scan_failure_aborts_without_writes() {
        let config = StreamConfig::default();
        let mut store = FailingStore {
            fail_scan: true,
            ..FailingStore::with_tickers(&[Ticker::new("Index_1", 100.0)])
        };
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(16);

        let err = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect_err("scan failure surfaces");

        assert!(format!("{err:#}").contains("failed to scan price store"));
        assert!(store.committed.is_empty());
        assert!(sink.batches().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn out_of_range_interval_fails_without_writes() {
        let config = StreamConfig {
            round_interval_secs: 10_000_000_000_000,
            ..StreamConfig::default()
        };
        let mut store = seeded_store();
        let mut sink = MemorySink::default();
        let notifier = MemoryNotifier::default();
        let mut rng = StdRng::seed_from_u64(17);

        let err = Invocation::new(&config, &mut store, &mut sink, &notifier)
            .handle(&json!({}), Utc::now(), &mut rng)
            .expect_err("timestamps overflow");

        assert!(err.downcast_ref::<BatchError>().is_some());
        assert_eq!(store.writes(), 0);
        assert!(sink.batches().is_empty());
        assert!(notifier.sent().is_empty());
    }
}
