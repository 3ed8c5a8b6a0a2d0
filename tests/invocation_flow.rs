use std::fs;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use tempfile::TempDir;
use ticker_stream::config::StreamConfig;
use ticker_stream::handler::Invocation;
use ticker_stream::model::Ticker;
use ticker_stream::notify::{FailureNotice, MemoryNotifier, OutboxNotifier};
use ticker_stream::sink::{read_delivered, JsonLinesSink};
use ticker_stream::store::{JsonFileStore, MemoryStore, PriceStore};
use ticker_stream::testkit::{self, FailingSink};
use ticker_stream::tick::RecordFormat;

fn five_indices() -> Vec<Ticker> {
    (1..=5)
        .map(|n| Ticker::new(format!("Index_{n}"), 100.0 + n as f64))
        .collect()
}

#[test]
fn file_backed_invocation_persists_and_delivers() {
    let dir = TempDir::new().expect("tempdir");
    let config = StreamConfig {
        store_path: dir.path().join("prices.json"),
        delivery_path: dir.path().join("delivery.jsonl"),
        notify_outbox: Some(dir.path().join("outbox.jsonl")),
        ..StreamConfig::default()
    };

    let mut store = JsonFileStore::open(&config.store_path).expect("open store");
    for ticker in five_indices() {
        store.put(&ticker).expect("seed");
    }
    let mut sink = JsonLinesSink::new(&config.delivery_path);
    let notifier = OutboxNotifier::new(dir.path().join("outbox.jsonl"));
    let mut rng = StdRng::seed_from_u64(testkit::SEED);

    let report = Invocation::new(&config, &mut store, &mut sink, &notifier)
        .handle(&json!({}), testkit::fixed_time(), &mut rng)
        .expect("invocation succeeds");
    assert_eq!(report.records, 20);
    assert_eq!(report.delivered, 20);

    let delivered = read_delivered(&config.delivery_path).expect("read delivery");
    assert_eq!(delivered.len(), 20);
    let ticks: Vec<_> = delivered
        .iter()
        .map(|d| d.record.decode().expect("json payload"))
        .collect();
    for (idx, tick) in ticks.iter().enumerate() {
        assert_eq!(tick.ticker, format!("Index_{}", idx % 5 + 1));
        assert_eq!(
            tick.timestamp,
            testkit::fixed_time() + Duration::seconds(15 * (idx / 5) as i64)
        );
    }

    let reopened = JsonFileStore::open(&config.store_path).expect("reopen store");
    for ticker in reopened.scan_prefix("Index_").expect("scan") {
        assert_eq!(report.final_prices[&ticker.id], ticker.price);
    }
    assert!(!dir.path().join("outbox.jsonl").exists());
}

#[test]
fn delivery_failure_keeps_writes_and_notifies_once() {
    let dir = TempDir::new().expect("tempdir");
    let outbox = dir.path().join("outbox.jsonl");
    let config = StreamConfig {
        operator_name: "Dora".into(),
        max_batch_records: 8,
        ..StreamConfig::default()
    };
    let event = json!({ "id": "cdc73f9d", "source": "aws.events" });

    let mut store = MemoryStore::with_tickers(&five_indices());
    let mut sink = FailingSink {
        accept_calls: 1,
        ..FailingSink::default()
    };
    let notifier = OutboxNotifier::new(&outbox);
    let mut rng = StdRng::seed_from_u64(testkit::SEED);

    let result = Invocation::new(&config, &mut store, &mut sink, &notifier).handle(
        &event,
        testkit::fixed_time(),
        &mut rng,
    );

    assert!(result.is_err());
    assert_eq!(sink.calls, 2, "stops at the first rejected chunk");
    assert_eq!(sink.accepted.len(), 8);
    assert_eq!(store.writes(), 20);

    let raw = fs::read_to_string(&outbox).expect("outbox written");
    let notices: Vec<FailureNotice> = raw
        .lines()
        .map(|l| serde_json::from_str(l).expect("notice"))
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].subject, "Failure: Dora, could not generate stream");
    assert_eq!(
        serde_json::from_str::<Value>(&notices[0].message).expect("payload"),
        event
    );
}

#[test]
fn legacy_format_reproduces_free_text_records() {
    let config = StreamConfig {
        record_format: RecordFormat::Legacy,
        rounds: 1,
        volatility: 0.0,
        ..StreamConfig::default()
    };
    let collected =
        testkit::collect_batch(&config, &[Ticker::new("Index_1", 250.0)]).expect("collect");

    let data: Vec<_> = collected.sink.records().map(|r| r.data.clone()).collect();
    assert_eq!(
        data,
        ["{ticker : Index_1, timestamp : 2023-11-14 22:13:20.000000, price : 250.0}"]
    );
    assert_eq!(collected.store.price("Index_1"), Some(250.0));
}

#[test]
fn seeded_runs_are_reproducible() {
    let config = StreamConfig::default();
    let first = testkit::collect_batch(&config, &five_indices()).expect("first");
    let second = testkit::collect_batch(&config, &five_indices()).expect("second");

    assert_eq!(first.report, second.report);
    let a: Vec<_> = first.sink.records().cloned().collect();
    let b: Vec<_> = second.sink.records().cloned().collect();
    assert_eq!(a, b);
}

#[test]
fn empty_store_is_a_quiet_no_op() {
    let collected = testkit::collect_batch(&StreamConfig::default(), &[]).expect("collect");
    assert_eq!(collected.report.records, 0);
    assert!(collected.report.final_prices.is_empty());
    assert!(collected.sink.batches().is_empty());
}

#[test]
fn memory_notifier_is_untouched_on_success() {
    let config = StreamConfig::default();
    let mut store = MemoryStore::with_tickers(&five_indices());
    let mut sink = FailingSink {
        accept_calls: usize::MAX,
        ..FailingSink::default()
    };
    let notifier = MemoryNotifier::default();
    let mut rng = StdRng::seed_from_u64(9);

    Invocation::new(&config, &mut store, &mut sink, &notifier)
        .handle(&json!({}), testkit::fixed_time(), &mut rng)
        .expect("invocation succeeds");
    assert!(notifier.sent().is_empty());
}
