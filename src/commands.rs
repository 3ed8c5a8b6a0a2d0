use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use crate::cli::{NotifyArgs, RunArgs, ScheduleArgs, SeedArgs};
use crate::config::StreamConfig;
use crate::handler::{Invocation, InvocationReport};
use crate::logging;
use crate::model::{default_tickers, Ticker};
use crate::notify::{FailureNotice, LogNotifier, Notifier, OutboxNotifier};
use crate::scheduler::{self, ScheduleOptions};
use crate::sink::JsonLinesSink;
use crate::store::{JsonFileStore, PriceStore};

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn notifier_for(config: &StreamConfig) -> Box<dyn Notifier> {
    match &config.notify_outbox {
        Some(path) => Box::new(OutboxNotifier::new(path)),
        None => Box::new(LogNotifier),
    }
}

/// File-backed collaborators for one configuration.
struct Wiring {
    store: JsonFileStore,
    sink: JsonLinesSink,
    notifier: Box<dyn Notifier>,
}

impl Wiring {
    fn open(config: &StreamConfig) -> Result<Self> {
        Ok(Self {
            store: JsonFileStore::open(&config.store_path)?,
            sink: JsonLinesSink::new(&config.delivery_path),
            notifier: notifier_for(config),
        })
    }

    fn invoke(
        &mut self,
        config: &StreamConfig,
        event: &serde_json::Value,
        rng: &mut StdRng,
    ) -> Result<InvocationReport> {
        Invocation::new(
            config,
            &mut self.store,
            &mut self.sink,
            self.notifier.as_ref(),
        )
        .handle(event, Utc::now(), rng)
    }
}

pub fn run(args: RunArgs) -> Result<()> {
    let config = args.stream.into_config()?;
    let event = args.event.load()?;
    let mut rng = rng_from(args.seed);
    let mut wiring = Wiring::open(&config)?;

    let report = wiring.invoke(&config, &event, &mut rng)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn schedule(args: ScheduleArgs) -> Result<()> {
    let config = args.stream.into_config()?;
    let mut rng = rng_from(args.seed);
    let mut wiring = Wiring::open(&config)?;

    let options = ScheduleOptions {
        period: Duration::from_secs(args.period_secs),
        max_invocations: args.max_invocations,
    };
    let summary = scheduler::run(options, |event, _| {
        wiring.invoke(&config, event, &mut rng)
    })
    .await?;

    if summary.failures > 0 {
        bail!(
            "{} of {} scheduled invocations failed",
            summary.failures,
            summary.invocations
        );
    }
    Ok(())
}

pub fn seed(args: SeedArgs) -> Result<()> {
    let config = args.stream.into_config()?;
    let tickers: Vec<Ticker> = if args.tickers.is_empty() {
        let mut rng = rng_from(args.seed);
        default_tickers(&config.ticker_prefix, args.count, &mut rng)
    } else {
        args.tickers
            .into_iter()
            .map(|(id, price)| Ticker::new(id, price))
            .collect()
    };

    let mut store = JsonFileStore::open(&config.store_path)?;
    for ticker in &tickers {
        store.put(ticker)?;
        println!("{ticker}");
    }

    logging::info(
        "store.seed",
        "Seeded opening prices",
        json!({
            "tickers": tickers.len(),
            "path": store.path().display().to_string(),
        }),
    );
    Ok(())
}

pub fn notify(args: NotifyArgs) -> Result<()> {
    let config = args.stream.into_config()?;
    let event = args.event.load()?;
    let notice = FailureNotice::for_event(&config.notify_topic, &config.operator_name, &event)?;

    notifier_for(&config).publish(&notice)?;
    println!("{}", serde_json::to_string_pretty(&notice)?);
    Ok(())
}
