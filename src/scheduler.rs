use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::handler::InvocationReport;
use crate::logging;

pub const EVENT_SOURCE: &str = "ticker-stream.scheduler";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOptions {
    pub period: Duration,
    pub max_invocations: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub invocations: usize,
    pub failures: usize,
}

/// Payload handed to each scheduled invocation and echoed back in failure
/// notices.
pub fn scheduled_event(sequence: usize, time: DateTime<Utc>) -> Value {
    json!({
        "source": EVENT_SOURCE,
        "detail-type": "Scheduled Event",
        "time": time.to_rfc3339(),
        "sequence": sequence,
    })
}

/// Fires `invoke` once per period until SIGINT/SIGTERM or the invocation cap.
pub async fn run<F>(options: ScheduleOptions, invoke: F) -> Result<ScheduleSummary>
where
    F: FnMut(&Value, DateTime<Utc>) -> Result<InvocationReport>,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals_task = tokio::spawn(handle_signals(shutdown_tx));

    let result = run_until(options, shutdown_rx, invoke).await;

    signals_task.abort();
    let _ = signals_task.await;
    result
}

/// Same loop as [`run`], stopped by flipping `shutdown` to `true` instead of
/// by process signals.
pub async fn run_until<F>(
    options: ScheduleOptions,
    mut shutdown: watch::Receiver<bool>,
    mut invoke: F,
) -> Result<ScheduleSummary>
where
    F: FnMut(&Value, DateTime<Utc>) -> Result<InvocationReport>,
{
    if options.period.is_zero() {
        bail!("schedule period must be greater than zero");
    }

    let mut summary = ScheduleSummary::default();
    if options.max_invocations == Some(0) {
        return Ok(summary);
    }

    let mut ticker = time::interval(options.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    logging::info(
        "scheduler.start",
        "Scheduler started",
        json!({
            "period_ms": options.period.as_millis() as u64,
            "max_invocations": options.max_invocations,
        }),
    );

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let now = Utc::now();
        let event = scheduled_event(summary.invocations, now);
        summary.invocations += 1;

        match invoke(&event, now) {
            Ok(report) => logging::info(
                "scheduler.tick",
                "Scheduled invocation completed",
                json!({
                    "sequence": summary.invocations - 1,
                    "records": report.records,
                    "delivered": report.delivered,
                }),
            ),
            Err(err) => {
                summary.failures += 1;
                logging::error(
                    "scheduler.tick",
                    "Scheduled invocation failed",
                    json!({
                        "sequence": summary.invocations - 1,
                        "error": format!("{err:#}"),
                    }),
                );
            }
        }

        if let Some(max) = options.max_invocations {
            if summary.invocations >= max {
                logging::info(
                    "scheduler.limit",
                    "Scheduler reached its invocation limit",
                    json!({ "max_invocations": max }),
                );
                break;
            }
        }
    }

    logging::info(
        "scheduler.stop",
        "Scheduler stopped",
        json!({
            "invocations": summary.invocations,
            "failures": summary.failures,
        }),
    );
    Ok(summary)
}

async fn handle_signals(shutdown_tx: watch::Sender<bool>) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    logging::info(
        "signal.received",
        "Shutdown signal received, stopping after the current invocation",
        json!({ "signal": name }),
    );
    let _ = shutdown_tx.send(true);
    Ok(())
}
