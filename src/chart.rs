use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use textplots::{Chart, Plot, Shape};

use crate::constants::DELIVERY_PATH;
use crate::sink::{read_delivered, DeliveredRecord};

#[derive(Debug, Args, Clone)]
pub struct ChartArgs {
    /// Delivery stream file to read
    #[arg(short, long, default_value = DELIVERY_PATH)]
    pub path: PathBuf,

    /// Plot only the provided ticker
    #[arg(short, long)]
    pub ticker: Option<String>,

    /// Chart width in characters
    #[arg(long, default_value_t = 120)]
    pub width: u32,

    /// Chart height in characters
    #[arg(long, default_value_t = 30)]
    pub height: u32,
}

pub fn run(args: ChartArgs) -> Result<()> {
    let delivered = read_delivered(&args.path)?;
    let series = collect_series(&delivered);

    if series.is_empty() {
        bail!(
            "no JSON tick records in {}; legacy payloads cannot be charted",
            args.path.display()
        );
    }

    let (ticker, points) = if let Some(ticker) = &args.ticker {
        let Some(points) = series.get(ticker) else {
            bail!("no records delivered for ticker {ticker}");
        };
        (ticker.clone(), points.clone())
    } else {
        let Some(busiest) = series.into_iter().max_by(|a, b| {
            a.1.len().cmp(&b.1.len()).then_with(|| b.0.cmp(&a.0))
        }) else {
            bail!("no records delivered");
        };
        busiest
    };

    if points.len() < 2 {
        bail!("not enough data points to render a chart");
    }

    render_chart(&ticker, points, args.width, args.height);
    Ok(())
}

/// Groups decodable records by ticker as `(seconds since first record, price)`.
fn collect_series(delivered: &[DeliveredRecord]) -> HashMap<String, Vec<(f64, f64)>> {
    let ticks: Vec<_> = delivered
        .iter()
        .filter_map(|entry| entry.record.decode())
        .collect();
    let Some(origin) = ticks.iter().map(|tick| tick.timestamp).min() else {
        return HashMap::new();
    };

    let mut series: HashMap<String, Vec<(f64, f64)>> = HashMap::new();
    for tick in ticks {
        let elapsed = (tick.timestamp - origin).num_milliseconds() as f64 / 1000.0;
        series
            .entry(tick.ticker)
            .or_default()
            .push((elapsed, tick.price));
    }
    series
}

fn render_chart(ticker: &str, mut points: Vec<(f64, f64)>, width: u32, height: u32) {
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let max_time = points.last().map(|(t, _)| *t).unwrap_or_default().max(1e-3);
    println!(
        "Rendering chart for {ticker} ({} samples) spanning {:.0}s",
        points.len(),
        max_time
    );

    let min_price = points.iter().map(|(_, p)| *p).fold(f64::INFINITY, f64::min);
    let max_price = points
        .iter()
        .map(|(_, p)| *p)
        .fold(f64::NEG_INFINITY, f64::max);
    println!("Price range: {:.4} → {:.4}", min_price, max_price);

    let samples: Vec<(f32, f32)> = points
        .into_iter()
        .map(|(t, p)| (t as f32, p as f32))
        .collect();

    Chart::new(width.max(40), height.max(10), 0.0, max_time as f32)
        .lineplot(&Shape::Lines(&samples))
        .display();
    println!();
}
