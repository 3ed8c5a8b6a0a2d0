use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::constants::DELIVERY_PATH;
use crate::sink::{read_delivered, DeliveredRecord};

#[derive(Debug, Args, Clone)]
pub struct TailArgs {
    /// Delivery stream file to read
    #[arg(short, long, default_value = DELIVERY_PATH)]
    pub path: PathBuf,

    /// Filter records to a single ticker (e.g. Index_1)
    #[arg(short, long)]
    pub ticker: Option<String>,

    /// Print only the last N matching records
    #[arg(short, long)]
    pub limit: Option<usize>,
}

pub fn run(args: TailArgs) -> Result<()> {
    let delivered = read_delivered(&args.path)?;
    let lines = select_lines(&delivered, args.ticker.as_deref(), args.limit);

    println!("{} record(s) from {}", lines.len(), args.path.display());
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

fn select_lines(
    delivered: &[DeliveredRecord],
    ticker: Option<&str>,
    limit: Option<usize>,
) -> Vec<String> {
    let mut lines: Vec<String> = delivered
        .iter()
        .filter_map(|entry| match entry.record.decode() {
            Some(tick) => {
                if ticker.is_some_and(|filter| filter != tick.ticker) {
                    return None;
                }
                Some(format!(
                    "{:>32} | {:>12} | {:>12.4} | {}",
                    tick.timestamp.to_rfc3339(),
                    tick.ticker,
                    tick.price,
                    entry.stream
                ))
            }
            // free-text payloads only support a substring filter
            None => match ticker {
                Some(filter) if !entry.record.data.contains(filter) => None,
                _ => Some(format!("{} | {}", entry.record.data, entry.stream)),
            },
        })
        .collect();

    if let Some(limit) = limit {
        let skip = lines.len().saturating_sub(limit);
        lines.drain(..skip);
    }
    lines
}
