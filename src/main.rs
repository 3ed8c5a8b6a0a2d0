use anyhow::Result;
use clap::Parser;
use ticker_stream::chart;
use ticker_stream::cli::{self, Cli};
use ticker_stream::commands;
use ticker_stream::tail;

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command() {
        cli::Command::Run(args) => commands::run(args),
        cli::Command::Schedule(args) => commands::schedule(args).await,
        cli::Command::Seed(args) => commands::seed(args),
        cli::Command::Notify(args) => commands::notify(args),
        cli::Command::Tail(args) => tail::run(args),
        cli::Command::Chart(args) => chart::run(args),
    }
}
