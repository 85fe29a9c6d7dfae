use quotegrid_core::{BatchConfig, BatchFetcher};
use serde::Serialize;

use crate::cli::{CacheAction, Cli, Command, SnapshotAction};
use crate::error::CliError;

mod cache;
mod fetch;
mod snapshot;
mod sources;

pub async fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Fetch(args) => fetch::run(cli, args).await,
        Command::Sources => sources::run(cli),
        Command::Cache(args) => match &args.action {
            CacheAction::Stats => cache::stats(cli).await,
            CacheAction::Clear(clear) => cache::clear(cli, clear).await,
        },
        Command::Snapshot(args) => match &args.action {
            SnapshotAction::Cleanup(cleanup) => snapshot::cleanup(cli, cleanup).await,
        },
    }
}

/// Build the production fetcher from the CLI's global options.
fn fetcher(cli: &Cli, config: BatchConfig) -> BatchFetcher {
    BatchFetcher::from_env(&cli.cache_dir, &cli.static_csv, config)
}

/// Serialize a command result to stdout, honoring `--pretty`.
fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let body = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{body}");
    Ok(())
}
