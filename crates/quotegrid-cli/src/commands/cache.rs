use serde::Serialize;

use quotegrid_core::{FileQuoteCache, ProviderId, Symbol};

use crate::cli::{CacheClearArgs, Cli};
use crate::error::CliError;

use super::emit;

#[derive(Debug, Serialize)]
struct ClearReport {
    removed: usize,
}

pub async fn stats(cli: &Cli) -> Result<(), CliError> {
    let cache = FileQuoteCache::new(&cli.cache_dir);
    emit(&cache.stats().await, cli.pretty)
}

pub async fn clear(cli: &Cli, args: &CacheClearArgs) -> Result<(), CliError> {
    let provider = args
        .provider
        .as_deref()
        .map(str::parse::<ProviderId>)
        .transpose()?;
    let symbol = args
        .ticker
        .as_deref()
        .map(Symbol::parse)
        .transpose()?;

    let cache = FileQuoteCache::new(&cli.cache_dir);
    let removed = cache.clear(provider, symbol.as_ref()).await;
    emit(&ClearReport { removed }, cli.pretty)
}
