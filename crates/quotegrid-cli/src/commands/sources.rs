use quotegrid_core::BatchConfig;
use serde::Serialize;

use quotegrid_core::ProviderStatus;

use crate::cli::Cli;
use crate::error::CliError;

use super::{emit, fetcher};

#[derive(Debug, Serialize)]
struct SourcesReport {
    sources: Vec<ProviderStatus>,
}

pub fn run(cli: &Cli) -> Result<(), CliError> {
    let sources = fetcher(cli, BatchConfig::default()).provider_status();
    emit(&SourcesReport { sources }, cli.pretty)
}
