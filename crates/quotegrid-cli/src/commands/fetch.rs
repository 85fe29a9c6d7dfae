use quotegrid_core::BatchConfig;

use crate::cli::{Cli, FetchArgs};
use crate::error::CliError;

use super::{emit, fetcher};

pub async fn run(cli: &Cli, args: &FetchArgs) -> Result<(), CliError> {
    let config = BatchConfig {
        use_demo: !args.no_demo,
        ..BatchConfig::default()
    };

    let records = fetcher(cli, config).fetch_all(&args.tickers).await?;
    emit(&records, cli.pretty)
}
