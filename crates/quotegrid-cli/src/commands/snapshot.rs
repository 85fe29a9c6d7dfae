use serde::Serialize;

use quotegrid_core::SnapshotStore;

use crate::cli::{Cli, SnapshotCleanupArgs};
use crate::error::CliError;

use super::emit;

#[derive(Debug, Serialize)]
struct CleanupReport {
    removed: usize,
}

pub async fn cleanup(cli: &Cli, args: &SnapshotCleanupArgs) -> Result<(), CliError> {
    let store = SnapshotStore::new(&cli.cache_dir);
    let removed = store.cleanup(args.max_age_days).await;
    emit(&CleanupReport { removed }, cli.pretty)
}
