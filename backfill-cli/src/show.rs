//! Show command: print one stored record as JSON.

use std::io::Write;

use backfill_core::RecordId;
use backfill_data::SqliteRecordStore;
use camino::Utf8PathBuf;
use clap::Parser;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_DATABASE, ARG_RECORD_ID, CliError, ENV_SHOW_DATABASE, ENV_SHOW_ID, require_existing,
    runtime, write_json,
};

/// CLI arguments for the `show` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(about = "Print a stored record by identity")]
#[ortho_config(prefix = "BACKFILL")]
pub(crate) struct ShowArgs {
    /// Path to the SQLite record store.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Identity of the record; integers are matched as numeric ids.
    #[arg(long = ARG_RECORD_ID, value_name = "id")]
    #[serde(default)]
    pub(crate) id: Option<String>,
}

impl ShowArgs {
    pub(crate) fn into_config(self) -> Result<ShowConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        ShowConfig::try_from(merged)
    }
}

/// Resolved `show` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ShowConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) id: RecordId,
}

impl TryFrom<ShowArgs> for ShowConfig {
    type Error = CliError;

    fn try_from(args: ShowArgs) -> Result<Self, Self::Error> {
        let database = args.database.ok_or(CliError::MissingArgument {
            field: ARG_DATABASE,
            env: ENV_SHOW_DATABASE,
        })?;
        let raw = args.id.ok_or(CliError::MissingArgument {
            field: ARG_RECORD_ID,
            env: ENV_SHOW_ID,
        })?;
        let id = raw.parse::<RecordId>().unwrap_or_else(|never| match never {});
        Ok(Self { database, id })
    }
}

pub(super) fn run_show(args: ShowArgs) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    run_show_with(args, &mut stdout)
}

pub(super) fn run_show_with(args: ShowArgs, writer: &mut dyn Write) -> Result<(), CliError> {
    let config = args.into_config()?;
    // Opening a missing path would create an empty store.
    require_existing(&config.database, ARG_DATABASE)?;
    let store = SqliteRecordStore::open(&config.database)?;
    let record = runtime()?
        .block_on(store.find_by_id(&config.id))?
        .ok_or_else(|| CliError::RecordNotFound {
            id: config.id.clone(),
        })?;
    write_json(writer, &record)
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ShowConfig, CliError> {
    let merged = ShowArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ShowConfig::try_from(merged)
}
