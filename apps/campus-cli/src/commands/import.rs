//! `campus import` - run a configured import.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::info;

use campus_import::prelude::*;
use campus_store::MemoryPersonStore;

use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct ImportArgs {
    /// Roster file to import (CSV or JSON per the configuration)
    pub input: PathBuf,

    /// Run configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Compute everything, commit nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Full-sync: delete entries of this source absent from the input
    #[arg(long)]
    pub full_sync: bool,

    /// Override the configured per-record error budget
    #[arg(long, value_name = "N")]
    pub tolerate_errors: Option<usize>,
}

pub async fn execute(args: ImportArgs) -> CliResult<()> {
    let mut config = ImportConfig::load(&args.config)?;
    if args.dry_run {
        config.dry_run = true;
    }
    if args.full_sync {
        config.delete_orphans = true;
    }
    if let Some(budget) = args.tolerate_errors {
        config.tolerate_errors = budget;
    }

    // Demo adapter; directory-backed stores plug in through the same traits
    let store = Arc::new(MemoryPersonStore::new());
    let mut pipeline = ImportPipeline::new(config, store);
    let summary = pipeline.run_file(&args.input).await?;

    info!(
        created = summary.created,
        modified = summary.modified,
        deleted = summary.deleted,
        unchanged = summary.unchanged,
        errors = summary.errors,
        "run finished"
    );
    println!(
        "{:?}: {} created, {} modified, {} deleted, {} unchanged, {} failed",
        summary.status,
        summary.created,
        summary.modified,
        summary.deleted,
        summary.unchanged,
        summary.errors
    );

    match summary.status {
        RunStatus::Completed => Ok(()),
        RunStatus::CompletedWithErrors => Err(CliError::CompletedWithErrors(summary.errors)),
        RunStatus::Aborted => Err(CliError::Aborted(summary.errors)),
    }
}
