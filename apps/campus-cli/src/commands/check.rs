//! `campus check-config` - validate a configuration without importing.

use std::path::PathBuf;

use clap::Args;

use campus_import::prelude::{FieldMapper, ImportConfig};

use crate::error::CliResult;

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Run configuration file
    pub config: PathBuf,
}

pub fn execute(args: CheckConfigArgs) -> CliResult<()> {
    let config = ImportConfig::load(&args.config)?;
    // Compiles every scheme, so template faults surface here
    FieldMapper::new(&config)?;

    println!(
        "configuration ok: {} mapped column(s), {} scheme(s), {} mandatory attribute(s)",
        config.mapping.len(),
        config.schemes.len(),
        config.mandatory_attributes.len()
    );
    Ok(())
}
