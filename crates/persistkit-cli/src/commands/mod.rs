//! CLI commands

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use persistkit_store::StoreConfig;

pub mod inspect;
pub mod outbox;
pub mod verify;

/// Which store file a command works on
#[derive(Debug, Args)]
pub struct StoreTarget {
    /// Store configuration (TOML)
    #[arg(long, conflicts_with = "path")]
    pub config: Option<PathBuf>,

    /// Table file, when there is no configuration
    #[arg(long, conflicts_with = "config")]
    pub path: Option<PathBuf>,
}

impl StoreTarget {
    /// Path of the table file
    pub fn table_path(&self) -> Result<PathBuf> {
        match (&self.config, &self.path) {
            (Some(config), _) => {
                let loaded = StoreConfig::load(config)
                    .with_context(|| format!("loading {}", config.display()))?;
                Ok(loaded.path)
            }
            (None, Some(path)) => Ok(path.clone()),
            (None, None) => bail!("Must specify either --config or --path"),
        }
    }
}
