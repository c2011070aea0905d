//! Init command - create the local data directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::local::{self, DataPaths, LocalDb, LocalStorage, VectorStore};

#[derive(Args)]
pub struct InitCmd {
    /// Directory to create `.tkb/` in (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

impl InitCmd {
    pub async fn run(&self) -> Result<()> {
        let data_dir = self.path.join(local::DATA_DIR_NAME);
        let existed = data_dir.exists();

        std::fs::create_dir_all(&data_dir).context("Failed to create .tkb directory")?;
        let paths = DataPaths::new(data_dir);

        LocalDb::open(&paths.ledger()).await?;
        VectorStore::open(&paths.vectors()).await?;
        LocalStorage::new(paths.blobs()).await?;

        if existed {
            println!("Data directory already initialized: {}", paths.root.display());
        } else {
            println!("Created {}", paths.root.display());
        }

        let config = local::AppConfig::load()?;
        if !config.has_api_key() {
            println!();
            println!("No API key configured yet. Run: tkb config set-key <key>");
        }

        Ok(())
    }
}
