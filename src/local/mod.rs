//! Local mode - self-contained storage without a server.
//!
//! Stores state in a `.tkb/` directory within the project:
//! - `ledger.sqlite` - plans, usage, document and image registries
//! - `vectors/` - one LanceDB table per tenant partition
//! - `blobs/` - image blobs (content-addressed)

mod config;
mod db;
mod models;
mod storage;
mod vector;

pub use config::AppConfig;
pub use db::LocalDb;
pub use models::*;
pub use storage::LocalStorage;
pub use vector::{VectorIndex, VectorStore};

use std::path::{Path, PathBuf};

/// The name of the data directory.
pub const DATA_DIR_NAME: &str = ".tkb";

/// Find the `.tkb/` directory by walking up from the given path.
pub fn find_data_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let data_dir = current.join(DATA_DIR_NAME);
        if data_dir.is_dir() {
            return Some(data_dir);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the data directory for the current working directory.
pub fn get_data_dir() -> Option<PathBuf> {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_data_root(&cwd))
}

/// Paths inside a data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn ledger(&self) -> PathBuf {
        self.root.join("ledger.sqlite")
    }

    pub fn vectors(&self) -> PathBuf {
        self.root.join("vectors")
    }

    pub fn blobs(&self) -> PathBuf {
        self.root.join("blobs")
    }
}
