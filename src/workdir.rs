//! Temporary working directory
//!
//! The downloaded image and everything derived from it live in a
//! [`WorkDir`]. Dropping it removes the directory, so every exit path out
//! of the pipeline (success, error or early return) releases it.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::ProvisionError;

const PREFIX: &str = "fleet-provision-";

/// Scoped working directory, removed on drop
#[derive(Debug)]
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl WorkDir {
    /// Create a fresh directory under `parent` (system temp dir if `None`)
    pub fn create(parent: Option<&Path>) -> Result<Self, ProvisionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        let path = dir.path().to_path_buf();
        debug!("Created working directory {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the directory in place when dropped
    pub fn keep(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.keep();
            info!("Keeping working directory {}", path.display());
        }
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.dir.is_some() {
            debug!("Removing working directory {}", self.path.display());
        }
    }
}
