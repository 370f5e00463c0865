//! Rolling, timestamped copies of the history file.

use std::fs;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use tracing::info;

use crate::error::{Error, Result};
use crate::utils::time::now;

/// Number of backups kept by default.
pub const DEFAULT_KEEP: usize = 10;

const PREFIX: &str = "history_";
const SUFFIX: &str = ".json";

/// Copies a file into a backup directory and prunes old copies.
#[derive(Debug, Clone)]
pub struct BackupRotation {
    dir: PathBuf,
    keep: usize,
}

impl BackupRotation {
    /// Rotation into `dir` keeping [`DEFAULT_KEEP`] copies.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            keep: DEFAULT_KEEP,
        }
    }

    /// Sets how many copies are kept.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    /// The backup directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the backup directory and prune to the retention limit.
    ///
    /// Returns `None` when `source` does not exist.
    pub fn create(&self, source: &Path) -> Result<Option<PathBuf>> {
        if !source.exists() {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)
            .map_err(|err| Error::io(format!("failed to create {}", self.dir.display()), err))?;
        let target = self.dir.join(backup_name());
        fs::copy(source, &target).map_err(|err| {
            Error::io(
                format!("failed to copy {} to {}", source.display(), target.display()),
                err,
            )
        })?;
        self.prune()?;
        Ok(Some(target))
    }

    /// Existing backups, oldest first.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir)
            .map_err(|err| Error::io(format!("failed to read {}", self.dir.display()), err))?;
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(PREFIX) && name.ends_with(SUFFIX) && entry.path().is_file() {
                backups.push(entry.path());
            }
        }
        // The embedded timestamp is fixed-width, so name order is age order.
        backups.sort();
        Ok(backups)
    }

    fn prune(&self) -> Result<()> {
        let backups = self.list()?;
        if backups.len() <= self.keep {
            return Ok(());
        }
        let excess = backups.len() - self.keep;
        for oldest in &backups[..excess] {
            fs::remove_file(oldest)
                .map_err(|err| Error::io(format!("failed to remove {}", oldest.display()), err))?;
            info!(path = %oldest.display(), "pruned old history backup");
        }
        Ok(())
    }
}

fn backup_name() -> String {
    let stamp = now()
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]_[subsecond digits:6]"
        ))
        .unwrap_or_else(|_| now().unix_timestamp_nanos().to_string());
    format!("{PREFIX}{stamp}{SUFFIX}")
}
