use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StateLoadError {
    /// The file (and its backup) exist but hold garbage. Recoverable:
    /// callers start empty and log at critical severity.
    #[error("state file corrupt: {0}")]
    Corrupt(String),
    /// The file exists but cannot be read at the I/O level, and the
    /// backup cannot rescue it. This aborts startup with exit code 2.
    #[error("state file unreadable: {0}")]
    Unreadable(String),
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".bak");
    PathBuf::from(os)
}

/// Write `value` so that any concurrent or post-crash reader observes
/// either the previous content or the new content, never a torn file:
/// sibling temp file, fsync, rotate the live file to a single `.bak`,
/// rename the temp over the live path.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("failed creating state dir {}", parent.display()))?;

    let payload =
        serde_json::to_vec_pretty(value).context("failed serializing state document")?;

    let mut tmp = NamedTempFile::new_in(&parent)
        .with_context(|| format!("failed creating temp file in {}", parent.display()))?;
    tmp.write_all(&payload)
        .with_context(|| format!("failed writing temp state for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("failed fsync of temp state for {}", path.display()))?;

    if path.exists() {
        if let Err(error) = fs::copy(path, backup_path(path)) {
            warn!(path = %path.display(), error = %error, "failed rotating state backup");
        }
    }

    tmp.persist(path)
        .with_context(|| format!("failed renaming temp state over {}", path.display()))?;
    Ok(())
}

/// Load a JSON document, falling back to its `.bak` when the primary is
/// corrupt. `Ok(None)` means neither file exists yet.
pub fn load_json_with_backup<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, StateLoadError> {
    match fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(parse_error) => {
                warn!(
                    path = %path.display(),
                    error = %parse_error,
                    "primary state file corrupt, trying backup"
                );
                load_backup(path, parse_error.to_string())
            }
        },
        Err(io_error) if io_error.kind() == ErrorKind::NotFound => Ok(None),
        Err(io_error) => match try_backup(path) {
            BackupOutcome::Loaded(value) => Ok(Some(value)),
            BackupOutcome::Missing | BackupOutcome::Corrupt(_) => Err(
                StateLoadError::Unreadable(format!("{}: {}", path.display(), io_error)),
            ),
            BackupOutcome::Unreadable(backup_error) => Err(StateLoadError::Unreadable(format!(
                "{}: {} (backup: {})",
                path.display(),
                io_error,
                backup_error
            ))),
        },
    }
}

fn load_backup<T: DeserializeOwned>(
    path: &Path,
    primary_error: String,
) -> Result<Option<T>, StateLoadError> {
    match try_backup(path) {
        BackupOutcome::Loaded(value) => Ok(Some(value)),
        BackupOutcome::Missing => Err(StateLoadError::Corrupt(primary_error)),
        BackupOutcome::Corrupt(backup_error) => Err(StateLoadError::Corrupt(format!(
            "{primary_error} (backup: {backup_error})"
        ))),
        BackupOutcome::Unreadable(backup_error) => Err(StateLoadError::Corrupt(format!(
            "{primary_error} (backup unreadable: {backup_error})"
        ))),
    }
}

enum BackupOutcome<T> {
    Loaded(T),
    Missing,
    Corrupt(String),
    Unreadable(String),
}

fn try_backup<T: DeserializeOwned>(path: &Path) -> BackupOutcome<T> {
    let backup = backup_path(path);
    match fs::read(&backup) {
        Ok(bytes) => match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => BackupOutcome::Loaded(value),
            Err(error) => BackupOutcome::Corrupt(error.to_string()),
        },
        Err(error) if error.kind() == ErrorKind::NotFound => BackupOutcome::Missing,
        Err(error) => BackupOutcome::Unreadable(error.to_string()),
    }
}
