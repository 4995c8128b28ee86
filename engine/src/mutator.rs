//! Disk writes for approved changes.
//!
//! Public operations report success as `bool` / lists of touched paths; the
//! `try_*` variants carry the typed error for callers that want it.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use procoder_types::{ChangeRecord, ProposalSet};
use thiserror::Error;

use crate::ledger::Ledger;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("{} already exists", path.display())]
    AlreadyExists { path: PathBuf },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to remove {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

/// `<path>.bak`, appended to the full file name.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[derive(Debug, Clone, Copy)]
pub struct FileMutator {
    backup: bool,
}

impl Default for FileMutator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FileMutator {
    #[must_use]
    pub fn new(backup: bool) -> Self {
        Self { backup }
    }

    pub fn write(&self, path: &Path, content: &str, backup: bool) -> bool {
        match self.try_write(path, content, backup) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }

    /// Overwrite `path` with `content`, creating parent directories.
    ///
    /// With `backup`, an existing file is first copied to `<path>.bak`; a
    /// failed backup is logged and does not stop the write.
    pub fn try_write(&self, path: &Path, content: &str, backup: bool) -> Result<(), MutationError> {
        ensure_parent(path)?;

        if backup && path.is_file() {
            let bak = backup_path(path);
            match fs::copy(path, &bak) {
                Ok(_) => tracing::debug!(backup = %bak.display(), "Backup written"),
                Err(err) => {
                    tracing::warn!(path = %path.display(), "Could not write backup: {err}");
                }
            }
        }

        fs::write(path, content).map_err(|source| MutationError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "File written");
        Ok(())
    }

    pub fn create(&self, path: &Path, content: &str) -> bool {
        match self.try_create(path, content) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }

    /// Create a new file. Never overwrites: an existing path is an error
    /// and leaves the disk untouched.
    pub fn try_create(&self, path: &Path, content: &str) -> Result<(), MutationError> {
        if path.exists() {
            return Err(MutationError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        ensure_parent(path)?;

        let write_err = |source: io::Error| MutationError::Write {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AlreadyExists {
                    MutationError::AlreadyExists {
                        path: path.to_path_buf(),
                    }
                } else {
                    write_err(source)
                }
            })?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "File created");
        Ok(())
    }

    pub fn remove(&self, path: &Path) -> bool {
        match self.try_remove(path) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }

    /// Delete a file. Already missing counts as success.
    pub fn try_remove(&self, path: &Path) -> Result<(), MutationError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(MutationError::Remove {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write approved edits to known files.
    ///
    /// Paths missing from `current` are skipped. The first failed write halts
    /// the rest of the batch; earlier writes stay on disk. One modify record
    /// covering every written file goes to `ledger`.
    pub fn apply_changes(
        &self,
        proposals: &ProposalSet,
        current: &ProposalSet,
        ledger: &mut Ledger,
    ) -> Vec<PathBuf> {
        let mut written = Vec::new();
        for (path, content) in proposals {
            let Some(known) = current.get(path) else {
                tracing::warn!(path = %path.display(), "Not a loaded file; change skipped");
                continue;
            };
            let before = fs::read_to_string(path).unwrap_or_else(|_| known.clone());

            if !self.write(path, content, self.backup) {
                tracing::warn!(
                    path = %path.display(),
                    remaining = proposals.len() - written.len() - 1,
                    "Write failed; halting batch"
                );
                break;
            }
            written.push((path.clone(), before, content.clone()));
        }

        let applied: Vec<PathBuf> = written.iter().map(|(p, _, _)| p.clone()).collect();
        if !written.is_empty() {
            match ChangeRecord::modify(SystemTime::now(), written) {
                Ok(record) => ledger.record(record),
                Err(err) => tracing::error!("Could not record change: {err}"),
            }
        }
        applied
    }

    /// Create approved new files. Failures are skipped, not fatal. One
    /// create record covering every created file goes to `ledger`.
    pub fn apply_new_files(&self, proposals: &ProposalSet, ledger: &mut Ledger) -> Vec<PathBuf> {
        let mut created = Vec::new();
        for (path, content) in proposals {
            if self.create(path, content) {
                created.push((path.clone(), content.clone()));
            }
        }

        let paths: Vec<PathBuf> = created.iter().map(|(p, _)| p.clone()).collect();
        if !created.is_empty() {
            match ChangeRecord::create(SystemTime::now(), created) {
                Ok(record) => ledger.record(record),
                Err(err) => tracing::error!("Could not record creation: {err}"),
            }
        }
        paths
    }
}

fn ensure_parent(path: &Path) -> Result<(), MutationError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| MutationError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}
