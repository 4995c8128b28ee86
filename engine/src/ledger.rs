//! Bounded undo/redo history of applied change records.
//!
//! One cursor splits the record list: records at or before it are applied
//! and undoable, records after it were undone and are redoable. Recording
//! while the cursor is not at the tail abandons the redo branch.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use procoder_types::{ChangeKind, ChangeRecord};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mutator::FileMutator;

const JOURNAL_DIR: &str = ".procoder";
const JOURNAL_FILE: &str = "history.json";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to read history journal {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse history journal {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize history journal: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write history journal {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStep {
    NothingToUndo,
    NothingToRedo,
    /// Every file in the record was restored; the cursor moved.
    Applied { kind: ChangeKind, files: Vec<PathBuf> },
    /// Some files failed; the cursor stayed so the step can be retried.
    Partial {
        kind: ChangeKind,
        succeeded: Vec<PathBuf>,
        failed: Vec<PathBuf>,
    },
}

impl HistoryStep {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Deserialize)]
struct Journal {
    cursor: Option<usize>,
    records: Vec<ChangeRecord>,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    records: Vec<ChangeRecord>,
    /// Index of the newest applied record; `None` means nothing to undo.
    cursor: Option<usize>,
    limit: usize,
    journal: Option<PathBuf>,
}

impl Ledger {
    /// An in-memory ledger holding at most `limit` records (minimum 1).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            cursor: None,
            limit: limit.max(1),
            journal: None,
        }
    }

    /// `<working_dir>/.procoder/history.json`
    #[must_use]
    pub fn journal_path(working_dir: &Path) -> PathBuf {
        working_dir.join(JOURNAL_DIR).join(JOURNAL_FILE)
    }

    /// A ledger persisted to `path`, restored from it if present.
    ///
    /// A missing journal starts empty; an unreadable or corrupt one is
    /// logged and ignored (it is overwritten on the next change).
    #[must_use]
    pub fn load_journal(path: &Path, limit: usize) -> Self {
        let mut ledger = Self::new(limit);
        ledger.journal = Some(path.to_path_buf());

        match read_journal(path) {
            Ok(Some(journal)) => {
                ledger.records = journal.records;
                ledger.cursor = journal.cursor;
                ledger.clamp();
                tracing::info!(
                    path = %path.display(),
                    records = ledger.records.len(),
                    "Restored change history"
                );
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("{err}; starting with empty history"),
        }
        ledger
    }

    #[must_use]
    pub fn journal(&self) -> Option<&Path> {
        self.journal.as_deref()
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.next_index() < self.records.len()
    }

    /// Number of undone records that can be redone.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.records.len() - self.next_index()
    }

    /// The record an undo would revert.
    #[must_use]
    pub fn peek_undo(&self) -> Option<&ChangeRecord> {
        self.cursor.map(|idx| &self.records[idx])
    }

    /// The record a redo would reapply.
    #[must_use]
    pub fn peek_redo(&self) -> Option<&ChangeRecord> {
        self.records.get(self.next_index())
    }

    /// Append a record, discarding any redoable tail and evicting the oldest
    /// records beyond the limit. The cursor ends on the new record.
    pub fn record(&mut self, record: ChangeRecord) {
        let keep = self.next_index();
        if keep < self.records.len() {
            tracing::debug!(
                dropped = self.records.len() - keep,
                "New change abandons redo history"
            );
            self.records.truncate(keep);
        }

        self.records.push(record);
        if self.records.len() > self.limit {
            let overflow = self.records.len() - self.limit;
            self.records.drain(0..overflow);
        }
        self.cursor = Some(self.records.len() - 1);
        self.persist();
    }

    /// Revert the record at the cursor.
    ///
    /// Modify records get their `before` content back (no backups); create
    /// records have their files deleted. Per-file failures do not stop the
    /// remaining files, but the cursor only moves if every file succeeded.
    pub fn undo(&mut self, mutator: &FileMutator) -> HistoryStep {
        let Some(idx) = self.cursor else {
            return HistoryStep::NothingToUndo;
        };
        let record = &self.records[idx];
        let kind = record.kind();

        let (succeeded, failed) = partition_results(record, |path, snapshot| match &snapshot.before {
            Some(before) => mutator.write(path, before, false),
            None => mutator.remove(path),
        });

        if !failed.is_empty() {
            tracing::warn!(failed = failed.len(), "Undo incomplete; cursor unchanged");
            return HistoryStep::Partial {
                kind,
                succeeded,
                failed,
            };
        }

        self.cursor = idx.checked_sub(1);
        tracing::info!(kind = kind.as_str(), files = succeeded.len(), "Undo applied");
        self.persist();
        HistoryStep::Applied {
            kind,
            files: succeeded,
        }
    }

    /// Reapply the record after the cursor by writing each file's `after`
    /// content. The cursor only moves if every write succeeded.
    pub fn redo(&mut self, mutator: &FileMutator) -> HistoryStep {
        let idx = self.next_index();
        let Some(record) = self.peek_redo() else {
            return HistoryStep::NothingToRedo;
        };
        let kind = record.kind();

        let (succeeded, failed) =
            partition_results(record, |path, snapshot| mutator.write(path, &snapshot.after, false));

        if !failed.is_empty() {
            tracing::warn!(failed = failed.len(), "Redo incomplete; cursor unchanged");
            return HistoryStep::Partial {
                kind,
                succeeded,
                failed,
            };
        }

        self.cursor = Some(idx);
        tracing::info!(kind = kind.as_str(), files = succeeded.len(), "Redo applied");
        self.persist();
        HistoryStep::Applied {
            kind,
            files: succeeded,
        }
    }

    /// Operator-facing listing, newest first.
    #[must_use]
    pub fn history_summary(&self) -> String {
        if self.records.is_empty() {
            return "No change history.".to_string();
        }

        let mut out = format!(
            "Change history ({} of max {}, newest first):\n",
            self.records.len(),
            self.limit
        );
        for (idx, record) in self.records.iter().enumerate().rev() {
            let when = chrono::DateTime::<chrono::Utc>::from(record.timestamp())
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S");
            let names: Vec<String> = record
                .paths()
                .map(|p| {
                    p.file_name()
                        .map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned())
                })
                .collect();
            let marker = match self.cursor {
                Some(cursor) if cursor == idx => "  <- cursor",
                Some(cursor) if idx > cursor => "  (undone)",
                None => "  (undone)",
                _ => "",
            };
            let _ = writeln!(
                out,
                "  #{n}  {when}  {kind}  files:{count} [{names}]{marker}",
                n = idx + 1,
                kind = record.kind().as_str(),
                count = names.len(),
                names = names.join(", "),
            );
        }

        if self.can_redo() {
            let _ = write!(out, "Redo available ({} record(s)).", self.redo_depth());
        } else {
            out.push_str("Nothing to redo.");
        }
        out
    }

    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |idx| idx + 1)
    }

    /// Enforce the limit and cursor range on restored state.
    fn clamp(&mut self) {
        if self.records.len() > self.limit {
            let overflow = self.records.len() - self.limit;
            self.records.drain(0..overflow);
            self.cursor = self.cursor.and_then(|c| c.checked_sub(overflow));
        }
        if let Some(cursor) = self.cursor
            && cursor >= self.records.len()
        {
            self.cursor = self.records.len().checked_sub(1);
        }
    }

    fn persist(&self) {
        let Some(path) = &self.journal else {
            return;
        };
        if let Err(err) = self.write_journal(path) {
            tracing::warn!("{err}");
        }
    }

    fn write_journal(&self, path: &Path) -> Result<(), LedgerError> {
        let journal = JournalRef {
            cursor: self.cursor,
            records: &self.records,
        };
        let bytes = serde_json::to_vec_pretty(&journal)?;
        procoder_utils::atomic_write(path, &bytes).map_err(|source| LedgerError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "History journal written");
        Ok(())
    }
}

#[derive(Serialize)]
struct JournalRef<'a> {
    cursor: Option<usize>,
    records: &'a [ChangeRecord],
}

fn read_journal(path: &Path) -> Result<Option<Journal>, LedgerError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(LedgerError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| LedgerError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn partition_results(
    record: &ChangeRecord,
    mut apply: impl FnMut(&Path, &procoder_types::FileSnapshot) -> bool,
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for (path, snapshot) in record.files() {
        if apply(path, snapshot) {
            succeeded.push(path.clone());
        } else {
            tracing::warn!(path = %path.display(), "History step failed for file");
            failed.push(path.clone());
        }
    }
    (succeeded, failed)
}
