//! Change records kept by the history ledger.
//!
//! A [`ChangeRecord`] is created once per successfully applied batch and never
//! mutated afterwards. The `before = None iff kind = Create` rule is enforced
//! by the constructors and re-checked when a record is deserialized from a
//! journal, so a `ChangeRecord` in hand is always well-formed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Proposed content keyed by target path, iterated in sorted path order.
pub type ProposalSet = BTreeMap<PathBuf, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Modify,
    Create,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modify => "modify",
            Self::Create => "create",
        }
    }
}

/// Content of one file on either side of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub before: Option<String>,
    pub after: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeRecordError {
    #[error("change record has no files")]
    Empty,
    #[error("{kind} record for {path} has inconsistent `before` content")]
    InconsistentBefore { kind: &'static str, path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChangeRecord")]
pub struct ChangeRecord {
    timestamp: SystemTime,
    kind: ChangeKind,
    files: BTreeMap<PathBuf, FileSnapshot>,
}

#[derive(Deserialize)]
struct RawChangeRecord {
    timestamp: SystemTime,
    kind: ChangeKind,
    files: BTreeMap<PathBuf, FileSnapshot>,
}

impl TryFrom<RawChangeRecord> for ChangeRecord {
    type Error = ChangeRecordError;

    fn try_from(raw: RawChangeRecord) -> Result<Self, Self::Error> {
        Self::validate(raw.kind, &raw.files)?;
        Ok(Self {
            timestamp: raw.timestamp,
            kind: raw.kind,
            files: raw.files,
        })
    }
}

impl ChangeRecord {
    /// Record of overwritten files. Every entry carries its prior content.
    pub fn modify(
        timestamp: SystemTime,
        files: impl IntoIterator<Item = (PathBuf, String, String)>,
    ) -> Result<Self, ChangeRecordError> {
        let files = files
            .into_iter()
            .map(|(path, before, after)| {
                (
                    path,
                    FileSnapshot {
                        before: Some(before),
                        after,
                    },
                )
            })
            .collect();
        Self::build(timestamp, ChangeKind::Modify, files)
    }

    /// Record of freshly created files. No entry has prior content.
    pub fn create(
        timestamp: SystemTime,
        files: impl IntoIterator<Item = (PathBuf, String)>,
    ) -> Result<Self, ChangeRecordError> {
        let files = files
            .into_iter()
            .map(|(path, after)| {
                (
                    path,
                    FileSnapshot {
                        before: None,
                        after,
                    },
                )
            })
            .collect();
        Self::build(timestamp, ChangeKind::Create, files)
    }

    fn build(
        timestamp: SystemTime,
        kind: ChangeKind,
        files: BTreeMap<PathBuf, FileSnapshot>,
    ) -> Result<Self, ChangeRecordError> {
        Self::validate(kind, &files)?;
        Ok(Self {
            timestamp,
            kind,
            files,
        })
    }

    fn validate(
        kind: ChangeKind,
        files: &BTreeMap<PathBuf, FileSnapshot>,
    ) -> Result<(), ChangeRecordError> {
        if files.is_empty() {
            return Err(ChangeRecordError::Empty);
        }
        let want_before = kind == ChangeKind::Modify;
        if let Some((path, _)) = files
            .iter()
            .find(|(_, snap)| snap.before.is_some() != want_before)
        {
            return Err(ChangeRecordError::InconsistentBefore {
                kind: kind.as_str(),
                path: path.display().to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    #[must_use]
    pub fn files(&self) -> &BTreeMap<PathBuf, FileSnapshot> {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeKind, ChangeRecord, ChangeRecordError};
    use std::path::PathBuf;
    use std::time::SystemTime;

    #[test]
    fn modify_keeps_before_content() {
        let record = ChangeRecord::modify(
            SystemTime::UNIX_EPOCH,
            [(PathBuf::from("a.txt"), "old".to_string(), "new".to_string())],
        )
        .unwrap();
        assert_eq!(record.kind(), ChangeKind::Modify);
        let snap = &record.files()[&PathBuf::from("a.txt")];
        assert_eq!(snap.before.as_deref(), Some("old"));
        assert_eq!(snap.after, "new");
    }

    #[test]
    fn empty_record_rejected() {
        let err = ChangeRecord::create(SystemTime::UNIX_EPOCH, Vec::new()).unwrap_err();
        assert_eq!(err, ChangeRecordError::Empty);
    }

    #[test]
    fn journal_roundtrip_preserves_record() {
        let record = ChangeRecord::create(
            SystemTime::UNIX_EPOCH,
            [(PathBuf::from("new.rs"), "fn f() {}\n".to_string())],
        )
        .unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"create\""));
        let back: ChangeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn deserialize_rejects_create_with_before() {
        let json = r#"{
            "timestamp": {"secs_since_epoch": 0, "nanos_since_epoch": 0},
            "kind": "create",
            "files": {"x": {"before": "old", "after": "new"}}
        }"#;
        assert!(serde_json::from_str::<ChangeRecord>(json).is_err());
    }

    #[test]
    fn deserialize_rejects_modify_without_before() {
        let json = r#"{
            "timestamp": {"secs_since_epoch": 0, "nanos_since_epoch": 0},
            "kind": "modify",
            "files": {"x": {"before": null, "after": "new"}}
        }"#;
        assert!(serde_json::from_str::<ChangeRecord>(json).is_err());
    }
}
