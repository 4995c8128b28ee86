//! Core domain types for procoder.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

mod change;
mod sanitize;

pub use change::{ChangeKind, ChangeRecord, ChangeRecordError, FileSnapshot, ProposalSet};
pub use sanitize::sanitize_terminal_text;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Error)]
#[error("message content must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Conversation Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A chat message as sent to the model provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: NonEmptyString,
}

impl Message {
    #[must_use]
    pub fn system(content: NonEmptyString) -> Self {
        Self {
            role: Role::System,
            content,
        }
    }

    #[must_use]
    pub fn user(content: NonEmptyString) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    #[must_use]
    pub fn assistant(content: NonEmptyString) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }
}

// ============================================================================
// Edit Policy
// ============================================================================

/// How much the operator is asked before edits touch the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalMode {
    /// Edits are never applied.
    ReadOnly,
    /// Per-file prompt; targets outside the working directory need extra permission.
    #[default]
    Auto,
    /// Every change with a non-empty diff is accepted without prompting.
    FullAccess,
}

impl ApprovalMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "read-only" | "readonly" | "read" => Some(Self::ReadOnly),
            "auto" => Some(Self::Auto),
            "full-access" | "full" => Some(Self::FullAccess),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::Auto => "auto",
            Self::FullAccess => "full-access",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ReadOnly => "no edits are applied",
            Self::Auto => "ask before each edit",
            Self::FullAccess => "apply edits without asking",
        }
    }
}

/// What to do when several blocks in one response target the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    LastWins,
    FirstWins,
    /// Drop every block for the contested target.
    Reject,
}

impl DuplicatePolicy {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "last_wins" | "last" => Some(Self::LastWins),
            "first_wins" | "first" => Some(Self::FirstWins),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LastWins => "last_wins",
            Self::FirstWins => "first_wins",
            Self::Reject => "reject",
        }
    }
}

/// One operator answer at the approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    /// Show the full proposed content and ask again.
    Inspect,
    /// Drop the whole batch.
    Abort,
}

impl Decision {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Some(Self::Accept),
            "n" | "no" => Some(Self::Reject),
            "d" | "details" => Some(Self::Inspect),
            "q" | "quit" => Some(Self::Abort),
            _ => None,
        }
    }
}

// ============================================================================
// Extraction Results
// ============================================================================

/// Outcome of resolving a filename hint against the known files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintMatch {
    Matched(PathBuf),
    /// Path-like hint with no known counterpart: a new-file proposal.
    AmbiguousNewFile(String),
    Unmatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// The hint matched no known file and did not look like a path.
    UnmatchedHint,
    /// No hint, and more than one (or zero) files are known.
    AmbiguousNoHint,
    /// Dropped by [`DuplicatePolicy::Reject`].
    DuplicateTarget,
}

impl UnresolvedReason {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::UnmatchedHint => "filename hint matches no loaded file",
            Self::AmbiguousNoHint => "no filename hint and several files are loaded",
            Self::DuplicateTarget => "several blocks target the same file",
        }
    }
}

/// A code block the extractor could not attribute to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedBlock {
    pub hint: Option<String>,
    pub reason: UnresolvedReason,
    pub content: String,
}
