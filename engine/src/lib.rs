//! Core engine for procoder: the response-to-file-change pipeline.
//!
//! Model output flows through extraction, approval, mutation and the history
//! ledger, then optionally to Git:
//!
//! ```text
//! response -> extract -> approve -> apply -> ledger -> git
//! ```
//!
//! This crate has no terminal or network dependencies; the operator is
//! reached through [`Prompter`] and Git through [`GitBridge`].

mod approval;
mod commands;
mod extract;
mod git;
mod ledger;
mod mutator;
mod prompt;
mod session;

pub use approval::ApprovalGate;
pub use commands::{Command, CommandSpec, command_help, command_help_summary, command_specs};
pub use extract::{ExtractionReport, extract, extract_with, match_hint, normalize_hint};
pub use git::{
    CliGit, GitBridge, GitError, GitOutcome, GitPolicy, default_commit_message, repo_relative,
    stage_and_commit,
};
pub use ledger::{HistoryStep, Ledger, LedgerError};
pub use mutator::{FileMutator, MutationError, backup_path};
pub use prompt::{PromptError, Prompter, ScriptedPrompter, Shown, confirm};
pub use session::{CommandOutcome, Session, TurnReport};

// Re-export from crates for public API
pub use procoder_config::Settings;
pub use procoder_context::{Conversation, KnownFiles, LoadError, LoadOutcome, TokenCounter};
pub use procoder_types::{
    ApprovalMode, ChangeKind, ChangeRecord, DuplicatePolicy, FileSnapshot, HintMatch, Message,
    NonEmptyString, ProposalSet, Role, UnresolvedBlock, UnresolvedReason,
};
pub use procoder_utils::unified_diff;
