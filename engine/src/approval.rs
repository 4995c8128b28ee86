//! Per-file operator approval of proposed changes.

use std::path::{Path, PathBuf};

use procoder_types::{ApprovalMode, Decision, ProposalSet};
use procoder_utils::{compute_diff_stats, unified_diff};

use crate::prompt::{PromptError, Prompter, confirm};

const DECISION_HELP: &str = "Please answer y (apply), n (skip), d (details) or q (abort).";

/// Which kind of batch is being approved; changes what is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Edit,
    NewFile,
}

pub struct ApprovalGate {
    mode: ApprovalMode,
    working_dir: PathBuf,
}

impl ApprovalGate {
    #[must_use]
    pub fn new(mode: ApprovalMode, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            working_dir: working_dir.into(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    /// Approve edits to existing files.
    ///
    /// Proposals whose diff against `current` is empty are skipped without a
    /// prompt. Aborting, or losing the input stream, returns an empty map.
    pub fn approve(
        &self,
        proposals: &ProposalSet,
        current: &ProposalSet,
        prompter: &mut dyn Prompter,
    ) -> ProposalSet {
        if self.refuse_read_only(proposals, "edit", prompter) {
            return ProposalSet::new();
        }

        let mut approved = ProposalSet::new();
        for (path, new_content) in proposals {
            let label = self.label(path);
            let Some(old_content) = current.get(path) else {
                tracing::warn!(path = %path.display(), "Proposal for a file that is not loaded");
                prompter.warn(&format!("Skipping {label}: not a loaded file."));
                continue;
            };

            let diff = unified_diff(path, old_content, new_content);
            if diff.is_empty() {
                prompter.info(&format!("No changes detected for {label}; skipping."));
                continue;
            }
            prompter.show_diff(&label, &diff);
            let stats = compute_diff_stats(old_content, new_content);
            prompter.info(&format!(
                "{label}: +{} -{} line(s)",
                stats.additions, stats.deletions
            ));

            match self.decide(path, &label, new_content, BatchKind::Edit, prompter) {
                Ok(true) => {
                    approved.insert(path.clone(), new_content.clone());
                }
                Ok(false) => {}
                Err(Abort) => return ProposalSet::new(),
            }
        }
        approved
    }

    /// Approve new files. The full content stands in for the diff.
    pub fn approve_new(&self, proposals: &ProposalSet, prompter: &mut dyn Prompter) -> ProposalSet {
        if self.refuse_read_only(proposals, "new file", prompter) {
            return ProposalSet::new();
        }

        let mut approved = ProposalSet::new();
        for (path, content) in proposals {
            let label = self.label(path);
            prompter.show_content(&format!("{label} (new file)"), content);

            match self.decide(path, &label, content, BatchKind::NewFile, prompter) {
                Ok(true) => {
                    approved.insert(path.clone(), content.clone());
                }
                Ok(false) => {}
                Err(Abort) => return ProposalSet::new(),
            }
        }
        approved
    }

    fn refuse_read_only(
        &self,
        proposals: &ProposalSet,
        what: &str,
        prompter: &mut dyn Prompter,
    ) -> bool {
        if self.mode != ApprovalMode::ReadOnly {
            return false;
        }
        if !proposals.is_empty() {
            tracing::info!(count = proposals.len(), "Read-only mode; proposals not applied");
            prompter.info(&format!(
                "Read-only mode: {} {what} proposal(s) not applied.",
                proposals.len()
            ));
        }
        true
    }

    fn decide(
        &self,
        path: &Path,
        label: &str,
        content: &str,
        kind: BatchKind,
        prompter: &mut dyn Prompter,
    ) -> Result<bool, Abort> {
        if self.mode == ApprovalMode::FullAccess {
            tracing::info!(path = %path.display(), "Auto-approved");
            prompter.info(&format!("Auto-approved {label} (full access)."));
            return Ok(true);
        }

        if !path.starts_with(&self.working_dir) {
            let question = format!(
                "{label} is outside the working directory. Allow writing to it? [y/n]"
            );
            match confirm(prompter, &question) {
                Ok(true) => {}
                Ok(false) => {
                    prompter.info(&format!("Skipped {label}."));
                    return Ok(false);
                }
                Err(err) => return Err(closed(&err, prompter)),
            }
        }

        let question = match kind {
            BatchKind::Edit => format!("Apply changes to {label}? [y]es/[n]o/[d]etails/[q]uit"),
            BatchKind::NewFile => format!("Create {label}? [y]es/[n]o/[d]etails/[q]uit"),
        };
        loop {
            let answer = match prompter.ask(&question) {
                Ok(answer) => answer,
                Err(err) => return Err(closed(&err, prompter)),
            };
            match Decision::parse(&answer) {
                Some(Decision::Accept) => return Ok(true),
                Some(Decision::Reject) => {
                    prompter.info(&format!("Skipped {label}."));
                    return Ok(false);
                }
                Some(Decision::Inspect) => prompter.show_content(label, content),
                Some(Decision::Abort) => {
                    tracing::info!("Approval aborted by operator");
                    prompter.info("Aborted; no changes from this response were approved.");
                    return Err(Abort);
                }
                None => prompter.warn(DECISION_HELP),
            }
        }
    }

    fn label(&self, path: &Path) -> String {
        path.strip_prefix(&self.working_dir)
            .map_or_else(|_| path.display().to_string(), |rel| rel.display().to_string())
    }
}

/// The batch was abandoned; nothing decided so far survives.
struct Abort;

fn closed(err: &PromptError, prompter: &mut dyn Prompter) -> Abort {
    tracing::warn!("Approval interrupted: {err}");
    prompter.warn("Input closed; no changes from this response were approved.");
    Abort
}
