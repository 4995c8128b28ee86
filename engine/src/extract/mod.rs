//! Change extraction from model responses.
//!
//! Turns free-form markdown into proposals: edits for known files and
//! new-file proposals for path-like hints. Extraction never fails; anything
//! that cannot be attributed is returned as an [`UnresolvedBlock`].

mod fence;
mod hint;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use procoder_types::{DuplicatePolicy, HintMatch, ProposalSet, UnresolvedBlock, UnresolvedReason};

pub use hint::{match_hint, normalize_hint};

/// Everything one response proposed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Edits keyed by known path.
    pub changes: ProposalSet,
    /// New files keyed by normalized hint (relative or absolute as written).
    pub new_files: ProposalSet,
    pub unresolved: Vec<UnresolvedBlock>,
    /// Targets that received more than one block.
    pub duplicates: Vec<PathBuf>,
}

impl ExtractionReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.new_files.is_empty() && self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Known(PathBuf),
    New(PathBuf),
}

struct Candidate {
    hint: Option<String>,
    content: String,
}

/// Extract with the default last-wins duplicate policy.
///
/// Returns `(changes, new_files)`.
#[must_use]
pub fn extract(text: &str, known: &[PathBuf]) -> (ProposalSet, ProposalSet) {
    let report = extract_with(text, known, &[], DuplicatePolicy::LastWins);
    (report.changes, report.new_files)
}

/// Extract proposals from `text`, attributing blocks to `known` paths.
///
/// `known` is sorted internally so suffix matches are reproducible. `roots`
/// are the directories relative hints are resolved against, most specific
/// first.
#[must_use]
pub fn extract_with(
    text: &str,
    known: &[PathBuf],
    roots: &[&Path],
    policy: DuplicatePolicy,
) -> ExtractionReport {
    let mut known = known.to_vec();
    known.sort();
    known.dedup();

    let mut report = ExtractionReport::default();
    let mut targets: BTreeMap<Target, Vec<Candidate>> = BTreeMap::new();

    for block in fence::scan_blocks(text) {
        if block.body.trim().is_empty() {
            tracing::debug!(hint = ?block.hint, "Skipping empty code block");
            continue;
        }

        let target = match &block.hint {
            Some(raw) => match match_hint(raw, &known, roots) {
                HintMatch::Matched(path) => Some(Target::Known(path)),
                HintMatch::AmbiguousNewFile(hint) => Some(Target::New(PathBuf::from(hint))),
                HintMatch::Unmatched => {
                    report.unresolved.push(UnresolvedBlock {
                        hint: Some(raw.clone()),
                        reason: UnresolvedReason::UnmatchedHint,
                        content: block.body.clone(),
                    });
                    None
                }
            },
            None => match known.as_slice() {
                [only] => Some(Target::Known(only.clone())),
                _ => {
                    tracing::warn!(
                        known = known.len(),
                        "Code block without filename hint cannot be attributed"
                    );
                    report.unresolved.push(UnresolvedBlock {
                        hint: None,
                        reason: UnresolvedReason::AmbiguousNoHint,
                        content: block.body.clone(),
                    });
                    None
                }
            },
        };

        if let Some(target) = target {
            targets.entry(target).or_default().push(Candidate {
                hint: block.hint,
                content: block.body,
            });
        }
    }

    for (target, mut candidates) in targets {
        let (path, map) = match target {
            Target::Known(path) => (path, &mut report.changes),
            Target::New(path) => (path, &mut report.new_files),
        };

        if candidates.len() > 1 {
            tracing::warn!(
                path = %path.display(),
                blocks = candidates.len(),
                policy = policy.as_str(),
                "Several code blocks target the same file"
            );
            report.duplicates.push(path.clone());
        }

        let chosen = match policy {
            DuplicatePolicy::LastWins => candidates.pop(),
            DuplicatePolicy::FirstWins => candidates.into_iter().next(),
            DuplicatePolicy::Reject if candidates.len() > 1 => {
                report.unresolved.extend(candidates.into_iter().map(|c| UnresolvedBlock {
                    hint: c.hint,
                    reason: UnresolvedReason::DuplicateTarget,
                    content: c.content,
                }));
                None
            }
            DuplicatePolicy::Reject => candidates.pop(),
        };

        if let Some(candidate) = chosen {
            map.insert(path, candidate.content);
        }
    }

    tracing::debug!(
        changes = report.changes.len(),
        new_files = report.new_files.len(),
        unresolved = report.unresolved.len(),
        "Extraction finished"
    );
    report
}
