//! Filename hint resolution.
//!
//! Rules are tried in priority order; the first that applies wins:
//!
//! 1. exact: the hint names a known path, as written or resolved against
//!    the working directory and then the Git root
//! 2. suffix: a known path ends with the hint, or the hint ends with a known
//!    path's base name (plain string comparison, first known path in sorted
//!    order)
//! 3. path-like: the hint contains `/` or `.` and becomes a new-file proposal
//! 4. otherwise the hint is unmatched

use std::path::{Component, Path, PathBuf};

use procoder_types::HintMatch;

/// Trim, unify separators to `/` and drop a leading `./`.
#[must_use]
pub fn normalize_hint(raw: &str) -> Option<String> {
    let mut hint = raw.trim().replace('\\', "/");
    while let Some(rest) = hint.strip_prefix("./") {
        hint = rest.to_string();
    }
    if hint.is_empty() { None } else { Some(hint) }
}

/// Resolve a hint against the known paths.
///
/// `known` is expected in sorted order so that suffix ties are reproducible.
/// Relative hints are also tried against each of `roots` in order before any
/// suffix rule applies.
#[must_use]
pub fn match_hint(raw: &str, known: &[PathBuf], roots: &[&Path]) -> HintMatch {
    let Some(hint) = normalize_hint(raw) else {
        return HintMatch::Unmatched;
    };
    let hint_path = Path::new(&hint);

    if let Some(path) = exact_match(hint_path, known, roots) {
        return HintMatch::Matched(path.clone());
    }

    if let Some(path) = suffix_match(&hint, known) {
        tracing::info!(hint = %hint, path = %path.display(), "Partial filename match");
        return HintMatch::Matched(path.clone());
    }

    if looks_like_path(&hint) {
        tracing::debug!(hint = %hint, "Hint names no loaded file; treating as new file");
        return HintMatch::AmbiguousNewFile(hint);
    }

    tracing::warn!(hint = %hint, "Filename hint matches no loaded file");
    HintMatch::Unmatched
}

fn exact_match<'a>(hint: &Path, known: &'a [PathBuf], roots: &[&Path]) -> Option<&'a PathBuf> {
    if let Some(path) = known.iter().find(|path| path.as_path() == hint) {
        return Some(path);
    }
    if hint.is_absolute() {
        return None;
    }
    roots.iter().find_map(|root| {
        let candidate = lexical_join(root, hint);
        known.iter().find(|path| **path == candidate)
    })
}

fn suffix_match<'a>(hint: &str, known: &'a [PathBuf]) -> Option<&'a PathBuf> {
    known.iter().find(|path| {
        let full = path.to_string_lossy();
        full.ends_with(hint)
            || path
                .file_name()
                .is_some_and(|name| hint.ends_with(&*name.to_string_lossy()))
    })
}

/// `root.join(rel)` with `.` and `..` folded away, without touching the disk.
fn lexical_join(root: &Path, rel: &Path) -> PathBuf {
    let mut out = root.to_path_buf();
    for component in rel.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn looks_like_path(hint: &str) -> bool {
    hint.contains('/') || hint.contains('.')
}
