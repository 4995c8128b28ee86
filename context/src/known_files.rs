//! Files loaded into the session.
//!
//! Keys are absolute, canonicalized paths; values are the last content read
//! from disk. Iteration is always in sorted path order.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use procoder_types::ProposalSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded(PathBuf),
    Reloaded(PathBuf),
}

impl LoadOutcome {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Loaded(path) | Self::Reloaded(path) => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct KnownFiles {
    working_dir: PathBuf,
    git_root: Option<PathBuf>,
    files: BTreeMap<PathBuf, String>,
}

impl KnownFiles {
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>, git_root: Option<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            git_root,
            files: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn git_root(&self) -> Option<&Path> {
        self.git_root.as_deref()
    }

    /// Load (or reload) a file.
    ///
    /// Relative paths resolve against the working directory first, then the
    /// Git root. A file that cannot be read is removed if it was loaded.
    pub fn load(&mut self, spec: &Path) -> Result<LoadOutcome, LoadError> {
        let Some(found) = self.locate(spec) else {
            let stale = self.resolve(spec);
            if self.files.remove(&stale).is_some() {
                tracing::warn!(path = %stale.display(), "Known file disappeared; dropped");
            }
            return Err(LoadError::NotFound { path: stale });
        };

        let path = fs::canonicalize(&found).unwrap_or(found);
        if !path.is_file() {
            self.files.remove(&path);
            return Err(LoadError::NotAFile { path });
        }

        match read_text(&path) {
            Ok(content) => {
                let outcome = if self.files.contains_key(&path) {
                    LoadOutcome::Reloaded(path.clone())
                } else {
                    LoadOutcome::Loaded(path.clone())
                };
                tracing::debug!(path = %path.display(), bytes = content.len(), "Loaded file");
                self.files.insert(path, content);
                Ok(outcome)
            }
            Err(source) => {
                self.files.remove(&path);
                Err(LoadError::Read { path, source })
            }
        }
    }

    /// Re-read each path from disk, recording failures as warnings.
    pub fn reload<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) -> Vec<LoadOutcome> {
        let mut outcomes = Vec::new();
        for path in paths {
            match self.load(path) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => tracing::warn!("Reload failed: {err}"),
            }
        }
        outcomes
    }

    /// Drop a file by absolute path, path relative to the Git root or
    /// working directory, or base name. Returns the removed path.
    pub fn drop_file(&mut self, spec: &str) -> Option<PathBuf> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        let wanted = self.resolve(Path::new(spec));
        let key = self
            .files
            .keys()
            .find(|known| {
                **known == wanted
                    || self.relative_to_root(known).is_some_and(|rel| rel == Path::new(spec))
                    || known.file_name().is_some_and(|name| name == spec)
            })
            .cloned()?;
        self.files.remove(&key);
        Some(key)
    }

    /// Remove without touching the disk (after undoing a file creation).
    pub fn forget(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.files.iter().map(|(p, c)| (p.as_path(), c.as_str()))
    }

    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    /// Current content of every known file, keyed by path.
    #[must_use]
    pub fn snapshot(&self) -> ProposalSet {
        self.files.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Path relative to the Git root if inside it, else the base name.
    #[must_use]
    pub fn display_name(&self, path: &Path) -> String {
        if let Some(rel) = self.relative_to_root(path) {
            return rel.display().to_string();
        }
        path.file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn relative_to_root<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        let root = self.git_root.as_deref().unwrap_or(&self.working_dir);
        path.strip_prefix(root).ok()
    }

    fn locate(&self, spec: &Path) -> Option<PathBuf> {
        let primary = self.resolve(spec);
        if primary.exists() {
            return Some(primary);
        }
        if spec.is_relative()
            && let Some(root) = &self.git_root
        {
            let candidate = normalize(&root.join(spec));
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "Resolved relative to Git root");
                return Some(candidate);
            }
        }
        None
    }

    /// `spec` made absolute against the working directory, with `.` and `..`
    /// resolved lexically. Does not touch the filesystem.
    #[must_use]
    pub fn resolve(&self, spec: &Path) -> PathBuf {
        if spec.is_absolute() {
            normalize(spec)
        } else {
            normalize(&self.working_dir.join(spec))
        }
    }
}

/// UTF-8, falling back to Latin-1 for files that are not valid UTF-8.
fn read_text(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(err) => {
            tracing::warn!(path = %path.display(), "Not valid UTF-8; decoding as Latin-1");
            Ok(err.into_bytes().iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
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
