//! Git staging and commit for files the pipeline touched.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use procoder_config::Settings;
use thiserror::Error;

use crate::prompt::{Prompter, confirm};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git executable not found: {0}")]
    NotInstalled(#[from] which::Error),
    #[error("failed to spawn git: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{} is not inside a Git repository", path.display())]
    NotARepository { path: PathBuf },
    #[error("`git {command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

pub trait GitBridge {
    fn repo_root(&self) -> &Path;
    /// Stage `paths` (absolute). Returns false on any failure.
    fn stage(&mut self, paths: &[PathBuf]) -> bool;
    fn commit(&mut self, message: &str) -> bool;
}

/// Git via the `git` binary on `PATH`.
#[derive(Debug, Clone)]
pub struct CliGit {
    git: PathBuf,
    root: PathBuf,
}

impl CliGit {
    /// Find the repository containing `dir`.
    pub fn discover(dir: &Path) -> Result<Self, GitError> {
        let git = which::which("git")?;
        let stdout = run(&git, dir, &["rev-parse", "--show-toplevel"]).map_err(|err| {
            tracing::debug!("rev-parse failed: {err}");
            GitError::NotARepository {
                path: dir.to_path_buf(),
            }
        })?;
        let root = PathBuf::from(stdout.trim());
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        tracing::info!(root = %root.display(), "Git repository detected");
        Ok(Self { git, root })
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        run(&self.git, &self.root, args)
    }
}

impl GitBridge for CliGit {
    fn repo_root(&self) -> &Path {
        &self.root
    }

    fn stage(&mut self, paths: &[PathBuf]) -> bool {
        let relative = repo_relative(&self.root, paths);
        if relative.is_empty() {
            tracing::warn!("No paths inside the repository to stage");
            return false;
        }
        let mut args = vec!["add", "--"];
        let rendered: Vec<String> = relative.iter().map(|p| p.display().to_string()).collect();
        args.extend(rendered.iter().map(String::as_str));
        match self.run(&args) {
            Ok(_) => {
                tracing::info!(files = relative.len(), "Staged files");
                true
            }
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }

    fn commit(&mut self, message: &str) -> bool {
        match self.run(&["commit", "-m", message]) {
            Ok(stdout) => {
                tracing::info!(summary = %stdout.lines().next().unwrap_or_default(), "Committed");
                true
            }
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }
}

fn run(git: &Path, dir: &Path, args: &[&str]) -> Result<String, GitError> {
    let output = Command::new(git)
        .args(["--no-pager", "-c", "color.ui=false"])
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .output()
        .map_err(GitError::Spawn)?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    Err(GitError::Failed {
        command: args.first().copied().unwrap_or_default().to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Paths under `root`, made relative to it. Others are dropped.
#[must_use]
pub fn repo_relative(root: &Path, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .filter_map(|p| p.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect()
}

/// `procoder AI updates for: a.py, b.py`
#[must_use]
pub fn default_commit_message(paths: &[PathBuf]) -> String {
    let names: Vec<String> = paths
        .iter()
        .map(|p| {
            p.file_name()
                .map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned())
        })
        .collect();
    format!("procoder AI updates for: {}", names.join(", "))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GitPolicy {
    pub auto_stage: bool,
    pub auto_commit: bool,
}

impl From<&Settings> for GitPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            auto_stage: settings.auto_stage,
            auto_commit: settings.auto_commit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GitOutcome {
    pub staged: bool,
    pub committed: bool,
}

/// Stage and optionally commit `touched`, asking the operator unless the
/// policy says otherwise. A commit is only offered after a successful stage.
pub fn stage_and_commit(
    git: &mut dyn GitBridge,
    policy: GitPolicy,
    touched: &[PathBuf],
    prompter: &mut dyn Prompter,
) -> GitOutcome {
    let root = git.repo_root().to_path_buf();
    let paths: Vec<PathBuf> = touched
        .iter()
        .filter(|p| p.starts_with(&root))
        .cloned()
        .collect();
    if paths.is_empty() {
        tracing::debug!("No touched files inside the repository");
        return GitOutcome::default();
    }
    let names = repo_relative(&root, &paths)
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");

    let stage = policy.auto_stage
        || confirm(prompter, &format!("Stage {names} in Git? [y/n]")).unwrap_or(false);
    if !stage {
        return GitOutcome::default();
    }
    if !git.stage(&paths) {
        prompter.warn("git add failed; see the log for details.");
        return GitOutcome::default();
    }
    prompter.info(&format!("Staged: {names}"));

    let default_message = default_commit_message(&paths);
    let message = if policy.auto_commit {
        default_message
    } else {
        match confirm(prompter, "Commit staged changes? [y/n]") {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                return GitOutcome {
                    staged: true,
                    committed: false,
                };
            }
        }
        match prompter.ask(&format!("Commit message (blank for \"{default_message}\"):")) {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => default_message,
            Err(_) => {
                return GitOutcome {
                    staged: true,
                    committed: false,
                };
            }
        }
    };

    let committed = git.commit(&message);
    if committed {
        prompter.info(&format!("Committed: {message}"));
    } else {
        prompter.warn("git commit failed; see the log for details.");
    }
    GitOutcome {
        staged: true,
        committed,
    }
}
