//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use procoder_engine::{ScriptedPrompter, Session, Settings};
use tempfile::TempDir;
use wiremock::ResponseTemplate;

/// A temporary workspace with a canonical root, so paths compare equal to
/// what `KnownFiles` resolves.
pub struct Workspace {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize tempdir");
        Self { _dir: dir, root }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write fixture");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).expect("read file")
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Write `files`, then start a session with all of them loaded.
    pub fn session(&self, files: &[(&str, &str)], settings: Settings) -> Session {
        for (name, content) in files {
            self.write(name, content);
        }
        let mut session = Session::new(&self.root, settings, None);
        let names: Vec<&str> = files.iter().map(|(name, _)| *name).collect();
        let loaded = session.load_paths(&names, &mut ScriptedPrompter::default());
        assert_eq!(loaded, files.len(), "all fixtures load");
        session
    }
}

pub fn relative<'a>(root: &Path, paths: &'a [PathBuf]) -> Vec<&'a Path> {
    paths
        .iter()
        .map(|p| p.strip_prefix(root).unwrap_or(p))
        .collect()
}

/// An OpenRouter-style SSE body that streams `chunks` and then `[DONE]`.
pub fn sse_response(chunks: &[&str]) -> ResponseTemplate {
    let mut body = String::new();
    for chunk in chunks {
        let data = serde_json::json!({
            "choices": [{"delta": {"content": chunk}}]
        });
        body.push_str(&format!("data: {data}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");

    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}
