//! Operator prompt surface.
//!
//! The pipeline never touches the terminal directly; everything the operator
//! sees or answers goes through a [`Prompter`].

use std::collections::VecDeque;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    /// Input ended (EOF, Ctrl+D, or a script ran out of answers).
    #[error("input closed")]
    Closed,
    #[error("prompt I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Prompter {
    fn info(&mut self, message: &str);
    fn warn(&mut self, message: &str);
    /// Show a unified diff for the file labelled `label`.
    fn show_diff(&mut self, label: &str, diff: &str);
    /// Show full file content.
    fn show_content(&mut self, label: &str, content: &str);
    /// Ask a question and return the raw answer line.
    fn ask(&mut self, question: &str) -> Result<String, PromptError>;
}

/// Ask a yes/no question until the answer is one of `y`, `yes`, `n`, `no`.
pub fn confirm(prompter: &mut dyn Prompter, question: &str) -> Result<bool, PromptError> {
    loop {
        let answer = prompter.ask(question)?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => prompter.warn("Please answer y or n."),
        }
    }
}

/// Everything a [`ScriptedPrompter`] was shown, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Info(String),
    Warn(String),
    Diff { label: String, diff: String },
    Content { label: String, content: String },
    Question(String),
}

/// Replays canned answers and records the transcript. Running out of
/// answers behaves like a closed terminal.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    transcript: Vec<Shown>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    #[must_use]
    pub fn transcript(&self) -> &[Shown] {
        &self.transcript
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn questions(&self) -> Vec<&str> {
        self.transcript
            .iter()
            .filter_map(|s| match s {
                Shown::Question(q) => Some(q.as_str()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn diffs(&self) -> Vec<&str> {
        self.transcript
            .iter()
            .filter_map(|s| match s {
                Shown::Diff { diff, .. } => Some(diff.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True if any info or warning line contains `needle`.
    #[must_use]
    pub fn said(&self, needle: &str) -> bool {
        self.transcript.iter().any(|s| match s {
            Shown::Info(m) | Shown::Warn(m) => m.contains(needle),
            _ => false,
        })
    }
}

impl Prompter for ScriptedPrompter {
    fn info(&mut self, message: &str) {
        self.transcript.push(Shown::Info(message.to_string()));
    }

    fn warn(&mut self, message: &str) {
        self.transcript.push(Shown::Warn(message.to_string()));
    }

    fn show_diff(&mut self, label: &str, diff: &str) {
        self.transcript.push(Shown::Diff {
            label: label.to_string(),
            diff: diff.to_string(),
        });
    }

    fn show_content(&mut self, label: &str, content: &str) {
        self.transcript.push(Shown::Content {
            label: label.to_string(),
            content: content.to_string(),
        });
    }

    fn ask(&mut self, question: &str) -> Result<String, PromptError> {
        self.transcript.push(Shown::Question(question.to_string()));
        self.answers.pop_front().ok_or(PromptError::Closed)
    }
}
