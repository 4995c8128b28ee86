//! Line-oriented terminal prompter.
//!
//! Everything model-generated is passed through `sanitize_terminal_text`
//! before it reaches the terminal.

use std::io::{self, BufRead, Write};

use crossterm::style::Stylize;
use procoder_engine::{PromptError, Prompter};
use procoder_types::sanitize_terminal_text;

pub struct TerminalPrompter<R> {
    input: R,
}

impl TerminalPrompter<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }
}

impl<R: BufRead> TerminalPrompter<R> {
    /// Read one line of operator input after printing `prompt`.
    pub fn read_line(&mut self, prompt: &str) -> Result<String, PromptError> {
        let mut out = io::stdout().lock();
        write!(out, "{prompt}")?;
        out.flush()?;
        drop(out);

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(PromptError::Closed);
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }
}

/// Stream one chunk of model output to stdout.
pub fn print_chunk(chunk: &str) {
    let mut out = io::stdout().lock();
    let _ = write!(out, "{}", sanitize_terminal_text(chunk));
    let _ = out.flush();
}

fn print_line(line: impl std::fmt::Display) {
    let _ = writeln!(io::stdout().lock(), "{line}");
}

impl<R: BufRead> Prompter for TerminalPrompter<R> {
    fn info(&mut self, message: &str) {
        print_line(sanitize_terminal_text(message).cyan());
    }

    fn warn(&mut self, message: &str) {
        print_line(sanitize_terminal_text(message).yellow());
    }

    fn show_diff(&mut self, label: &str, diff: &str) {
        print_line(format!("--- Diff for {} ---", sanitize_terminal_text(label)).bold());
        for line in sanitize_terminal_text(diff).lines() {
            if line.starts_with("+++") || line.starts_with("---") {
                print_line(line.bold());
            } else if line.starts_with('+') {
                print_line(line.green());
            } else if line.starts_with('-') {
                print_line(line.red());
            } else if line.starts_with("@@") {
                print_line(line.cyan());
            } else {
                print_line(line);
            }
        }
    }

    fn show_content(&mut self, label: &str, content: &str) {
        print_line(format!("--- {} ---", sanitize_terminal_text(label)).bold());
        print_line(sanitize_terminal_text(content));
        print_line("--- end ---".bold());
    }

    fn ask(&mut self, question: &str) -> Result<String, PromptError> {
        let prompt = format!("{} ", sanitize_terminal_text(question).magenta());
        self.read_line(&prompt)
    }
}
