//! procoder CLI - binary entry point and REPL.
//!
//! ```text
//! main() -> Session::new -> loop {
//!     /command        -> Session::execute
//!     message         -> OpenRouterClient::stream_chat -> Session::finish_turn
//! }
//! ```
//!
//! Logs go to a file; the terminal belongs to the prompt.

mod terminal;

use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use crossterm::style::Stylize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use procoder_config::{ProcoderConfig, Settings, procoder_dir};
use procoder_engine::{CliGit, Command, CommandOutcome, GitBridge, PromptError, Prompter, Session};
use procoder_providers::OpenRouterClient;

use crate::terminal::{TerminalPrompter, print_chunk};

const USAGE: &str = "Usage: procoder [FILE]...\n\nLoads FILEs into the context and starts an interactive session.\nType /help inside the session for commands.";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with the prompt.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.procoder/logs/procoder.log
    if let Some(dir) = procoder_dir() {
        candidates.push(dir.join("logs").join("procoder.log"));
    }

    // Fallback: ./.procoder/logs/procoder.log
    candidates.push(PathBuf::from(".procoder").join("logs").join("procoder.log"));

    candidates
}

/// Config file, then environment, then defaults. A broken config file is
/// reported and ignored.
fn load_settings(prompter: &mut dyn Prompter) -> Settings {
    match ProcoderConfig::load() {
        Ok(Some(config)) => config.resolve(),
        Ok(None) => ProcoderConfig::default().resolve(),
        Err(err) => {
            prompter.warn(&format!("Ignoring config file: {err}"));
            ProcoderConfig::default().resolve()
        }
    }
}

fn discover_git(dir: &Path) -> Option<Box<dyn GitBridge>> {
    match CliGit::discover(dir) {
        Ok(git) => Some(Box::new(git)),
        Err(err) => {
            tracing::info!("Git integration disabled: {err}");
            None
        }
    }
}

fn print_banner(session: &Session) {
    println!("{}", "procoder - AI coding assistant".bold().cyan());
    println!(
        "Model: {}  Approval mode: {}",
        session.settings().model,
        session.mode().as_str()
    );
    if let Some(root) = session.files().git_root() {
        println!("Git repository: {}", root.display());
    }
    println!("Type /help for commands, /quit to exit.\n");
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return Ok(());
    }

    init_tracing();

    let mut prompter = TerminalPrompter::stdin();
    let settings = load_settings(&mut prompter);
    tracing::debug!(?settings, "Settings resolved");

    let working_dir = env::current_dir().context("cannot determine the working directory")?;
    let working_dir = fs::canonicalize(&working_dir).unwrap_or(working_dir);

    let client = match OpenRouterClient::new(settings.api_key.clone(), settings.model.clone()) {
        Ok(client) => client.with_site(settings.site_url.clone(), settings.site_name.clone()),
        Err(err) => {
            prompter.warn(&err.to_string());
            if let Some(hint) = err.hint() {
                prompter.warn(hint);
            }
            return Err(err.into());
        }
    };

    let git = discover_git(&working_dir);
    let mut session = Session::new(working_dir, settings, git);
    print_banner(&session);

    let initial: Vec<&str> = args.iter().map(String::as_str).collect();
    if !initial.is_empty() {
        session.load_paths(&initial, &mut prompter);
    }

    loop {
        let line = match prompter.read_line(&format!("{} ", "You>".bold().green())) {
            Ok(line) => line,
            Err(PromptError::Closed) => {
                println!();
                break;
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(command) = Command::from_input(&line) {
            if session.execute(command, &mut prompter) == CommandOutcome::Quit {
                break;
            }
            continue;
        }

        if !session.begin_turn(&line) {
            continue;
        }
        if let Some(estimate) = session.over_token_limit() {
            prompter.warn(&format!(
                "Context is ~{estimate} tokens, above the configured limit of {}. Consider /drop or /clear.",
                session.settings().approx_token_limit
            ));
        }

        print!("{} ", "AI>".bold().blue());
        let result = client.stream_chat(session.messages(), print_chunk).await;
        println!();

        match result {
            Ok(response) => {
                let report = session.finish_turn(&response, &mut prompter);
                tracing::info!(
                    applied = report.applied.len(),
                    created = report.created.len(),
                    unresolved = report.unresolved.len(),
                    "Turn complete"
                );
            }
            Err(err) => {
                tracing::error!("Chat request failed: {err}");
                prompter.warn(&format!("Request failed: {err}"));
                if let Some(hint) = err.hint() {
                    prompter.warn(hint);
                }
                session.abandon_turn();
            }
        }
    }

    println!("{}", "Goodbye!".cyan());
    Ok(())
}
