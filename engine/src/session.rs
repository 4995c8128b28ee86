//! Session state and the per-response pipeline.
//!
//! A [`Session`] owns everything one interactive run mutates: the known
//! files, the conversation, the change ledger and the Git bridge. Nothing is
//! process-global.

use std::path::{Path, PathBuf};

use procoder_config::Settings;
use procoder_context::{Conversation, KnownFiles, LoadOutcome, TokenCounter};
use procoder_types::{
    ApprovalMode, ChangeKind, Message, NonEmptyString, ProposalSet, UnresolvedBlock,
};

use crate::approval::ApprovalGate;
use crate::commands::{Command, command_help, command_help_summary};
use crate::extract::{ExtractionReport, extract_with};
use crate::git::{GitBridge, GitOutcome, GitPolicy, stage_and_commit};
use crate::ledger::{HistoryStep, Ledger};
use crate::mutator::FileMutator;
use crate::prompt::Prompter;

/// Lines of an unresolved block shown to the operator.
const UNRESOLVED_PREVIEW_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Quit,
}

/// What one model response did to the workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub applied: Vec<PathBuf>,
    pub created: Vec<PathBuf>,
    pub unresolved: Vec<UnresolvedBlock>,
    pub duplicates: Vec<PathBuf>,
    pub git: GitOutcome,
}

impl TurnReport {
    /// Every path written or created, in that order.
    #[must_use]
    pub fn touched(&self) -> Vec<PathBuf> {
        self.applied.iter().chain(&self.created).cloned().collect()
    }
}

pub struct Session {
    files: KnownFiles,
    conversation: Conversation,
    ledger: Ledger,
    mutator: FileMutator,
    settings: Settings,
    mode: ApprovalMode,
    git: Option<Box<dyn GitBridge>>,
}

impl Session {
    /// Start a session rooted at `working_dir`. The Git root, if any, comes
    /// from `git`; with `persist_history` the ledger is restored from its
    /// journal.
    pub fn new(
        working_dir: impl Into<PathBuf>,
        settings: Settings,
        git: Option<Box<dyn GitBridge>>,
    ) -> Self {
        let working_dir = working_dir.into();
        let git_root = git.as_ref().map(|g| g.repo_root().to_path_buf());
        let ledger = if settings.persist_history {
            Ledger::load_journal(&Ledger::journal_path(&working_dir), settings.history_limit)
        } else {
            Ledger::new(settings.history_limit)
        };

        Self {
            files: KnownFiles::new(working_dir, git_root),
            conversation: Conversation::new(),
            ledger,
            mutator: FileMutator::new(settings.backup),
            mode: settings.approval_mode,
            settings,
            git,
        }
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        self.files.working_dir()
    }

    #[must_use]
    pub fn files(&self) -> &KnownFiles {
        &self.files
    }

    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn mode(&self) -> ApprovalMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ApprovalMode) {
        tracing::info!(mode = mode.as_str(), "Approval mode changed");
        self.mode = mode;
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Load (or reload) files into the context. Returns how many succeeded.
    pub fn load_paths(&mut self, specs: &[&str], prompter: &mut dyn Prompter) -> usize {
        let mut loaded = 0;
        for spec in specs {
            match self.files.load(Path::new(spec)) {
                Ok(outcome) => {
                    let path = outcome.path().to_path_buf();
                    let name = self.files.display_name(&path);
                    let verb = match outcome {
                        LoadOutcome::Loaded(_) => "Loaded",
                        LoadOutcome::Reloaded(_) => "Reloaded",
                    };
                    prompter.info(&format!("{verb} {name}"));
                    if let Some(content) = self.files.get(&path) {
                        self.conversation.push_file_context(&name, content);
                    }
                    loaded += 1;
                }
                Err(err) => prompter.warn(&format!("Could not load {spec}: {err}")),
            }
        }
        loaded
    }

    /// Record the operator's message. The first turn also seeds the system
    /// prompt and file context. Returns false for blank input.
    pub fn begin_turn(&mut self, input: &str) -> bool {
        let Ok(content) = NonEmptyString::new(input) else {
            return false;
        };
        self.conversation.prepare_context(&self.files);
        self.conversation.push_user(content);
        self.conversation.limit(self.settings.max_history_messages);
        true
    }

    /// Forget the pending user message after a failed request.
    pub fn abandon_turn(&mut self) {
        if self.conversation.pop_user().is_some() {
            tracing::debug!("Dropped user message of failed request");
        }
    }

    #[must_use]
    pub fn token_estimate(&self) -> u32 {
        self.conversation.estimate_tokens(&TokenCounter::new())
    }

    /// `Some(estimate)` if the conversation exceeds the configured limit.
    #[must_use]
    pub fn over_token_limit(&self) -> Option<u32> {
        let estimate = self.token_estimate();
        (estimate > self.settings.approx_token_limit).then_some(estimate)
    }

    /// Store the model's reply and run it through the change pipeline.
    pub fn finish_turn(&mut self, response: &str, prompter: &mut dyn Prompter) -> TurnReport {
        if let Ok(content) = NonEmptyString::new(response) {
            self.conversation.push_assistant(content);
        }
        self.handle_response(response, prompter)
    }

    /// Extract, approve, apply, reload and hand touched files to Git.
    pub fn handle_response(&mut self, text: &str, prompter: &mut dyn Prompter) -> TurnReport {
        let known = self.files.paths();
        let mut roots = vec![self.files.working_dir()];
        if let Some(git_root) = self.files.git_root()
            && git_root != self.files.working_dir()
        {
            roots.push(git_root);
        }
        let ExtractionReport {
            changes,
            new_files,
            unresolved,
            duplicates,
        } = extract_with(text, &known, &roots, self.settings.duplicate_policy);

        self.report_unresolved(&unresolved, prompter);
        for path in &duplicates {
            prompter.warn(&format!(
                "Several code blocks target {}; applied policy: {}.",
                self.files.display_name(path),
                self.settings.duplicate_policy.as_str()
            ));
        }

        let gate = ApprovalGate::new(self.mode, self.working_dir());
        let current = self.files.snapshot();
        let approved = gate.approve(&changes, &current, prompter);
        let applied = self
            .mutator
            .apply_changes(&approved, &current, &mut self.ledger);
        if applied.len() < approved.len() {
            prompter.warn(&format!(
                "Only {} of {} approved change(s) were written; see the log.",
                applied.len(),
                approved.len()
            ));
        }

        let new_files = self.resolve_new_files(new_files, prompter);
        let approved_new = gate.approve_new(&new_files, prompter);
        let created = self.mutator.apply_new_files(&approved_new, &mut self.ledger);
        if created.len() < approved_new.len() {
            prompter.warn(&format!(
                "Only {} of {} approved new file(s) were created; see the log.",
                created.len(),
                approved_new.len()
            ));
        }

        let mut report = TurnReport {
            applied,
            created,
            unresolved,
            duplicates,
            git: GitOutcome::default(),
        };
        let touched = report.touched();
        if touched.is_empty() {
            return report;
        }

        self.files.reload(touched.iter().map(PathBuf::as_path));
        if !report.applied.is_empty() {
            prompter.info(&format!("Applied changes to: {}", self.names(&report.applied)));
        }
        if !report.created.is_empty() {
            prompter.info(&format!("Created: {}", self.names(&report.created)));
        }

        let policy = GitPolicy::from(&self.settings);
        if let Some(git) = self.git.as_deref_mut() {
            report.git = stage_and_commit(git, policy, &touched, prompter);
        }
        report
    }

    /// Revert the newest applied change and resync the known files.
    pub fn undo(&mut self, prompter: &mut dyn Prompter) -> HistoryStep {
        let step = self.ledger.undo(&self.mutator);
        self.sync_after_step(&step, true, prompter);
        step
    }

    /// Reapply the newest undone change and resync the known files.
    pub fn redo(&mut self, prompter: &mut dyn Prompter) -> HistoryStep {
        let step = self.ledger.redo(&self.mutator);
        self.sync_after_step(&step, false, prompter);
        step
    }

    pub fn execute(&mut self, command: Command<'_>, prompter: &mut dyn Prompter) -> CommandOutcome {
        match command {
            Command::Load(paths) => {
                if paths.is_empty() {
                    prompter.warn("Usage: /load <path>...");
                } else if self.load_paths(&paths, prompter) == 0 {
                    prompter.warn("No files were loaded.");
                }
            }
            Command::Drop(specs) => {
                if specs.is_empty() {
                    prompter.warn("Usage: /drop <path>...");
                }
                for spec in specs {
                    match self.files.drop_file(spec) {
                        Some(path) => prompter.info(&format!(
                            "Dropped {} from context.",
                            self.files.display_name(&path)
                        )),
                        None => prompter.warn(&format!("{spec} is not a loaded file.")),
                    }
                }
            }
            Command::Files => prompter.info(&self.files_listing()),
            Command::Clear => {
                self.conversation.clear();
                self.files.clear();
                prompter.info("Conversation history and loaded files cleared.");
            }
            Command::Undo => {
                self.undo(prompter);
            }
            Command::Redo => {
                self.redo(prompter);
            }
            Command::History => prompter.info(&self.ledger.history_summary()),
            Command::Mode(None) => prompter.info(&format!(
                "Approval mode: {} ({}). Options: read-only, auto, full-access.",
                self.mode.as_str(),
                self.mode.description()
            )),
            Command::Mode(Some(name)) => match ApprovalMode::parse(name) {
                Some(mode) => {
                    self.set_mode(mode);
                    prompter.info(&format!(
                        "Approval mode set to {} ({}).",
                        mode.as_str(),
                        mode.description()
                    ));
                }
                None => prompter.warn(&format!(
                    "Unknown mode '{name}'. Options: read-only, auto, full-access."
                )),
            },
            Command::Context => self.show_context(prompter),
            Command::Help => prompter.info(&command_help()),
            Command::Quit => return CommandOutcome::Quit,
            Command::Unknown(name) => {
                prompter.warn(&format!("Unknown command /{name}. {}", command_help_summary()));
            }
            Command::Empty => {}
        }
        CommandOutcome::Continue
    }

    fn resolve_new_files(&self, proposals: ProposalSet, prompter: &mut dyn Prompter) -> ProposalSet {
        let mut resolved = ProposalSet::new();
        for (hint, content) in proposals {
            let path = self.files.resolve(&hint);
            if path.exists() {
                prompter.warn(&format!(
                    "{} already exists but is not loaded; /load it to propose edits.",
                    hint.display()
                ));
                continue;
            }
            resolved.insert(path, content);
        }
        resolved
    }

    fn report_unresolved(&self, unresolved: &[UnresolvedBlock], prompter: &mut dyn Prompter) {
        for block in unresolved {
            let hint = block
                .hint
                .as_deref()
                .map_or_else(String::new, |h| format!(" for '{h}'"));
            let preview: Vec<&str> = block.content.lines().take(UNRESOLVED_PREVIEW_LINES).collect();
            let more = if block.content.lines().count() > UNRESOLVED_PREVIEW_LINES {
                "\n    ..."
            } else {
                ""
            };
            prompter.warn(&format!(
                "Code block{hint} not applied: {}.\n    {}{more}",
                block.reason.describe(),
                preview.join("\n    ")
            ));
        }
    }

    fn sync_after_step(&mut self, step: &HistoryStep, undo: bool, prompter: &mut dyn Prompter) {
        let verb = if undo { "Undid" } else { "Redid" };
        match step {
            HistoryStep::NothingToUndo => prompter.info("Nothing to undo."),
            HistoryStep::NothingToRedo => prompter.info("Nothing to redo."),
            HistoryStep::Applied { kind, files } => {
                self.resync(*kind, files, undo);
                prompter.info(&format!(
                    "{verb} {} of: {}",
                    kind.as_str(),
                    self.names(files)
                ));
            }
            HistoryStep::Partial {
                kind,
                succeeded,
                failed,
            } => {
                self.resync(*kind, succeeded, undo);
                prompter.warn(&format!(
                    "{verb} incomplete; failed: {}. The change stays in history to retry.",
                    self.names(failed)
                ));
            }
        }
    }

    fn resync(&mut self, kind: ChangeKind, paths: &[PathBuf], undo: bool) {
        for path in paths {
            // Undoing a creation deletes the file; it leaves the context too.
            if kind == ChangeKind::Create && undo {
                self.files.forget(path);
            } else if let Err(err) = self.files.load(path) {
                tracing::warn!("Reload after history step failed: {err}");
            }
        }
    }

    fn names(&self, paths: &[PathBuf]) -> String {
        paths
            .iter()
            .map(|p| self.files.display_name(p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn files_listing(&self) -> String {
        if self.files.is_empty() {
            return "No files loaded.".to_string();
        }
        let mut out = String::from("Loaded files:");
        for (idx, (path, _)) in self.files.iter().enumerate() {
            out.push_str(&format!(
                "\n  {}. {} ({})",
                idx + 1,
                self.files.display_name(path),
                path.display()
            ));
        }
        out
    }

    fn show_context(&self, prompter: &mut dyn Prompter) {
        let preview;
        let messages = if self.conversation.is_empty() {
            let mut fresh = Conversation::new();
            fresh.prepare_context(&self.files);
            preview = fresh;
            preview.messages()
        } else {
            self.conversation.messages()
        };
        match serde_json::to_string_pretty(messages) {
            Ok(json) => prompter.show_content("context", &json),
            Err(err) => prompter.warn(&format!("Could not render context: {err}")),
        }
        prompter.info(&format!(
            "{} message(s), ~{} tokens.",
            messages.len(),
            TokenCounter::new().count_messages(messages)
        ));
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use procoder_config::Settings;
    use procoder_types::{ApprovalMode, DuplicatePolicy, Role, UnresolvedReason};

    use super::{CommandOutcome, Session};
    use crate::commands::Command;
    use crate::git::tests::RecordingGit;
    use crate::ledger::HistoryStep;
    use crate::prompt::{ScriptedPrompter, Shown};

    fn settings() -> Settings {
        Settings::default()
    }

    fn session_with(root: &Path, files: &[(&str, &str)], settings: Settings) -> Session {
        for (name, content) in files {
            let path = root.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let mut session = Session::new(root, settings, None);
        let names: Vec<&str> = files.iter().map(|(n, _)| *n).collect();
        let mut quiet = ScriptedPrompter::default();
        assert_eq!(session.load_paths(&names, &mut quiet), files.len());
        session
    }

    fn tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn example_turn_applies_with_backup() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("app.py", "print(1)\n")], settings());
        let mut prompter = ScriptedPrompter::new(["y"]);

        let report = session.handle_response(
            "Here is the fix:\n```python filename=\"app.py\"\nprint(2)\n```\n",
            &mut prompter,
        );

        let app = root.join("app.py");
        assert_eq!(report.applied, [app.clone()]);
        assert_eq!(fs::read_to_string(&app).unwrap(), "print(2)\n");
        assert_eq!(fs::read_to_string(root.join("app.py.bak")).unwrap(), "print(1)\n");
        assert_eq!(session.files().get(&app), Some("print(2)\n"));
        assert_eq!(session.ledger().len(), 1);
    }

    #[test]
    fn new_file_becomes_known_and_undo_forgets_it() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("app.py", "x\n")], settings());
        let mut prompter = ScriptedPrompter::new(["y"]);

        let report = session.handle_response(
            "```python filename=\"pkg/util.py\"\ndef f():\n    pass\n```",
            &mut prompter,
        );

        let util = root.join("pkg/util.py");
        assert_eq!(report.created, [util.clone()]);
        assert!(session.files().contains(&util));

        let step = session.undo(&mut prompter);
        assert!(step.is_applied());
        assert!(!util.exists());
        assert!(!session.files().contains(&util));

        assert!(session.redo(&mut prompter).is_applied());
        assert!(util.exists());
        assert!(session.files().contains(&util));
    }

    #[test]
    fn existing_unloaded_file_is_not_clobbered() {
        let (_dir, root) = tempdir();
        fs::write(root.join("notes.txt"), "mine\n").unwrap();
        let mut session = session_with(&root, &[("app.py", "x\n")], settings());
        let mut prompter = ScriptedPrompter::new(["y"]);

        let report = session.handle_response("```text notes.txt\ntheirs\n```", &mut prompter);

        assert!(report.created.is_empty());
        assert_eq!(fs::read_to_string(root.join("notes.txt")).unwrap(), "mine\n");
        assert!(prompter.said("already exists"));
        assert_eq!(prompter.remaining(), 1);
    }

    #[test]
    fn unresolved_blocks_are_shown() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("a.py", "a\n"), ("b.py", "b\n")], settings());
        let mut prompter = ScriptedPrompter::default();

        let report = session.handle_response("```python\nprint('?')\n```", &mut prompter);

        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].reason, UnresolvedReason::AmbiguousNoHint);
        assert!(prompter.said("print('?')"));
        assert!(fs::read_to_string(root.join("a.py")).unwrap() == "a\n");
    }

    #[test]
    fn duplicate_reject_policy_is_reported() {
        let (_dir, root) = tempdir();
        let mut config = settings();
        config.duplicate_policy = DuplicatePolicy::Reject;
        let mut session = session_with(&root, &[("a.py", "a\n")], config);
        let mut prompter = ScriptedPrompter::default();

        let report = session.handle_response(
            "```py a.py\none\n```\n```py a.py\ntwo\n```",
            &mut prompter,
        );

        assert!(report.applied.is_empty());
        assert_eq!(report.duplicates, [root.join("a.py")]);
        assert!(prompter.said("applied policy: reject"));
    }

    #[test]
    fn read_only_mode_leaves_disk_alone() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("app.py", "print(1)\n")], settings());
        let mut prompter = ScriptedPrompter::default();
        session.execute(Command::Mode(Some("read-only")), &mut prompter);
        assert_eq!(session.mode(), ApprovalMode::ReadOnly);

        let report =
            session.handle_response("```python app.py\nprint(2)\n```", &mut prompter);

        assert!(report.applied.is_empty());
        assert_eq!(fs::read_to_string(root.join("app.py")).unwrap(), "print(1)\n");
    }

    #[test]
    fn git_receives_touched_files() {
        let (_dir, root) = tempdir();
        fs::write(root.join("app.py"), "print(1)\n").unwrap();
        let mut config = settings();
        config.auto_stage = true;
        config.auto_commit = true;
        let git = RecordingGit::new(&root);
        let mut session = Session::new(&root, config, Some(Box::new(git)));
        let mut prompter = ScriptedPrompter::new(["y"]);
        session.load_paths(&["app.py"], &mut prompter);

        let report = session.handle_response("```python app.py\nprint(2)\n```", &mut prompter);

        assert!(report.git.staged && report.git.committed);
        assert!(prompter.said("Committed: procoder AI updates for: app.py"));
    }

    #[test]
    fn undo_modify_reloads_known_content() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("app.py", "print(1)\n")], settings());
        let mut prompter = ScriptedPrompter::new(["y"]);
        session.handle_response("```python app.py\nprint(2)\n```", &mut prompter);

        session.execute(Command::Undo, &mut prompter);
        let app = root.join("app.py");
        assert_eq!(session.files().get(&app), Some("print(1)\n"));

        session.execute(Command::Undo, &mut prompter);
        assert!(prompter.said("Nothing to undo."));

        session.execute(Command::Redo, &mut prompter);
        assert_eq!(session.files().get(&app), Some("print(2)\n"));
    }

    #[test]
    fn turn_bookkeeping() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("app.py", "print(1)\n")], settings());

        assert!(!session.begin_turn("   "));
        assert!(session.begin_turn("make it print 2"));
        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles.last(), Some(&Role::User));
        assert!(roles[..roles.len() - 1].iter().all(|r| *r == Role::System));

        session.abandon_turn();
        assert!(session.messages().iter().all(|m| m.role == Role::System));
        assert!(session.token_estimate() > 0);
    }

    #[test]
    fn commands_manage_files() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("a.py", "a\n"), ("b.py", "b\n")], settings());
        let mut prompter = ScriptedPrompter::default();

        session.execute(Command::Drop(vec!["a.py", "zzz.py"]), &mut prompter);
        assert_eq!(session.files().len(), 1);
        assert!(prompter.said("zzz.py is not a loaded file."));

        session.execute(Command::Files, &mut prompter);
        assert!(prompter.said("1. b.py"));

        session.execute(Command::Clear, &mut prompter);
        assert!(session.files().is_empty());

        session.execute(Command::Unknown("nope"), &mut prompter);
        assert!(prompter.said("Unknown command /nope"));

        assert_eq!(session.execute(Command::Quit, &mut prompter), CommandOutcome::Quit);
    }

    #[test]
    fn context_command_renders_json() {
        let (_dir, root) = tempdir();
        let mut session = session_with(&root, &[("a.py", "a\n")], settings());
        let mut prompter = ScriptedPrompter::default();

        session.execute(Command::Context, &mut prompter);

        let shown = prompter.transcript().iter().find_map(|s| match s {
            Shown::Content { label, content } if label == "context" => Some(content.clone()),
            _ => None,
        });
        let json = shown.unwrap();
        assert!(json.contains("\"role\": \"system\""));
        assert!(json.contains("--- File: a.py ---"));
    }

    #[test]
    fn persisted_history_survives_restart() {
        let (_dir, root) = tempdir();
        let mut config = settings();
        config.persist_history = true;
        let mut session = session_with(&root, &[("app.py", "print(1)\n")], config.clone());
        let mut prompter = ScriptedPrompter::new(["y"]);
        session.handle_response("```python app.py\nprint(2)\n```", &mut prompter);
        drop(session);

        let mut restarted = Session::new(&root, config, None);
        assert_eq!(restarted.ledger().len(), 1);
        assert!(restarted.undo(&mut prompter).is_applied());
        assert_eq!(fs::read_to_string(root.join("app.py")).unwrap(), "print(1)\n");
        assert_eq!(restarted.undo(&mut prompter), HistoryStep::NothingToUndo);
    }
}
