//! Change history: undo, redo, bounds and persistence across sessions.

use procoder_engine::{
    ApprovalMode, ChangeKind, Command, HistoryStep, Ledger, ScriptedPrompter, Session, Settings,
};

use crate::common::Workspace;

fn auto_settings() -> Settings {
    let mut settings = Settings::default();
    settings.approval_mode = ApprovalMode::FullAccess;
    settings
}

fn rewrite(session: &mut Session, name: &str, content: &str) {
    let reply = format!("```text {name}\n{content}```");
    let report = session.handle_response(&reply, &mut ScriptedPrompter::default());
    assert_eq!(report.applied.len(), 1, "rewrite of {name} applied");
}

#[test]
fn undo_then_redo_round_trips_the_file() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], auto_settings());
    rewrite(&mut session, "app.py", "print(2)\n");
    let mut prompter = ScriptedPrompter::default();

    let step = session.undo(&mut prompter);
    assert_eq!(
        step,
        HistoryStep::Applied {
            kind: ChangeKind::Modify,
            files: vec![ws.path("app.py")],
        }
    );
    assert_eq!(ws.read("app.py"), "print(1)\n");
    assert!(prompter.said("Undid modify of: app.py"));

    assert!(session.redo(&mut prompter).is_applied());
    assert_eq!(ws.read("app.py"), "print(2)\n");
    assert_eq!(session.redo(&mut prompter), HistoryStep::NothingToRedo);
}

#[test]
fn undo_does_not_rewrite_the_backup() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], auto_settings());
    rewrite(&mut session, "app.py", "print(2)\n");
    rewrite(&mut session, "app.py", "print(3)\n");
    assert_eq!(ws.read("app.py.bak"), "print(2)\n");

    session.undo(&mut ScriptedPrompter::default());

    assert_eq!(ws.read("app.py"), "print(2)\n");
    assert_eq!(ws.read("app.py.bak"), "print(2)\n");
}

#[test]
fn history_keeps_only_the_newest_records() {
    let ws = Workspace::new();
    let mut settings = auto_settings();
    settings.history_limit = 3;
    let mut session = ws.session(&[("counter.txt", "v0\n")], settings);

    for i in 1..=8 {
        rewrite(&mut session, "counter.txt", &format!("v{i}\n"));
    }
    assert_eq!(session.ledger().len(), 3);

    let mut prompter = ScriptedPrompter::default();
    for _ in 0..3 {
        assert!(session.undo(&mut prompter).is_applied());
    }
    assert_eq!(session.undo(&mut prompter), HistoryStep::NothingToUndo);
    assert_eq!(ws.read("counter.txt"), "v5\n");
}

#[test]
fn new_change_after_undo_discards_redo() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "a\n")], auto_settings());
    rewrite(&mut session, "app.py", "b\n");
    rewrite(&mut session, "app.py", "c\n");

    session.undo(&mut ScriptedPrompter::default());
    session.undo(&mut ScriptedPrompter::default());
    assert_eq!(session.ledger().redo_depth(), 2);

    rewrite(&mut session, "app.py", "d\n");

    assert!(!session.ledger().can_redo());
    assert_eq!(session.ledger().len(), 1);
    assert_eq!(
        session.redo(&mut ScriptedPrompter::default()),
        HistoryStep::NothingToRedo
    );
    session.undo(&mut ScriptedPrompter::default());
    assert_eq!(ws.read("app.py"), "a\n");
}

#[test]
fn one_response_is_one_record() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("a.py", "a\n"), ("b.py", "b\n")], auto_settings());

    session.handle_response(
        "```python a.py\na2\n```\n```python b.py\nb2\n```",
        &mut ScriptedPrompter::default(),
    );

    assert_eq!(session.ledger().len(), 1);
    let record = session.ledger().peek_undo().expect("record to undo");
    assert_eq!(record.files().len(), 2);

    session.undo(&mut ScriptedPrompter::default());
    assert_eq!(ws.read("a.py"), "a\n");
    assert_eq!(ws.read("b.py"), "b\n");
}

#[test]
fn created_file_is_removed_by_undo() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "x\n")], auto_settings());

    session.handle_response(
        "```python docs/notes.md\n# Notes\n```",
        &mut ScriptedPrompter::default(),
    );
    assert_eq!(ws.read("docs/notes.md"), "# Notes\n");

    let step = session.undo(&mut ScriptedPrompter::default());
    assert!(matches!(step, HistoryStep::Applied { kind: ChangeKind::Create, .. }));
    assert!(!ws.exists("docs/notes.md"));

    session.redo(&mut ScriptedPrompter::default());
    assert_eq!(ws.read("docs/notes.md"), "# Notes\n");
}

#[test]
fn history_command_lists_records() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "1\n")], auto_settings());
    let mut prompter = ScriptedPrompter::default();

    session.execute(Command::History, &mut prompter);
    assert!(prompter.said("No change history."));

    rewrite(&mut session, "app.py", "2\n");
    session.execute(Command::History, &mut prompter);

    assert!(prompter.said("Change history (1 of max 50, newest first):"));
    assert!(prompter.said("app.py"));
    assert!(prompter.said("Nothing to redo."));
}

#[test]
fn persisted_history_is_restored_in_a_new_session() {
    let ws = Workspace::new();
    let mut settings = auto_settings();
    settings.persist_history = true;

    let mut session = ws.session(&[("app.py", "print(1)\n")], settings.clone());
    rewrite(&mut session, "app.py", "print(2)\n");
    drop(session);

    assert!(Ledger::journal_path(&ws.root).is_file());

    let mut restarted = Session::new(&ws.root, settings, None);
    assert_eq!(restarted.ledger().len(), 1);
    assert!(restarted.undo(&mut ScriptedPrompter::default()).is_applied());
    assert_eq!(ws.read("app.py"), "print(1)\n");
}
