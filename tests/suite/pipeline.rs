//! Response-to-file-change pipeline: extraction, approval and application.

use procoder_engine::{
    ApprovalMode, DuplicatePolicy, ScriptedPrompter, Settings, Shown, UnresolvedReason,
    backup_path,
};

use crate::common::{Workspace, relative};

const EXAMPLE_REPLY: &str = "Here is the fix:\n```python filename=\"app.py\"\nprint(2)\n```\n";

#[test]
fn accepted_change_is_written_with_backup() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["y"]);

    let report = session.handle_response(EXAMPLE_REPLY, &mut prompter);

    assert_eq!(relative(&ws.root, &report.applied), [std::path::Path::new("app.py")]);
    assert_eq!(ws.read("app.py"), "print(2)\n");
    assert_eq!(ws.read("app.py.bak"), "print(1)\n");
    assert_eq!(session.ledger().len(), 1);

    let diffs = prompter.diffs();
    assert_eq!(diffs.len(), 1);
    let diff = diffs[0];
    assert!(diff.contains("--- a/app.py"));
    assert!(diff.contains("+++ b/app.py"));
    assert!(diff.contains("@@"));
    assert!(diff.contains("-print(1)"));
    assert!(diff.contains("+print(2)"));
    assert_eq!(
        prompter.questions(),
        ["Apply changes to app.py? [y]es/[n]o/[d]etails/[q]uit"]
    );
}

#[test]
fn declined_change_leaves_disk_and_history_alone() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["n"]);

    let report = session.handle_response(EXAMPLE_REPLY, &mut prompter);

    assert!(report.applied.is_empty());
    assert_eq!(ws.read("app.py"), "print(1)\n");
    assert!(!backup_path(&ws.path("app.py")).exists());
    assert!(session.ledger().is_empty());
}

#[test]
fn details_show_full_content_before_deciding() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["d", "maybe", "y"]);

    session.handle_response(EXAMPLE_REPLY, &mut prompter);

    assert!(prompter.transcript().iter().any(|shown| matches!(
        shown,
        Shown::Content { label, content } if label == "app.py" && content == "print(2)\n"
    )));
    assert_eq!(prompter.questions().len(), 3);
    assert_eq!(ws.read("app.py"), "print(2)\n");
}

#[test]
fn quit_abandons_the_whole_batch() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("a.py", "a = 1\n"), ("b.py", "b = 1\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["q"]);

    let report = session.handle_response(
        "```python a.py\na = 2\n```\n\n```python b.py\nb = 2\n```",
        &mut prompter,
    );

    assert!(report.applied.is_empty());
    assert_eq!(prompter.remaining(), 0);
    assert_eq!(ws.read("a.py"), "a = 1\n");
    assert_eq!(ws.read("b.py"), "b = 1\n");
}

#[test]
fn closed_input_applies_nothing() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response(EXAMPLE_REPLY, &mut prompter);

    assert!(report.applied.is_empty());
    assert_eq!(ws.read("app.py"), "print(1)\n");
}

#[test]
fn backups_can_be_disabled() {
    let ws = Workspace::new();
    let mut settings = Settings::default();
    settings.backup = false;
    let mut session = ws.session(&[("app.py", "print(1)\n")], settings);

    session.handle_response(EXAMPLE_REPLY, &mut ScriptedPrompter::new(["y"]));

    assert_eq!(ws.read("app.py"), "print(2)\n");
    assert!(!ws.exists("app.py.bak"));
}

#[test]
fn full_access_never_asks() {
    let ws = Workspace::new();
    let mut settings = Settings::default();
    settings.approval_mode = ApprovalMode::FullAccess;
    let mut session = ws.session(&[("app.py", "print(1)\n")], settings);
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response(EXAMPLE_REPLY, &mut prompter);

    assert_eq!(report.applied.len(), 1);
    assert!(prompter.questions().is_empty());
    assert!(prompter.said("Auto-approved app.py"));
}

#[test]
fn identical_content_is_skipped_without_asking() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response("```python app.py\nprint(1)\n```", &mut prompter);

    assert!(report.applied.is_empty());
    assert!(prompter.said("No changes detected for app.py"));
    assert!(session.ledger().is_empty());
}

#[test]
fn hint_suffix_selects_the_nested_file() {
    let ws = Workspace::new();
    let mut session = ws.session(
        &[("src/app/main.py", "old\n"), ("tools/main_test.py", "test\n")],
        Settings::default(),
    );

    let report = session.handle_response(
        "```python path=app/main.py\nnew\n```",
        &mut ScriptedPrompter::new(["y"]),
    );

    assert_eq!(report.applied, [ws.path("src/app/main.py")]);
    assert_eq!(ws.read("src/app/main.py"), "new\n");
    assert_eq!(ws.read("tools/main_test.py"), "test\n");
}

#[test]
fn hint_naming_a_root_file_is_not_sent_to_a_nested_namesake() {
    let ws = Workspace::new();
    let mut session = ws.session(
        &[("a/util.rs", "nested\n"), ("util.rs", "root\n")],
        Settings::default(),
    );

    let report = session.handle_response(
        "```rust filename=\"util.rs\"\nedited\n```",
        &mut ScriptedPrompter::new(["y"]),
    );

    assert_eq!(report.applied, [ws.path("util.rs")]);
    assert_eq!(ws.read("util.rs"), "edited\n");
    assert_eq!(ws.read("a/util.rs"), "nested\n");
}

#[test]
fn hint_matching_the_end_of_a_name_selects_that_file() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("data.py", "rows = []\n")], Settings::default());

    let report = session.handle_response(
        "```python ta.py\nrows = [1]\n```",
        &mut ScriptedPrompter::new(["y"]),
    );

    assert_eq!(report.applied, [ws.path("data.py")]);
    assert!(report.created.is_empty());
    assert_eq!(ws.read("data.py"), "rows = [1]\n");
}

#[test]
fn unhinted_block_goes_to_the_only_known_file() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "print(1)\n")], Settings::default());

    let report = session.handle_response(
        "```python\nprint(3)\n```",
        &mut ScriptedPrompter::new(["y"]),
    );

    assert_eq!(report.applied.len(), 1);
    assert_eq!(ws.read("app.py"), "print(3)\n");
}

#[test]
fn unhinted_block_with_several_known_files_is_unresolved() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("a.py", "a\n"), ("b.py", "b\n")], Settings::default());
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response("```python\nx = 1\n```", &mut prompter);

    assert!(report.applied.is_empty());
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].reason, UnresolvedReason::AmbiguousNoHint);
    assert!(prompter.questions().is_empty());
}

#[test]
fn bare_word_hint_is_unresolved() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("a.py", "a\n"), ("b.py", "b\n")], Settings::default());
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response("```python helper\ndef f(): pass\n```", &mut prompter);

    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].hint.as_deref(), Some("helper"));
    assert_eq!(report.unresolved[0].reason, UnresolvedReason::UnmatchedHint);
    assert!(report.created.is_empty());
    assert!(prompter.said("def f(): pass"));
}

#[test]
fn last_block_wins_by_default() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "v0\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["y"]);

    let report = session.handle_response(
        "```python app.py\nv1\n```\nor better:\n```python app.py\nv2\n```",
        &mut prompter,
    );

    assert_eq!(ws.read("app.py"), "v2\n");
    assert_eq!(report.duplicates, [ws.path("app.py")]);
    assert!(prompter.said("applied policy: last_wins"));
}

#[test]
fn first_wins_policy_keeps_the_first_block() {
    let ws = Workspace::new();
    let mut settings = Settings::default();
    settings.duplicate_policy = DuplicatePolicy::FirstWins;
    let mut session = ws.session(&[("app.py", "v0\n")], settings);

    session.handle_response(
        "```python app.py\nv1\n```\n```python app.py\nv2\n```",
        &mut ScriptedPrompter::new(["y"]),
    );

    assert_eq!(ws.read("app.py"), "v1\n");
}

#[test]
fn new_file_is_created_after_approval() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "import util\n")], Settings::default());
    let mut prompter = ScriptedPrompter::new(["y"]);

    let report = session.handle_response(
        "Add a helper:\n```python filename=\"lib/util.py\"\ndef helper():\n    return 1\n```",
        &mut prompter,
    );

    assert_eq!(report.created, [ws.path("lib/util.py")]);
    assert_eq!(ws.read("lib/util.py"), "def helper():\n    return 1\n");
    assert_eq!(prompter.questions(), ["Create lib/util.py? [y]es/[n]o/[d]etails/[q]uit"]);
    assert!(session.files().contains(&ws.path("lib/util.py")));
}

#[test]
fn declined_new_file_is_not_created() {
    let ws = Workspace::new();
    let mut session = ws.session(&[("app.py", "x\n")], Settings::default());

    let report = session.handle_response(
        "```python util.py\ndef helper(): ...\n```",
        &mut ScriptedPrompter::new(["n"]),
    );

    assert!(report.created.is_empty());
    assert!(!ws.exists("util.py"));
    assert!(session.ledger().is_empty());
}

#[test]
fn read_only_mode_writes_nothing() {
    let ws = Workspace::new();
    let mut settings = Settings::default();
    settings.approval_mode = ApprovalMode::ReadOnly;
    let mut session = ws.session(&[("app.py", "print(1)\n")], settings);
    let mut prompter = ScriptedPrompter::default();

    let report = session.handle_response(
        "```python app.py\nprint(2)\n```\n```python new.py\nx = 1\n```",
        &mut prompter,
    );

    assert!(report.touched().is_empty());
    assert_eq!(ws.read("app.py"), "print(1)\n");
    assert!(!ws.exists("new.py"));
    assert!(prompter.said("Read-only mode"));
}

#[test]
fn file_outside_working_dir_needs_extra_consent() {
    let ws = Workspace::new();
    let outside = Workspace::new();
    let target = outside.write("shared.py", "s = 1\n");

    let mut session = ws.session(&[], Settings::default());
    let spec = target.display().to_string();
    session.load_paths(&[spec.as_str()], &mut ScriptedPrompter::default());
    let mut prompter = ScriptedPrompter::new(["n"]);

    let report = session.handle_response("```python shared.py\ns = 2\n```", &mut prompter);

    assert!(report.applied.is_empty());
    assert_eq!(outside.read("shared.py"), "s = 1\n");
    assert!(prompter.questions()[0].contains("outside the working directory"));
}
