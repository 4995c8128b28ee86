//! Slash command parsing.

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub usage: &'static str,
    pub help_label: &'static str,
    pub description: &'static str,
    pub show_in_help: bool,
}

const COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        usage: "load <path>...",
        help_label: "load",
        description: "Load or reload file(s) into context",
        show_in_help: true,
    },
    CommandSpec {
        usage: "drop <path>...",
        help_label: "drop",
        description: "Remove file(s) from context",
        show_in_help: true,
    },
    CommandSpec {
        usage: "files",
        help_label: "files",
        description: "List loaded files",
        show_in_help: true,
    },
    CommandSpec {
        usage: "clear",
        help_label: "clear",
        description: "Clear conversation history and loaded files",
        show_in_help: true,
    },
    CommandSpec {
        usage: "undo",
        help_label: "undo",
        description: "Revert the last applied change",
        show_in_help: true,
    },
    CommandSpec {
        usage: "redo",
        help_label: "redo",
        description: "Reapply the last undone change",
        show_in_help: true,
    },
    CommandSpec {
        usage: "history",
        help_label: "history",
        description: "Show the change history",
        show_in_help: true,
    },
    CommandSpec {
        usage: "mode [read-only|auto|full-access]",
        help_label: "mode",
        description: "Show or set the approval mode",
        show_in_help: true,
    },
    CommandSpec {
        usage: "context",
        help_label: "context",
        description: "Show what the next request will send",
        show_in_help: true,
    },
    CommandSpec {
        usage: "help",
        help_label: "help",
        description: "Show available commands",
        show_in_help: false,
    },
    CommandSpec {
        usage: "quit, exit",
        help_label: "q(uit)",
        description: "Exit procoder",
        show_in_help: true,
    },
];

#[must_use]
pub fn command_specs() -> &'static [CommandSpec] {
    COMMAND_SPECS
}

#[must_use]
pub fn command_help_summary() -> String {
    let labels: Vec<&str> = COMMAND_SPECS
        .iter()
        .filter(|spec| spec.show_in_help)
        .map(|spec| spec.help_label)
        .collect();
    format!("Commands: /{}", labels.join(", /"))
}

/// Multi-line help listing every command with its usage.
#[must_use]
pub fn command_help() -> String {
    let width = COMMAND_SPECS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    let mut out = String::from("Available commands:");
    for spec in COMMAND_SPECS {
        out.push_str(&format!(
            "\n  /{usage:<width$}  {desc}",
            usage = spec.usage,
            desc = spec.description
        ));
    }
    out
}

/// Parsed command with typed arguments.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Load(Vec<&'a str>),
    Drop(Vec<&'a str>),
    Files,
    Clear,
    Undo,
    Redo,
    History,
    Mode(Option<&'a str>),
    Context,
    Help,
    Quit,
    Unknown(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    /// Parse a command line without its leading `/`.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        let mut parts = raw.split_whitespace();
        let Some(name) = parts.next() else {
            return Command::Empty;
        };

        match name.to_ascii_lowercase().as_str() {
            "load" | "add" => Command::Load(parts.collect()),
            "drop" | "rm" => Command::Drop(parts.collect()),
            "files" | "ls" => Command::Files,
            "clear" => Command::Clear,
            "undo" => Command::Undo,
            "redo" => Command::Redo,
            "history" | "hist" => Command::History,
            "mode" => Command::Mode(parts.next()),
            "context" | "ctx" => Command::Context,
            "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            _ => Command::Unknown(name),
        }
    }

    /// Parse a full input line; `None` if it is not a slash command.
    #[must_use]
    pub fn from_input(line: &'a str) -> Option<Self> {
        line.trim_start().strip_prefix('/').map(Self::parse)
    }
}
