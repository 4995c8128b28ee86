//! Conversation history sent with each model request.

use procoder_types::{Message, NonEmptyString, Role};

use crate::{KnownFiles, TokenCounter};

pub const SYSTEM_PROMPT: &str = "You are procoder, an expert AI programming assistant working in the user's terminal. \
Your goal is to help the user understand, modify, and generate code based on the provided files and conversation. \
When asked to make changes:\n\
1. Explain the changes clearly.\n\
2. Provide the complete, updated content of each file you change in a Markdown code block.\n\
3. Always put a filename hint on the opening fence, like ```python filename=\"path/to/file.py\".\n\
4. Use a separate code block for each file, including new files.\n\
5. If the request is unclear, ask clarifying questions.";

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn push_user(&mut self, content: NonEmptyString) {
        self.messages.push(Message::user(content));
    }

    pub fn push_assistant(&mut self, content: NonEmptyString) {
        self.messages.push(Message::assistant(content));
    }

    /// Remove the trailing user message (its request failed).
    pub fn pop_user(&mut self) -> Option<Message> {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Seed an empty conversation with the system prompt, the Git root and
    /// the content of every known file. No-op once the conversation has started.
    pub fn prepare_context(&mut self, files: &KnownFiles) {
        if !self.messages.is_empty() {
            return;
        }
        self.messages
            .extend(context_messages(files).into_iter().map(Message::system));
    }

    /// Tell an ongoing conversation about a file loaded after it started.
    /// An empty conversation picks the file up in [`Self::prepare_context`].
    pub fn push_file_context(&mut self, display_name: &str, content: &str) {
        if self.messages.is_empty() {
            return;
        }
        if let Ok(msg) = NonEmptyString::new(format!(
            "The user loaded another file into the context:\n\n{}",
            file_block(display_name, content)
        )) {
            self.messages.push(Message::system(msg));
        }
    }

    /// Keep every system message plus the most recent `max_messages`
    /// user/assistant messages. Returns how many were dropped.
    pub fn limit(&mut self, max_messages: usize) -> usize {
        let dialogue = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .count();
        if dialogue <= max_messages {
            return 0;
        }

        let mut skip = dialogue - max_messages;
        let dropped = skip;
        let (system, rest): (Vec<Message>, Vec<Message>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| m.role == Role::System);
        self.messages = system;
        self.messages.extend(rest.into_iter().filter(|_| {
            if skip > 0 {
                skip -= 1;
                false
            } else {
                true
            }
        }));
        tracing::debug!(dropped, kept = max_messages, "Conversation history truncated");
        dropped
    }

    #[must_use]
    pub fn estimate_tokens(&self, counter: &TokenCounter) -> u32 {
        counter.count_messages(&self.messages)
    }
}

fn context_messages(files: &KnownFiles) -> Vec<NonEmptyString> {
    let mut out = Vec::new();
    if let Ok(prompt) = NonEmptyString::new(SYSTEM_PROMPT) {
        out.push(prompt);
    }

    if let Some(root) = files.git_root()
        && let Ok(msg) = NonEmptyString::new(format!(
            "The user is working inside a Git repository located at: {}",
            root.display()
        ))
    {
        out.push(msg);
    }

    if !files.is_empty() {
        let mut body = String::from("The user has loaded the following files into the context:\n\n");
        for (path, content) in files.iter() {
            body.push_str(&file_block(&files.display_name(path), content));
            body.push_str("\n\n");
        }
        if let Ok(msg) = NonEmptyString::new(body.trim_end()) {
            out.push(msg);
        }
    }
    out
}

fn file_block(name: &str, content: &str) -> String {
    format!("--- File: {name} ---\n```\n{content}\n```")
}
