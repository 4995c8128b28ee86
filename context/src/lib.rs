//! Session context for procoder: the files the model can edit, the
//! conversation sent with each request, and approximate token accounting.

mod conversation;
mod known_files;
mod token_counter;

pub use conversation::{Conversation, SYSTEM_PROMPT};
pub use known_files::{KnownFiles, LoadError, LoadOutcome};
pub use token_counter::TokenCounter;
