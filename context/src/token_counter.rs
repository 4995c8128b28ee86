//! Token counting using tiktoken.
//!
//! Counts are **approximate**: the `o200k_base` encoding is exact only for
//! OpenAI models, and OpenRouter fronts many providers with their own
//! tokenizers. Good enough to warn before a request gets too large.

use std::sync::OnceLock;
use tiktoken_rs::{CoreBPE, o200k_base};

use procoder_types::Message;

/// Per-message allowance for role markers and delimiters.
const MESSAGE_OVERHEAD: u32 = 4;

/// The encoder loads its vocabulary on construction, so build it once.
static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn get_encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Approximate token counter backed by a shared `o200k_base` encoder.
///
/// Falls back to byte length when the encoder cannot be initialised.
///
/// ```
/// use procoder_context::TokenCounter;
///
/// let counter = TokenCounter::new();
/// assert!(counter.count_str("Hello, world!") > 0);
/// ```
#[derive(Clone, Copy)]
pub struct TokenCounter {
    encoder: Option<&'static CoreBPE>,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCounter")
            .field("encoder", &self.encoder.map(|_| "<CoreBPE>"))
            .finish()
    }
}

impl Default for TokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter {
    #[must_use]
    pub fn new() -> Self {
        let encoder = get_encoder();
        if encoder.is_none() {
            tracing::error!(
                "Failed to initialize tiktoken o200k_base encoder. Falling back to byte-length estimates."
            );
        }
        Self { encoder }
    }

    #[must_use]
    pub fn count_str(&self, text: &str) -> u32 {
        let len = match self.encoder {
            Some(encoder) => encoder.encode_ordinary(text).len(),
            None => text.len(),
        };
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    /// Tokens for one message, including the role name and fixed overhead.
    #[must_use]
    pub fn count_message(&self, msg: &Message) -> u32 {
        self.count_str(msg.role.as_str())
            .saturating_add(self.count_str(msg.content.as_str()))
            .saturating_add(MESSAGE_OVERHEAD)
    }

    #[must_use]
    pub fn count_messages(&self, messages: &[Message]) -> u32 {
        messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.count_message(m)))
    }
}
