//! Context rendering for the external CLI
//!
//! Builds the prompt string actually handed to the external tool: a short
//! excerpt of recent conversation history followed by the new request. The
//! excerpt truncates long message bodies for display only — the stored
//! messages are never modified.

use super::Message;

/// Default number of history messages included in the rendered context.
pub const DEFAULT_CONTEXT_MESSAGES: usize = 10;

/// Default per-message character budget in the rendered context.
pub const DEFAULT_CONTENT_CHARS: usize = 200;

const PREAMBLE: &str = "Previous conversation context:";
const REQUEST_HEADER: &str = "Current request:";

/// Renders a bounded, deterministic context string from a history snapshot.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// How many trailing messages to include
    context_messages: usize,

    /// Character budget per included message
    content_chars: usize,
}

impl ContextBuilder {
    pub fn new(context_messages: usize, content_chars: usize) -> Self {
        Self {
            context_messages,
            content_chars,
        }
    }

    /// Render the prompt for the external tool.
    ///
    /// An empty history returns `new_prompt` unchanged, so the first turn
    /// of a conversation carries no wrapper at all.
    pub fn build(&self, history: &[Message], new_prompt: &str) -> String {
        if history.is_empty() {
            return new_prompt.to_string();
        }

        let mut parts = vec![PREAMBLE.to_string()];

        let start = history.len().saturating_sub(self.context_messages);
        for message in &history[start..] {
            parts.push(format!(
                "{}: {}",
                message.role.capitalized(),
                self.truncate(&message.content)
            ));
        }

        parts.push(format!("\n{}", REQUEST_HEADER));
        parts.push(new_prompt.to_string());

        parts.join("\n")
    }

    /// Display-only truncation, counted in characters rather than bytes so
    /// multi-byte content never splits mid-scalar.
    fn truncate(&self, content: &str) -> String {
        if content.chars().count() <= self.content_chars {
            return content.to_string();
        }
        let mut shortened: String = content.chars().take(self.content_chars).collect();
        shortened.push_str("...");
        shortened
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_MESSAGES, DEFAULT_CONTENT_CHARS)
    }
}
