//! Wire protocol for the client WebSocket channel
//!
//! JSON messages dispatched by a `type` discriminator. Inbound payloads
//! tolerate missing optional fields (workspace, auto_save) so older
//! frontends keep working; outbound payloads mirror the shapes the
//! frontend already consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chat::ChatOutcome;
use crate::conversation::Message;

fn default_auto_save() -> bool {
    true
}

/// Inbound message received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Run one chat turn against the external tool.
    AiChat {
        #[serde(default)]
        prompt: String,

        /// Working directory for the tool; defaults to the configured
        /// workspace when absent.
        #[serde(default)]
        workspace: Option<PathBuf>,

        /// Whether the tool may write files without confirmation.
        #[serde(default = "default_auto_save")]
        auto_save: bool,
    },

    /// Drop the connection's conversation history.
    ClearConversation,

    /// Fetch the connection's conversation history.
    GetConversationHistory,
}

/// Outbound message sent back to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Result of a chat turn.
    AiResponse {
        session_id: String,
        prompt: String,
        result: ChatOutcome,
    },

    /// Acknowledgement of a history clear.
    ConversationCleared {
        session_id: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// History snapshot, oldest message first.
    ConversationHistory {
        session_id: String,
        history: Vec<Message>,
        timestamp: DateTime<Utc>,
    },

    /// Structured error; the connection stays open.
    Error { message: String },
}
