//! Session-scoped chat orchestration
//!
//! Composes the conversation store, context builder, executor and reply
//! parser into the single entry point the server calls per inbound chat
//! request. One call covers the whole turn: validate, render context, run
//! the external tool in the request's workspace, normalize the reply and
//! update history.
//!
//! Failures never escape this module as errors. Every path returns a
//! structured [`ChatOutcome`] the transport layer can serialize as-is, and
//! history is only ever touched on the two legs the conversation actually
//! took: the user's prompt, and a successfully parsed reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ConversationConfig, ToolConfig};
use crate::conversation::context::ContextBuilder;
use crate::conversation::{MessageRole, SessionStore};
use crate::executor::{CliExecutor, ExecError};
use crate::parser::parse_reply;

/// Directive appended to the rendered context when auto-save is on.
const SAVE_DIRECTIVE: &str = "\n\n### Make sure to edit and save to the file ###";

/// Structured result of one chat turn, serialized verbatim to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    /// Whether the turn produced a usable reply
    pub success: bool,

    /// Normalized reply text (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Raw stderr from the tool, when it ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    /// Tool exit code, when it ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    /// Error classification/message (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the outcome was produced
    pub timestamp: DateTime<Utc>,
}

impl ChatOutcome {
    fn success(reply: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: true,
            stdout: Some(reply),
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: None,
            stderr: None,
            exit_code: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    fn tool_failure(error: String, stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: false,
            stdout: Some(stdout),
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Orchestrates chat turns against the external CLI for all sessions.
pub struct ChatEngine {
    store: Arc<SessionStore>,
    context: ContextBuilder,
    executor: CliExecutor,
    command: String,
    timeout: Duration,
}

impl ChatEngine {
    pub fn new(store: Arc<SessionStore>, conversation: &ConversationConfig, tool: &ToolConfig) -> Self {
        Self {
            store,
            context: ContextBuilder::new(
                conversation.context_messages,
                conversation.context_content_chars,
            ),
            executor: CliExecutor::new(tool.api_key_env.clone()),
            command: tool.command.clone(),
            timeout: Duration::from_secs(tool.timeout_secs),
        }
    }

    /// Run one chat turn for `session_id`.
    pub async fn handle_chat(
        &self,
        session_id: &str,
        prompt: &str,
        workspace: &Path,
        auto_save: bool,
    ) -> ChatOutcome {
        if prompt.trim().is_empty() {
            return ChatOutcome::failure("Empty prompt provided");
        }

        // Render context from the history as it stood before this turn,
        // then record the original prompt (not the rendered context) so
        // history never nests.
        let history = self.store.history(session_id);
        let mut context = self.context.build(&history, prompt);
        if auto_save {
            context.push_str(SAVE_DIRECTIVE);
        }
        self.store.append(session_id, MessageRole::User, prompt);

        let mut argv = vec![self.command.clone(), "-q".to_string()];
        if auto_save {
            argv.push("--full-auto".to_string());
        }
        argv.push(context);

        info!(
            session_id,
            workspace = %workspace.display(),
            auto_save,
            "invoking external tool"
        );

        let output = match self.executor.run(&argv, workspace, self.timeout).await {
            Ok(output) => output,
            Err(ExecError::Spawn { source, .. }) => {
                warn!(session_id, %source, "external tool could not be started");
                return ChatOutcome::failure(self.install_hint());
            }
            Err(ExecError::Timeout { seconds }) => {
                warn!(session_id, "external tool timed out");
                return ChatOutcome::failure(format!(
                    "{} execution timed out after {} seconds",
                    self.command, seconds
                ));
            }
        };

        if output.success() {
            let reply = parse_reply(&output.stdout);
            self.store
                .append(session_id, MessageRole::Assistant, reply.clone());
            return ChatOutcome::success(reply, output.stderr, output.exit_code);
        }

        // Ran but failed: prefer stderr, then stdout, then the bare exit
        // code, and rewrite recognizable failures into actionable hints.
        let raw = if !output.stderr.is_empty() {
            output.stderr.clone()
        } else if !output.stdout.is_empty() {
            output.stdout.clone()
        } else {
            format!("{} failed with exit code {}", self.command, output.exit_code)
        };
        let error = self.classify_failure(raw);

        warn!(session_id, exit_code = output.exit_code, "external tool failed");
        ChatOutcome::tool_failure(error, output.stdout, output.stderr, output.exit_code)
    }

    /// Rewrite known failure texts into configuration guidance.
    fn classify_failure(&self, raw: String) -> String {
        let lower = raw.to_lowercase();

        if raw.contains("API key") || lower.contains("authentication") {
            return format!(
                "⚠️ API key not configured. Please set the {} environment variable.",
                self.executor_key_env()
            );
        }

        if lower.contains("not found") && lower.contains(&self.command.to_lowercase()) {
            return self.install_hint();
        }

        raw
    }

    fn install_hint(&self) -> String {
        if self.command == "codex" {
            "⚠️ Codex CLI not found. Please install with: npm install -g @openai/codex".to_string()
        } else {
            format!(
                "⚠️ '{}' not found. Please make sure it is installed and on your PATH.",
                self.command
            )
        }
    }

    fn executor_key_env(&self) -> &str {
        self.executor.api_key_env()
    }
}
