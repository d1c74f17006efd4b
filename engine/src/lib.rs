//! Relay Engine Library
//!
//! This library provides the core functionality of the relay engine:
//! per-session conversation state, context rendering, timeout-bounded
//! execution of the external AI CLI, reply normalization, and the
//! WebSocket server that ties them together. It is used by both the main
//! binary and integration tests.

/// Configuration management module
pub mod config;

/// Conversation session store and context rendering
pub mod conversation;

/// Reply extraction from the external CLI output
pub mod parser;

/// Timeout-bounded external CLI execution
pub mod executor;

/// Session-scoped chat orchestration
pub mod chat;

/// HTTP/WebSocket server and connection hub
pub mod server;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
