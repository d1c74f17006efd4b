//! CLI interface for Relay
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines the commands and global flags for running the relay server.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Relay Engine
///
/// Bridges a browser frontend to an AI code-assistant CLI over a
/// WebSocket, keeping per-session conversation context on the server.
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP/WebSocket server
    Serve {
        /// Bind host override
        #[arg(long)]
        host: Option<String>,

        /// Bind port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check external tool availability and credential configuration
    Doctor,
}
