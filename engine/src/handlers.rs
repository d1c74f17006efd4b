//! Command handlers for CLI operations
//!
//! This module implements the handlers for the CLI commands:
//! - serve: run the HTTP/WebSocket server
//! - doctor: check the external tool and credential configuration

use anyhow::Result;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;

use crate::config::Config;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run the server until shutdown.
pub async fn handle_serve(config: &Config) -> Result<()> {
    crate::server::serve(config).await
}

/// Report whether the external tool and its credential are usable.
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let tool_available = probe_tool(&config.tool.command).await;
    let api_key_set = std::env::var(&config.tool.api_key_env)
        .map(|value| !value.is_empty())
        .unwrap_or(false);
    let config_path = Config::default_config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "(unknown)".to_string());

    match format {
        OutputFormat::Text => {
            println!("Relay diagnostics:");
            println!("  Config file:   {}", config_path);
            println!(
                "  Tool ({}):  {}",
                config.tool.command,
                if tool_available {
                    "available"
                } else {
                    "NOT FOUND"
                }
            );
            println!(
                "  {}: {}",
                config.tool.api_key_env,
                if api_key_set { "set" } else { "NOT SET" }
            );

            if !tool_available {
                println!();
                println!(
                    "Install the tool and make sure '{}' is on your PATH.",
                    config.tool.command
                );
            }
            if !api_key_set {
                println!();
                println!(
                    "Export {} before starting the server.",
                    config.tool.api_key_env
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "config_path": config_path,
                    "tool": config.tool.command,
                    "tool_available": tool_available,
                    "api_key_env": config.tool.api_key_env,
                    "api_key_set": api_key_set,
                })
            );
        }
    }

    Ok(())
}

/// Cheapest possible invocation to see whether the tool starts at all.
async fn probe_tool(command: &str) -> bool {
    let probe = tokio::process::Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status();

    matches!(
        tokio::time::timeout(Duration::from_secs(10), probe).await,
        Ok(Ok(status)) if status.success()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_probe_tool_reports_present_binary() {
        // `true` ignores its arguments and exits 0 everywhere
        assert!(probe_tool("true").await);
    }

    #[tokio::test]
    async fn test_probe_tool_reports_missing_binary() {
        assert!(!probe_tool("relay-no-such-binary-7f3a").await);
    }
}
