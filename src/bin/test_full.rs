//! Run the scripted MCP session against a server process
//!
//! Usage:
//!   mcp-test-full                               # node bin/mcp-server.js
//!   mcp-test-full -- ./target/debug/my-server --stdio
//!
//! Requests and responses are echoed to stdout, server stderr is relayed
//! with a `[SERVER LOG]` prefix, and harness logs go to stderr.

use anyhow::Context;
use clap::Parser;
use mcp_stdio_harness::config::{
    DEFAULT_API_BASE_URL, DEFAULT_OPENAPI_SPEC_PATH, DEFAULT_SERVER_NAME,
};
use mcp_stdio_harness::{
    init_logging, run_session, LogLevel, PeerCommand, PeerEnvironment, SessionConfig, WaitPolicy,
};
use std::ffi::OsString;
use std::time::Duration;

/// Drive an MCP server through initialize, tools/list and tools/call
#[derive(Debug, Parser)]
#[command(name = "mcp-test-full", version)]
struct Args {
    /// Base URL of the API the server wraps
    #[arg(long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Location of the OpenAPI document
    #[arg(long, env = "OPENAPI_SPEC_PATH", default_value = DEFAULT_OPENAPI_SPEC_PATH)]
    openapi_spec_path: String,

    /// Name the server reports about itself
    #[arg(long, env = "SERVER_NAME", default_value = DEFAULT_SERVER_NAME)]
    server_name: String,

    /// Pause after starting the server, in milliseconds
    #[arg(long, default_value_t = 2000)]
    startup_delay_ms: u64,

    /// Pause after the initialized notification, in milliseconds
    #[arg(long, default_value_t = 500)]
    notification_delay_ms: u64,

    /// Wait for Enter after startup and before each tools/call
    #[arg(long)]
    interactive: bool,

    /// Grace period for the server to exit, in milliseconds
    #[arg(long, default_value_t = 2000)]
    shutdown_timeout_ms: u64,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Server command and arguments
    #[arg(last = true, default_values = ["node", "bin/mcp-server.js"])]
    command: Vec<OsString>,
}

impl Args {
    fn session_config(self) -> anyhow::Result<SessionConfig> {
        let mut command = self.command.into_iter();
        let program = command.next().context("No server command given")?;

        let env = PeerEnvironment {
            api_base_url: self.api_base_url,
            openapi_spec_path: self.openapi_spec_path,
            server_name: self.server_name,
        };

        Ok(SessionConfig {
            peer: PeerCommand::new(program, command).with_env(env),
            wait: WaitPolicy {
                startup_delay: Duration::from_millis(self.startup_delay_ms),
                notification_delay: Duration::from_millis(self.notification_delay_ms),
                interactive: self.interactive,
            },
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            ..SessionConfig::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_level);

    let config = args.session_config()?;
    let report = run_session(&config)
        .await
        .context("Failed to start MCP server")?;

    tracing::info!(
        steps = report.exchanges.len(),
        protocol_errors = report.protocol_errors(),
        clean_shutdown = report.shutdown_error.is_none(),
        "Session finished"
    );

    Ok(())
}
