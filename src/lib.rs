//! MCP Stdio Harness
//!
//! This crate drives a Model Context Protocol (MCP) server over its standard
//! streams: it spawns the server, feeds it a fixed JSON-RPC script, and
//! surfaces every response and stderr line to the operator.
//!
//! # Example
//!
//! ```no_run
//! use mcp_stdio_harness::{run_session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let report = run_session(&SessionConfig::default()).await?;
//!     println!("{} unparseable responses", report.protocol_errors());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod supervisor;

pub use builder::{build_call, build_initialize, build_initialized_notification, build_list};
pub use config::{
    init_logging, LogLevel, PeerCommand, PeerEnvironment, ScriptConfig, SessionConfig, ToolReference,
    WaitPolicy,
};
pub use driver::{run_session, Conversation, Exchange, OperatorPrompt, SessionReport, Step};
pub use error::{HarnessError, Result};
pub use protocol::{ArgValue, CallArguments, JsonRpcRequest, RequestId, ResponseKind};
pub use relay::DiagnosticRelay;
pub use supervisor::{PeerProcess, PeerState};
