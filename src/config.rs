//! Session configuration and logging setup

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Logging level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Info
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides `level` when set.
///
/// Ignored if a subscriber is already installed.
pub fn init_logging(level: LogLevel) {
    let max_level: tracing::Level = level.into();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(max_level.into()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub const DEFAULT_API_BASE_URL: &str = "https://petstore3.swagger.io/api/v3";
pub const DEFAULT_OPENAPI_SPEC_PATH: &str = "https://petstore3.swagger.io/api/v3/openapi.json";
pub const DEFAULT_SERVER_NAME: &str = "petstore-mcp-server";

/// Variables the peer reads to find the API it wraps.
///
/// Forwarded verbatim; the harness never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEnvironment {
    pub api_base_url: String,
    pub openapi_spec_path: String,
    pub server_name: String,
}

impl Default for PeerEnvironment {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            openapi_spec_path: DEFAULT_OPENAPI_SPEC_PATH.to_string(),
            server_name: DEFAULT_SERVER_NAME.to_string(),
        }
    }
}

impl PeerEnvironment {
    pub fn vars(&self) -> [(&'static str, &str); 3] {
        [
            ("API_BASE_URL", self.api_base_url.as_str()),
            ("OPENAPI_SPEC_PATH", self.openapi_spec_path.as_str()),
            ("SERVER_NAME", self.server_name.as_str()),
        ]
    }
}

/// How to launch the peer.
#[derive(Debug, Clone)]
pub struct PeerCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: PeerEnvironment,
}

impl PeerCommand {
    pub fn new<I, S>(program: impl Into<OsString>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: PeerEnvironment::default(),
        }
    }

    pub fn with_env(mut self, env: PeerEnvironment) -> Self {
        self.env = env;
        self
    }
}

impl Default for PeerCommand {
    fn default() -> Self {
        Self::new("node", ["bin/mcp-server.js"])
    }
}

/// Fixed pauses standing in for a readiness handshake.
///
/// Kept separate from the driver so an acknowledgement-based wait can
/// replace it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Pause after spawning, before the first request.
    pub startup_delay: Duration,
    /// Pause after `notifications/initialized`, before the next request.
    pub notification_delay: Duration,
    /// Wait for the operator to press Enter after spawn and before each call.
    pub interactive: bool,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2),
            notification_delay: Duration::from_millis(500),
            interactive: false,
        }
    }
}

impl WaitPolicy {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            startup_delay: Duration::ZERO,
            notification_delay: Duration::ZERO,
            interactive: false,
        }
    }
}

/// Where a `tools/call` request puts the tool identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolReference {
    /// `params.name`, which is what MCP servers look up.
    #[default]
    Name,
    /// `params.id`
    Id,
}

/// Tool and request ids used by the scripted conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptConfig {
    pub tool_name: String,
    /// Operation id of the same tool, used by the second call.
    pub tool_id: String,
    pub tool_id_reference: ToolReference,
    pub argument: (String, String),
    pub call_by_name_id: String,
    pub call_by_id_id: String,
    pub missing_argument_id: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            tool_name: "getPetById".to_string(),
            tool_id: "GET-pet--petId-".to_string(),
            tool_id_reference: ToolReference::Name,
            argument: ("petId".to_string(), "10".to_string()),
            call_by_name_id: "call-1".to_string(),
            call_by_id_id: "call-2".to_string(),
            missing_argument_id: "error-1".to_string(),
        }
    }
}

/// Everything needed to run one scripted session against a peer.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub peer: PeerCommand,
    pub wait: WaitPolicy,
    pub script: ScriptConfig,
    pub shutdown_timeout: Duration,
    pub relay_join_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            peer: PeerCommand::default(),
            wait: WaitPolicy::default(),
            script: ScriptConfig::default(),
            shutdown_timeout: Duration::from_secs(2),
            relay_join_timeout: crate::supervisor::DEFAULT_RELAY_JOIN_TIMEOUT,
        }
    }
}
