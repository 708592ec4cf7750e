//! Error types for the harness

use std::time::Duration;
use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors raised while building requests or driving a peer
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Builder inputs do not describe a valid request
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The peer process could not be launched
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A response line was not valid JSON, or the peer closed its output
    #[error("protocol error: {reason}")]
    Protocol { reason: String, line: String },

    /// The peer was still running when the grace period ran out
    #[error("peer did not exit within {}ms", .0.as_millis())]
    ShutdownTimeout(Duration),

    /// Reading from or writing to the peer's pipes failed
    #[error("I/O error talking to peer: {0}")]
    Io(#[from] std::io::Error),

    /// A request could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Non-fatal errors are logged and the script moves on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Protocol { .. } | Self::ShutdownTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_timeout_reports_grace_period() {
        let err = HarnessError::ShutdownTimeout(Duration::from_millis(2000));
        assert_eq!(err.to_string(), "peer did not exit within 2000ms");
        assert!(!err.is_fatal());
    }

    #[test]
    fn spawn_errors_are_fatal() {
        let err = HarnessError::Spawn {
            program: "missing-binary".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("missing-binary"));
    }

    #[test]
    fn protocol_errors_are_not_fatal() {
        let err = HarnessError::Protocol {
            reason: "expected value at line 1 column 1".into(),
            line: "garbage".into(),
        };
        assert!(!err.is_fatal());
    }
}
