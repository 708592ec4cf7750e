//! Peer process lifecycle: spawn, stream wiring, termination

use crate::config::PeerCommand;
use crate::driver::Conversation;
use crate::error::{HarnessError, Result};
use crate::relay::DiagnosticRelay;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

pub const DEFAULT_RELAY_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Running,
    Terminating,
    Exited,
}

/// A spawned MCP server with its stdin/stdout pipes and stderr relay.
pub struct PeerProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    relay: Option<DiagnosticRelay>,
    relay_join_timeout: Duration,
    state: PeerState,
}

impl PeerProcess {
    /// Launch the peer with all three standard streams piped.
    ///
    /// The peer inherits the harness environment with the three
    /// [`crate::PeerEnvironment`] variables layered on top. Its stderr is
    /// handed to a [`DiagnosticRelay`] right away, so this must be called
    /// from within a tokio runtime.
    pub fn start(command: &PeerCommand) -> Result<Self> {
        let program = command.program.to_string_lossy().into_owned();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let missing = |stream: &str| HarnessError::Spawn {
            program: program.clone(),
            source: std::io::Error::other(format!("{} was not captured", stream)),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let relay = DiagnosticRelay::spawn(stderr);

        tracing::info!(program = %program, pid = child.id(), "Started peer process");

        Ok(Self {
            program,
            child,
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            relay: Some(relay),
            relay_join_timeout: DEFAULT_RELAY_JOIN_TIMEOUT,
            state: PeerState::Running,
        })
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// OS process id, while the peer has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn set_relay_join_timeout(&mut self, timeout: Duration) {
        self.relay_join_timeout = timeout;
    }

    /// Borrow the peer's stdin/stdout as a conversation.
    ///
    /// Returns `None` once the peer has been terminated.
    pub fn conversation(
        &mut self,
    ) -> Option<Conversation<&mut ChildStdin, &mut BufReader<ChildStdout>>> {
        match (self.stdin.as_mut(), self.stdout.as_mut()) {
            (Some(writer), Some(reader)) => Some(Conversation::new(writer, reader)),
            _ => None,
        }
    }

    /// Close stdin, signal the peer to stop, and wait up to `timeout`.
    ///
    /// A peer still running after `timeout` is killed and
    /// [`HarnessError::ShutdownTimeout`] is returned. Either way the pipes are
    /// released and the stderr relay is joined before returning.
    pub async fn terminate(&mut self, timeout: Duration) -> Result<()> {
        if self.state == PeerState::Exited {
            return Ok(());
        }
        self.state = PeerState::Terminating;

        // EOF on stdin first; some servers exit on that alone.
        self.stdin.take();
        self.signal_terminate();

        let result = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(program = %self.program, status = %status, "Peer exited");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(program = %self.program, "Failed to wait for peer: {}", e);
                if let Err(e) = self.child.start_kill() {
                    tracing::error!(program = %self.program, "Failed to kill peer: {}", e);
                }
                Err(HarnessError::Io(e))
            }
            Err(_) => {
                tracing::warn!(
                    program = %self.program,
                    timeout_ms = timeout.as_millis() as u64,
                    "Peer did not exit in time, killing it"
                );
                if let Err(e) = self.child.kill().await {
                    tracing::error!(program = %self.program, "Failed to kill peer: {}", e);
                }
                Err(HarnessError::ShutdownTimeout(timeout))
            }
        };

        self.state = settled_state(&result);
        self.stdout.take();
        if let Some(relay) = self.relay.take() {
            relay.join(self.relay_join_timeout).await;
        }

        result
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        // SAFETY: `pid` is our own child and has not been reaped yet, so it
        // cannot have been recycled for an unrelated process.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            tracing::warn!(
                program = %self.program,
                "Failed to send SIGTERM: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(program = %self.program, "Failed to stop peer: {}", e);
        }
    }
}

/// State after a terminate attempt. A failed wait leaves the exit unconfirmed,
/// so the peer stays `Terminating` and a later `terminate` tries again.
fn settled_state(result: &Result<()>) -> PeerState {
    match result {
        Err(HarnessError::Io(_)) => PeerState::Terminating,
        _ => PeerState::Exited,
    }
}
