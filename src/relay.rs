//! Background forwarding of the peer's diagnostic stream

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

/// Prefix marking console lines that came from the peer's stderr.
pub const SERVER_LOG_PREFIX: &str = "[SERVER LOG]";

/// Handle to the task draining a peer's stderr.
///
/// The task runs until the stream reaches EOF, which normally happens when
/// the peer exits.
pub struct DiagnosticRelay {
    task: JoinHandle<u64>,
}

impl DiagnosticRelay {
    /// Relay to the harness's stdout.
    pub fn spawn<R>(stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self::spawn_with_writer(stream, tokio::io::stdout())
    }

    pub fn spawn_with_writer<R, W>(stream: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            task: tokio::spawn(relay_lines(stream, writer)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the relay to drain, giving up after `timeout`.
    ///
    /// Returns the number of lines drained from the stream, or `None` if the
    /// task had to be aborted.
    pub async fn join(self, timeout: Duration) -> Option<u64> {
        let mut task = self.task;
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(lines)) => {
                tracing::debug!(lines, "diagnostic relay finished");
                Some(lines)
            }
            Ok(Err(e)) => {
                tracing::warn!("diagnostic relay task failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "diagnostic relay still running, aborting it"
                );
                task.abort();
                None
            }
        }
    }
}

async fn relay_lines<R, W>(stream: R, mut writer: W) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut console_open = true;
    let mut relayed = 0;

    // Keep reading until EOF even when the console is gone: dropping the
    // pipe early would hand the peer a SIGPIPE on its next stderr write.
    loop {
        buf.clear();

        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                relayed += 1;
                if !console_open {
                    continue;
                }

                let line = String::from_utf8_lossy(&buf);
                let text = format!("{} {}\n", SERVER_LOG_PREFIX, line.trim());
                let written = match writer.write_all(text.as_bytes()).await {
                    Ok(()) => writer.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    tracing::error!("Failed to write server log line, draining silently: {}", e);
                    console_open = false;
                }
            }
            Err(e) => {
                tracing::warn!("Error reading peer stderr: {}", e);
                break;
            }
        }
    }

    relayed
}
