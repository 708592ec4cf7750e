//! Scripted conversation with a peer over line-delimited JSON-RPC
//!
//! The driver sends one message, then reads exactly one line for it when a
//! response is expected. Responses are never matched by id; the peer is
//! assumed to answer in order.

use crate::builder::{build_call, build_initialize, build_initialized_notification, build_list};
use crate::config::{ScriptConfig, SessionConfig, ToolReference, WaitPolicy};
use crate::error::{HarnessError, Result};
use crate::protocol::{JsonRpcRequest, ResponseKind};
use crate::supervisor::PeerProcess;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Steps of the scripted session, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Init,
    NotifyInitialized,
    List,
    CallByName,
    CallById,
    CallMissingArgument,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Init,
        Step::NotifyInitialized,
        Step::List,
        Step::CallByName,
        Step::CallById,
        Step::CallMissingArgument,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Step::Init => "Testing initialize",
            Step::NotifyInitialized => "Sending initialized notification",
            Step::List => "Testing tools/list",
            Step::CallByName => "Testing tools/call by name",
            Step::CallById => "Testing tools/call by id",
            Step::CallMissingArgument => "Testing error handling - missing parameter",
        }
    }

    pub fn expects_response(self) -> bool {
        self != Step::NotifyInitialized
    }

    /// Build the message this step sends.
    pub fn request(self, script: &ScriptConfig) -> Result<JsonRpcRequest> {
        let (key, value) = &script.argument;
        let argument = [(key.as_str(), value.as_str())];
        let no_arguments: [(&str, &str); 0] = [];

        Ok(match self {
            Step::Init => build_initialize(),
            Step::NotifyInitialized => build_initialized_notification(),
            Step::List => build_list(),
            Step::CallByName => build_call(None, Some(script.tool_name.as_str()), argument)?
                .with_id(script.call_by_name_id.as_str()),
            Step::CallById => {
                let tool_id = script.tool_id.as_str();
                let request = match script.tool_id_reference {
                    ToolReference::Name => build_call(None, Some(tool_id), argument)?,
                    ToolReference::Id => build_call(Some(tool_id), None, argument)?,
                };
                request.with_id(script.call_by_id_id.as_str())
            }
            Step::CallMissingArgument => {
                build_call(None, Some(script.tool_name.as_str()), no_arguments)?
                    .with_id(script.missing_argument_id.as_str())
            }
        })
    }
}

/// One line read from the peer.
#[derive(Debug)]
pub struct ReadOutcome {
    /// The line with surrounding whitespace trimmed; `None` at end of stream.
    pub raw: Option<String>,
    pub parsed: Option<serde_json::Value>,
    pub error: Option<HarnessError>,
}

/// Record of one scripted step.
#[derive(Debug)]
pub struct Exchange {
    pub step: Step,
    pub request: JsonRpcRequest,
    pub raw_response: Option<String>,
    pub response: Option<serde_json::Value>,
    pub error: Option<HarnessError>,
}

impl Exchange {
    fn sent(step: Step, request: JsonRpcRequest) -> Self {
        Self {
            step,
            request,
            raw_response: None,
            response: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn response_kind(&self) -> Option<ResponseKind> {
        self.response.as_ref().map(ResponseKind::of)
    }
}

/// Line-framed JSON-RPC over a writer/reader pair.
pub struct Conversation<W, R> {
    writer: W,
    reader: R,
    operator: Option<OperatorPrompt>,
}

impl<W, R> Conversation<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            reader,
            operator: None,
        }
    }

    /// Use `operator` for interactive pauses instead of a fresh stdin reader.
    pub fn with_operator(mut self, operator: OperatorPrompt) -> Self {
        self.operator = Some(operator);
        self
    }

    /// Write one message as a single line and flush.
    pub async fn send(&mut self, message: &JsonRpcRequest) -> Result<()> {
        let mut line = message.to_line()?;
        println!("\n>>> Sending: {}", line);
        tracing::debug!(method = %message.method, "Sending message");

        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read one line and try to parse it as JSON.
    ///
    /// Only I/O failures are returned as `Err`. A line that does not parse,
    /// or end of stream, is reported in [`ReadOutcome::error`] as a
    /// [`HarnessError::Protocol`].
    pub async fn read_response(&mut self) -> Result<ReadOutcome> {
        let mut buf = Vec::new();
        let bytes = self.reader.read_until(b'\n', &mut buf).await?;

        if bytes == 0 {
            println!("<<< Response: ");
            let error = HarnessError::Protocol {
                reason: "peer closed its output stream".into(),
                line: String::new(),
            };
            tracing::warn!("{}", error);
            return Ok(ReadOutcome {
                raw: None,
                parsed: None,
                error: Some(error),
            });
        }

        let raw = String::from_utf8_lossy(&buf).trim().to_string();
        println!("<<< Response: {}", raw);

        // Parse the bytes, not the lossy text, so invalid UTF-8 is rejected.
        match serde_json::from_slice::<serde_json::Value>(&buf) {
            Ok(parsed) => Ok(ReadOutcome {
                raw: Some(raw),
                parsed: Some(parsed),
                error: None,
            }),
            Err(e) => {
                println!("Error: Could not parse response as JSON");
                let error = HarnessError::Protocol {
                    reason: e.to_string(),
                    line: raw.clone(),
                };
                tracing::warn!("{}", error);
                Ok(ReadOutcome {
                    raw: Some(raw),
                    parsed: None,
                    error: Some(error),
                })
            }
        }
    }

    /// Send a request and read the single line answering it.
    pub async fn exchange(&mut self, step: Step, request: JsonRpcRequest) -> Result<Exchange> {
        self.send(&request).await?;

        let mut exchange = Exchange::sent(step, request);
        let outcome = self.read_response().await?;
        exchange.raw_response = outcome.raw;
        exchange.response = outcome.parsed;
        exchange.error = outcome.error;

        match exchange.response_kind() {
            Some(ResponseKind::Error) => {
                tracing::info!(step = ?step, "Peer answered with an error envelope")
            }
            Some(kind) => tracing::debug!(step = ?step, kind = ?kind, "Peer answered"),
            None => {}
        }

        Ok(exchange)
    }

    /// Run every [`Step`] in order.
    ///
    /// Unparseable responses are recorded and the script moves on. An I/O
    /// failure on the pipes ends the script early; its error is recorded on
    /// the step that hit it.
    pub async fn run_script(&mut self, script: &ScriptConfig, wait: &WaitPolicy) -> Vec<Exchange> {
        let mut transcript = Vec::with_capacity(Step::ALL.len());

        for step in Step::ALL {
            if wait.interactive && matches!(step, Step::CallByName | Step::CallById) {
                let message = format!("Press Enter to continue {}...", step.title());
                self.operator
                    .get_or_insert_with(OperatorPrompt::stdin)
                    .wait(&message)
                    .await;
            }

            match self.run_step(step, script, wait).await {
                Ok(exchange) => transcript.push(exchange),
                Err((request, error)) => {
                    tracing::error!(step = ?step, "Aborting script: {}", error);
                    if let Some(request) = request {
                        let mut exchange = Exchange::sent(step, request);
                        exchange.error = Some(error);
                        transcript.push(exchange);
                    }
                    break;
                }
            }
        }

        transcript
    }

    async fn run_step(
        &mut self,
        step: Step,
        script: &ScriptConfig,
        wait: &WaitPolicy,
    ) -> std::result::Result<Exchange, (Option<JsonRpcRequest>, HarnessError)> {
        let request = step.request(script).map_err(|e| (None, e))?;

        if step.expects_response() {
            println!("\n=== {} ===", step.title());
            return self
                .exchange(step, request.clone())
                .await
                .map_err(|e| (Some(request), e));
        }

        if let Err(e) = self.send(&request).await {
            return Err((Some(request), e));
        }
        pause(wait.notification_delay).await;
        Ok(Exchange::sent(step, request))
    }
}

/// Outcome of a full session against a spawned peer.
#[derive(Debug)]
pub struct SessionReport {
    pub exchanges: Vec<Exchange>,
    /// Set when shutdown did not go cleanly; never fatal.
    pub shutdown_error: Option<HarnessError>,
}

impl SessionReport {
    pub fn protocol_errors(&self) -> usize {
        self.exchanges
            .iter()
            .filter(|exchange| matches!(exchange.error, Some(HarnessError::Protocol { .. })))
            .count()
    }
}

/// Spawn the peer, run the script, and always shut the peer down.
///
/// Only a spawn failure is returned as an error.
pub async fn run_session(config: &SessionConfig) -> Result<SessionReport> {
    println!("Starting MCP server...");
    let mut peer = PeerProcess::start(&config.peer)?;
    peer.set_relay_join_timeout(config.relay_join_timeout);

    let mut operator = OperatorPrompt::stdin();
    if config.wait.interactive {
        operator.wait("Press Enter to continue...").await;
    }
    pause(config.wait.startup_delay).await;

    let exchanges = match peer.conversation() {
        Some(conversation) => {
            let mut conversation = conversation.with_operator(operator);
            conversation.run_script(&config.script, &config.wait).await
        }
        None => Vec::new(),
    };

    println!("\nShutting down server...");
    let shutdown_error = match peer.terminate(config.shutdown_timeout).await {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!("{}", e);
            Some(e)
        }
    };

    Ok(SessionReport {
        exchanges,
        shutdown_error,
    })
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Buffered operator input shared by every interactive pause of a session.
pub struct OperatorPrompt {
    input: BufReader<Box<dyn AsyncRead + Unpin + Send>>,
}

impl OperatorPrompt {
    pub fn new(input: impl AsyncRead + Unpin + Send + 'static) -> Self {
        Self {
            input: BufReader::new(Box::new(input)),
        }
    }

    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }

    /// Print `message` and block until the operator presses Enter.
    ///
    /// Returns the line entered, or `None` at end of input, which counts as
    /// Enter.
    pub async fn wait(&mut self, message: &str) -> Option<String> {
        println!("{}", message);
        let mut line = String::new();
        match self.input.read_line(&mut line).await {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end().to_string()),
            Err(e) => {
                tracing::warn!("Failed to read operator input: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for OperatorPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorPrompt").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    type PeerSide = (BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>);

    type ClientSide = Conversation<WriteHalf<DuplexStream>, BufReader<ReadHalf<DuplexStream>>>;

    fn connected() -> (ClientSide, PeerSide) {
        let (client, peer) = duplex(4096);
        let (client_read, client_write) = split(client);
        let (peer_read, peer_write) = split(peer);
        (
            Conversation::new(client_write, BufReader::new(client_read)),
            (BufReader::new(peer_read), peer_write),
        )
    }

    #[tokio::test]
    async fn send_writes_exactly_one_line() {
        let (mut conversation, (mut peer_in, _peer_out)) = connected();
        conversation.send(&build_list()).await.unwrap();

        let mut line = String::new();
        peer_in.read_line(&mut line).await.unwrap();
        assert_eq!(line, "{\"jsonrpc\":\"2.0\",\"id\":\"list-1\",\"method\":\"tools/list\"}\n");
    }

    #[tokio::test]
    async fn garbage_is_a_protocol_error_not_a_failure() {
        let (mut conversation, (_peer_in, mut peer_out)) = connected();
        peer_out.write_all(b"Debugger listening on ws://127.0.0.1\n").await.unwrap();

        let outcome = conversation.read_response().await.unwrap();
        assert_eq!(outcome.raw.as_deref(), Some("Debugger listening on ws://127.0.0.1"));
        assert!(outcome.parsed.is_none());
        assert!(matches!(outcome.error, Some(HarnessError::Protocol { .. })));
    }

    #[tokio::test]
    async fn end_of_stream_is_a_protocol_error() {
        let (mut conversation, peer) = connected();
        drop(peer);

        let outcome = conversation.read_response().await.unwrap();
        assert!(outcome.raw.is_none());
        assert!(matches!(outcome.error, Some(HarnessError::Protocol { .. })));
    }

    #[tokio::test]
    async fn error_envelope_is_a_valid_response() {
        let (mut conversation, (_peer_in, mut peer_out)) = connected();
        peer_out
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":\"call-1\",\"error\":{\"code\":-32602,\"message\":\"missing petId\"}}\n",
            )
            .await
            .unwrap();

        let no_arguments: [(&str, &str); 0] = [];
        let request = build_call(None, Some("getPetById"), no_arguments).unwrap();
        let exchange = conversation.exchange(Step::CallMissingArgument, request).await.unwrap();

        assert!(exchange.is_ok());
        assert_eq!(exchange.response_kind(), Some(ResponseKind::Error));
        assert_eq!(exchange.response.unwrap()["error"]["code"], json!(-32602));
    }

    #[test]
    fn script_requests_follow_defaults() {
        let script = ScriptConfig::default();

        let by_name = Step::CallByName.request(&script).unwrap();
        assert_eq!(by_name.id.as_ref().map(|id| id.as_str()), Some("call-1"));
        assert_eq!(
            by_name.params,
            Some(json!({"name": "getPetById", "arguments": {"petId": 10}}))
        );

        let by_id = Step::CallById.request(&script).unwrap();
        assert_eq!(by_id.id.as_ref().map(|id| id.as_str()), Some("call-2"));
        assert_eq!(
            by_id.params,
            Some(json!({"name": "GET-pet--petId-", "arguments": {"petId": 10}}))
        );

        let missing = Step::CallMissingArgument.request(&script).unwrap();
        assert_eq!(missing.id.as_ref().map(|id| id.as_str()), Some("error-1"));
        assert_eq!(missing.params.unwrap()["arguments"], json!({}));

        assert!(Step::NotifyInitialized.request(&script).unwrap().is_notification());
        assert!(!Step::NotifyInitialized.expects_response());
    }

    #[test]
    fn call_by_id_can_use_the_id_field() {
        let script = ScriptConfig {
            tool_id_reference: ToolReference::Id,
            ..ScriptConfig::default()
        };

        let by_id = Step::CallById.request(&script).unwrap();
        assert_eq!(
            by_id.params,
            Some(json!({"id": "GET-pet--petId-", "arguments": {"petId": 10}}))
        );
    }

    #[tokio::test]
    async fn invalid_utf8_is_a_protocol_error() {
        let (mut conversation, (_peer_in, mut peer_out)) = connected();
        peer_out.write_all(b"\xff\xfe garbage\n").await.unwrap();

        let outcome = conversation.read_response().await.unwrap();
        assert!(outcome.parsed.is_none());
        assert_eq!(outcome.raw.as_deref(), Some("\u{fffd}\u{fffd} garbage"));
        assert!(matches!(outcome.error, Some(HarnessError::Protocol { .. })));
    }

    #[tokio::test]
    async fn script_continues_past_invalid_utf8() {
        let (mut conversation, (_peer_in, mut peer_out)) = connected();
        peer_out
            .write_all(
                b"\xff\n\
                  {\"jsonrpc\":\"2.0\",\"id\":\"list-1\",\"result\":{}}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":\"call-1\",\"result\":{}}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":\"call-2\",\"result\":{}}\n\
                  {\"jsonrpc\":\"2.0\",\"id\":\"error-1\",\"result\":{}}\n",
            )
            .await
            .unwrap();

        let transcript = conversation
            .run_script(&ScriptConfig::default(), &WaitPolicy::immediate())
            .await;

        assert_eq!(transcript.len(), Step::ALL.len());
        assert!(matches!(transcript[0].error, Some(HarnessError::Protocol { .. })));
        assert!(transcript[1..].iter().all(|exchange| exchange.is_ok()));
        assert_eq!(transcript[5].response.as_ref().unwrap()["id"], "error-1");
    }

    #[tokio::test]
    async fn operator_prompt_keeps_buffered_answers() {
        let mut operator = OperatorPrompt::new(&b"first\nsecond\n"[..]);

        assert_eq!(operator.wait("one").await.as_deref(), Some("first"));
        assert_eq!(operator.wait("two").await.as_deref(), Some("second"));
        assert_eq!(operator.wait("three").await, None);
    }

    #[tokio::test]
    async fn interactive_script_reads_operator_input_once_per_call() {
        let (conversation, (_peer_in, mut peer_out)) = connected();
        let operator = OperatorPrompt::new(&b"\n\nleft over\n"[..]);
        let mut conversation = conversation.with_operator(operator);
        for id in ["init-1", "list-1", "call-1", "call-2", "error-1"] {
            let line = format!("{{\"jsonrpc\":\"2.0\",\"id\":\"{}\",\"result\":{{}}}}\n", id);
            peer_out.write_all(line.as_bytes()).await.unwrap();
        }

        let wait = WaitPolicy {
            interactive: true,
            ..WaitPolicy::immediate()
        };
        let transcript = conversation.run_script(&ScriptConfig::default(), &wait).await;
        assert!(transcript.iter().all(|exchange| exchange.is_ok()));

        let mut operator = conversation.operator.take().expect("operator kept");
        assert_eq!(operator.wait("after").await.as_deref(), Some("left over"));
    }
}
