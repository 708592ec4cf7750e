//! Print one MCP JSON-RPC request for piping into a server
//!
//! Usage:
//!   mcp-send-request --type init | node bin/mcp-server.js
//!   mcp-send-request --type call --name getPetById --param petId 10
//!
//! The pretty-printed request goes to stderr, the single-line request to
//! stdout.

use anyhow::Context;
use clap::{CommandFactory, Parser, ValueEnum};
use mcp_stdio_harness::{build_call, build_initialize, build_list, HarnessError, JsonRpcRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RequestType {
    Init,
    List,
    Call,
}

/// Send a JSON-RPC request to an MCP server
#[derive(Debug, Parser)]
#[command(name = "mcp-send-request", version)]
struct Args {
    /// Request type
    #[arg(long = "type", value_enum)]
    request_type: RequestType,

    /// Tool ID for call request
    #[arg(long)]
    id: Option<String>,

    /// Tool name for call request
    #[arg(long)]
    name: Option<String>,

    /// Parameter for call request
    #[arg(long = "param", num_args = 2, value_names = ["KEY", "VALUE"], action = clap::ArgAction::Append)]
    params: Vec<String>,
}

fn build(args: &Args) -> Result<JsonRpcRequest, HarnessError> {
    match args.request_type {
        RequestType::Init => Ok(build_initialize()),
        RequestType::List => Ok(build_list()),
        RequestType::Call => {
            let pairs = args
                .params
                .chunks_exact(2)
                .map(|pair| (pair[0].as_str(), pair[1].as_str()));
            build_call(args.id.as_deref(), args.name.as_deref(), pairs)
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let request = match build(&args) {
        Ok(request) => request,
        Err(HarnessError::Configuration(_)) => Args::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "Either --id or --name is required for call request",
            )
            .exit(),
        Err(e) => return Err(e.into()),
    };

    let (human, wire) = render(&request)?;
    eprintln!("{}", human);
    println!("{}", wire);

    Ok(())
}

/// The pretty copy for stderr and the single wire line for stdout.
fn render(request: &JsonRpcRequest) -> anyhow::Result<(String, String)> {
    let pretty = serde_json::to_string_pretty(request).context("Failed to format request")?;
    let line = request.to_line().context("Failed to serialize request")?;
    Ok((format!("Sending request: {}", pretty), line))
}
