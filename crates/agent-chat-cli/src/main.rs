//! Terminal client for the agent chat API.
//!
//! Runs a single message with `--msg`, otherwise starts an interactive session
//! that keeps conversation history between turns.

mod render;
mod repl;

use std::path::PathBuf;

use agent_chat::observability::{LogConfig, init_observability};
use agent_chat::{AgentClient, ClientConfig, Credentials, EndOfStreamPolicy, MalformedPolicy, StreamOptions};
use anyhow::Context as _;
use clap::Parser;

use crate::render::OutputMode;

#[derive(Debug, Parser)]
#[command(name = "agent-chat", version, about = "Chat with the cluster management agent")]
struct Args {
    /// API server URL.
    #[arg(long = "api", env = "AGENT_API_BASE_URL", default_value = "http://localhost:8080")]
    api: String,
    /// Username for basic auth.
    #[arg(long = "user", env = "AGENT_USERNAME", default_value = "admin")]
    user: String,
    /// Password for basic auth.
    #[arg(long = "pass", env = "AGENT_PASSWORD", default_value = "admin123", hide_env_values = true)]
    pass: String,
    /// Send one message and exit.
    #[arg(long = "msg")]
    msg: Option<String>,
    /// Print notifications as JSON lines instead of plain text.
    #[arg(long)]
    json: bool,
    /// Fail when the server closes the stream without a done event.
    #[arg(long)]
    strict: bool,
    /// Fail on malformed event records instead of skipping them.
    #[arg(long)]
    strict_records: bool,
    /// Skip the health check before chatting.
    #[arg(long)]
    no_health_check: bool,
    /// Log filter (`warn`, `debug`, `agent_chat=trace`, ...). Logs go to stderr.
    #[arg(long = "log-level", env = "AGENT_CHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
    /// Write logs as JSON lines to this file instead of stderr.
    #[arg(long = "log-json", env = "AGENT_CHAT_JSON_LOG_PATH")]
    log_json: Option<PathBuf>,
}

impl Args {
    fn stream_options(&self) -> StreamOptions {
        let mut options = StreamOptions::default();
        if self.strict {
            options = options.end_of_stream(EndOfStreamPolicy::Strict);
        }
        if self.strict_records {
            options = options.malformed(MalformedPolicy::Surface);
        }
        options
    }

    fn log_config(&self) -> LogConfig {
        let config = LogConfig::new(&self.log_level);
        match &self.log_json {
            Some(path) => config.json_file(path),
            None => config,
        }
    }

    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }
}

fn load_env() {
    let _ = dotenvy::dotenv();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    let args = Args::parse();
    init_observability(&args.log_config()).context("cannot set up logging")?;

    let config = ClientConfig::new(&args.api).credentials(Credentials::new(&args.user, &args.pass));
    let client = AgentClient::http(config)
        .context("invalid client configuration")?
        .with_options(args.stream_options());

    if !args.no_health_check {
        client
            .health()
            .await
            .with_context(|| format!("cannot reach agent server at {}", args.api))?;
    }

    let mode = args.output_mode();
    match args.msg.as_deref() {
        Some(message) => repl::send_once(&client, message, mode).await,
        None => repl::run_interactive(&client, &args.api, mode).await,
    }
}
