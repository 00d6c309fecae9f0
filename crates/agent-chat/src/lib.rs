//! Streaming client for the agent chat API.
//!
//! The server answers `POST /api/agent/chat/stream` with a body of
//! newline-delimited `data: {json}` records. This crate decodes that body as it
//! arrives, forwards typed notifications to a caller-supplied sink, and returns
//! the aggregated answer once the stream ends.
//!
//! # Usage
//!
//! ```no_run
//! use agent_chat::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let client = AgentClient::http(
//!     ClientConfig::new("http://localhost:8080")
//!         .credentials(Credentials::new("admin", "admin123")),
//! )?;
//!
//! let mut sink = sink_fn(|notification| {
//!     if let Notification::Content { text, .. } = notification {
//!         print!("{text}");
//!     }
//! });
//! let result = client
//!     .chat_stream("list all clusters", &[], &mut sink)
//!     .await?;
//!
//! println!("\n{} tool call(s)", result.tool_calls.len());
//! # Ok(())
//! # }
//! ```

/// Running text and tool-call totals for one call.
pub mod accumulator;
/// Explicit client configuration.
pub mod config;
/// Chunk-to-record splitting.
pub mod decoder;
/// Notifications, sinks, streaming policies and the call driver.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// Record parsing into stream events.
pub mod event;
/// Request, history and result types.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Transport seam and the HTTP implementation.
pub mod transport;

mod client;

pub use accumulator::Aggregate;
pub use client::{AgentClient, ChatStream};
pub use config::{ClientConfig, Credentials};
pub use decoder::ChunkDecoder;
pub use dispatch::{
    AbortHandle, EndOfStreamPolicy, FnSink, MalformedPolicy, Notification,
    NotificationKind, NotificationSink, SinkClosed, StreamOptions, drive, sink_fn,
};
pub use errors::{ChatError, MalformedRecord, TransportError};
pub use event::{EVENT_MARKER, StreamEvent, parse_record};
pub use model::{CallResult, ChatRequest, ChatRole, ChatTurn, ConversationHistory, ToolCallPayload};
pub use transport::{ChunkStream, HttpTransport, Transport};
