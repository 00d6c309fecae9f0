//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AgentClient, CallResult, ChatError, ChatRequest, ChatStream, ChatTurn,
    ClientConfig, ConversationHistory, Credentials, Notification, NotificationKind,
    NotificationSink, StreamOptions, sink_fn,
};
