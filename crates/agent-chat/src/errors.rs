/// Errors raised by a `Transport` while opening or reading the response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-success status before streaming started.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// Connection or body read failed.
    #[error("network error: {message}")]
    Network { message: String },
}

impl TransportError {
    /// Creates a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns the HTTP status code when the failure came from a response status.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network { .. } => None,
        }
    }
}

/// A `data: ` record whose payload is not valid JSON.
///
/// Usually a payload truncated at a chunk boundary or transport noise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed event record ({reason}): {record}")]
pub struct MalformedRecord {
    /// The full record text, marker included.
    pub record: String,
    /// Parser diagnostic.
    pub reason: String,
}

/// Top-level error type for chat calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Transport failed before or during streaming.
    #[error(transparent)]
    Transport(TransportError),
    /// Producer sent an `error` event.
    #[error("protocol error: {message}")]
    Protocol { message: String },
    /// Malformed record surfaced under `MalformedPolicy::Surface`.
    #[error(transparent)]
    Malformed(MalformedRecord),
    /// Stream ended without `done` under `EndOfStreamPolicy::Strict`.
    #[error("stream ended before a done or error event")]
    PrematureEndOfStream,
    /// Call was aborted or its notification receiver went away.
    #[error("cancelled")]
    Cancelled,
    /// Driver task ended without reporting a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns true for failures that came from the transport layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<TransportError> for ChatError {
    fn from(value: TransportError) -> Self {
        ChatError::Transport(value)
    }
}

impl From<MalformedRecord> for ChatError {
    fn from(value: MalformedRecord) -> Self {
        ChatError::Malformed(value)
    }
}
