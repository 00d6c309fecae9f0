use crate::errors::MalformedRecord;
use crate::model::ToolCallPayload;

/// Literal prefix of records that carry an event payload.
pub const EVENT_MARKER: &str = "data: ";

const DEFAULT_ERROR_MESSAGE: &str = "agent stream error";

/// One classified event from the response stream.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Incremental slice of assistant output.
    Content { text: String },
    /// One tool invocation descriptor.
    ToolCall { payload: ToolCallPayload },
    /// Successful end of stream.
    Done,
    /// Producer-reported failure.
    Error { message: String },
}

impl StreamEvent {
    /// Returns true for `Done` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error { .. })
    }
}

/// Parses one complete record.
///
/// Returns `Ok(None)` for records that are not events: no marker, no string
/// `type` field, or a `type` this client does not know.
pub fn parse_record(record: &str) -> Result<Option<StreamEvent>, MalformedRecord> {
    let Some(payload) = record.strip_prefix(EVENT_MARKER) else {
        return Ok(None);
    };
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| MalformedRecord {
            record: record.to_string(),
            reason: e.to_string(),
        })?;
    Ok(map_event_json(&value))
}

pub(crate) fn map_event_json(value: &serde_json::Value) -> Option<StreamEvent> {
    let event_type = value.get("type").and_then(|v| v.as_str())?;
    match event_type {
        "content" => Some(StreamEvent::Content {
            text: value
                .get("content")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        "tool_call" => Some(StreamEvent::ToolCall {
            payload: value
                .get("tool_call")
                .cloned()
                .unwrap_or(serde_json::Value::Null),
        }),
        "done" => Some(StreamEvent::Done),
        "error" => Some(StreamEvent::Error {
            message: value
                .get("error")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_ERROR_MESSAGE)
                .to_string(),
        }),
        _ => None,
    }
}
