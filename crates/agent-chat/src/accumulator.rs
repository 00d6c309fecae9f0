use crate::event::StreamEvent;
use crate::model::{CallResult, ToolCallPayload};

/// Running totals for one in-flight call. Append-only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Aggregate {
    full_text: String,
    tool_calls: Vec<ToolCallPayload>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the totals. `Done` and `Error` leave it unchanged.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Content { text } => self.full_text.push_str(text),
            StreamEvent::ToolCall { payload } => self.tool_calls.push(payload.clone()),
            StreamEvent::Done | StreamEvent::Error { .. } => {}
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn tool_calls(&self) -> &[ToolCallPayload] {
        &self.tool_calls
    }

    pub fn into_result(self) -> CallResult {
        CallResult {
            message: self.full_text,
            tool_calls: self.tool_calls,
        }
    }
}
