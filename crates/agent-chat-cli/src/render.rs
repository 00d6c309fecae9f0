use std::io::Write as _;

use agent_chat::{Notification, ToolCallPayload};

/// How notifications are written to stdout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Renders one notification.
pub fn render(mode: OutputMode, notification: &Notification) -> Option<String> {
    match mode {
        OutputMode::Json => serde_json::to_string(notification).ok().map(|line| line + "\n"),
        OutputMode::Text => match notification {
            Notification::Content { text, .. } => Some(text.clone()),
            Notification::ToolCall { payload } => Some(format!("\n[tool] {}\n", describe_tool_call(payload))),
            Notification::Done { .. } => Some("\n".to_string()),
        },
    }
}

pub fn print(mode: OutputMode, notification: &Notification) {
    if let Some(out) = render(mode, notification) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(out.as_bytes());
        let _ = stdout.flush();
    }
}

/// Short one-line summary of a tool call for terminal output.
///
/// Uses the `tool` field when present; anything else is shown as compact JSON.
pub fn describe_tool_call(payload: &ToolCallPayload) -> String {
    match payload.get("tool").and_then(|v| v.as_str()) {
        Some(tool) => match payload.get("arguments").and_then(|v| v.as_str()) {
            Some(args) if !args.is_empty() && args != "{}" => format!("{tool} {args}"),
            _ => tool.to_string(),
        },
        None => payload.to_string(),
    }
}
