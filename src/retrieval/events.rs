use serde_json::Value;

use crate::transport::NamedEvent;

/// What a streamed event means for the in-flight reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A fragment of reply text
    Delta(String),
    /// The run failed; carries the remote payload
    Error(String),
    /// The run finished and the authoritative history can be fetched
    Completed,
    Ignored,
}

impl RunEvent {
    pub fn parse(event: &NamedEvent) -> Self {
        if event.data.trim() == "[DONE]" {
            return Self::Completed;
        }

        match event.name() {
            "thread.message.delta" | "message.delta" | "delta" => match delta_text(&event.data) {
                Some(text) if !text.is_empty() => Self::Delta(text),
                _ => Self::Ignored,
            },
            "error" | "thread.run.failed" | "thread.run.cancelled" | "thread.run.expired" => {
                Self::Error(error_payload(&event.data))
            }
            "done" | "completed" | "thread.run.completed" => Self::Completed,
            _ => Self::Ignored,
        }
    }
}

/// Pull the text out of a delta payload.
///
/// Accepts the nested `delta.content[].text.value` shape, flat `delta`,
/// `text` or `content` strings, and plain non-JSON data.
fn delta_text(data: &str) -> Option<String> {
    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return Some(data.to_string());
    };

    match &value {
        Value::String(text) => return Some(text.clone()),
        Value::Object(_) => {}
        _ => return None,
    }

    if let Some(parts) = value.pointer("/delta/content").and_then(Value::as_array) {
        let text: String = parts
            .iter()
            .filter_map(|part| {
                part.pointer("/text/value")
                    .or_else(|| part.get("text"))
                    .and_then(Value::as_str)
            })
            .collect();
        return Some(text);
    }

    ["delta", "text", "content"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn error_payload(data: &str) -> String {
    let message = serde_json::from_str::<Value>(data).ok().and_then(|value| {
        value
            .pointer("/error/message")
            .or_else(|| value.pointer("/last_error/message"))
            .or_else(|| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match message {
        Some(message) => message,
        None if data.trim().is_empty() => "stream reported an error".to_string(),
        None => data.trim().to_string(),
    }
}
