//! Turning backend error payloads into the text shown to the user.
//!
//! Precedence: `message`, then `detail`, then one `field: first message`
//! line per non-technical field, then [`GENERIC_ERROR_MESSAGE`].

use serde_json::Value;

pub const GENERIC_ERROR_MESSAGE: &str =
    "Something went wrong. Please try again.";

pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to reach the server. Please check your connection.";

pub const TIMEOUT_ERROR_MESSAGE: &str =
    "The request timed out. Please try again.";

pub const SESSION_EXPIRED_MESSAGE: &str =
    "Your session has expired. Please log in again.";

/// Keys that describe the failure to developers rather than to users.
pub const TECHNICAL_FIELDS: &[&str] = &[
    "status",
    "statusCode",
    "stack",
    "error",
    "code",
    "timestamp",
    "path",
    "name",
];

/// User-facing text for a server error body.
pub fn describe_server_error(payload: &Value) -> String {
    if let Some(message) = non_empty_str(payload.get("message")) {
        return message.to_string();
    }
    if let Some(detail) = non_empty_str(payload.get("detail")) {
        return detail.to_string();
    }
    let fields = field_messages(payload);
    if !fields.is_empty() {
        return fields.join("\n");
    }
    GENERIC_ERROR_MESSAGE.to_string()
}

/// `field: first message` for every field-level entry, skipping
/// [`TECHNICAL_FIELDS`] and the top-level `message`/`detail` keys.
pub fn field_messages(payload: &Value) -> Vec<String> {
    let Some(map) = payload.as_object() else {
        return Vec::new();
    };

    map.iter()
        .filter(|(key, _)| {
            !TECHNICAL_FIELDS.contains(&key.as_str())
                && key.as_str() != "message"
                && key.as_str() != "detail"
        })
        .filter_map(|(key, value)| {
            first_message(value).map(|msg| format!("{key}: {msg}"))
        })
        .collect()
}

fn first_message(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(first_message),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
