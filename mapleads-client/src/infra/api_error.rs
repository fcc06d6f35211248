use mapleads_core::ValidationErrors;
use mapleads_core::server_error::{
    GENERIC_ERROR_MESSAGE, NETWORK_ERROR_MESSAGE, SESSION_EXPIRED_MESSAGE,
    TIMEOUT_ERROR_MESSAGE, describe_server_error,
};
use serde_json::Value;
use thiserror::Error;

const UNAUTHORIZED_MESSAGE: &str =
    "You are not authorized to perform this action.";

/// Failure of an API call, classified the way front ends react to it.
///
/// Cloneable so a single refresh outcome can be handed to every request
/// waiting on it.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// Still unauthorized after a successful token refresh.
    #[error("Unauthorized")]
    Unauthorized,

    /// The session could not be renewed and has been torn down.
    #[error("Session expired")]
    SessionExpired,

    /// Structured rejection from the server.
    #[error("Rejected by server: {}", describe_server_error(.0))]
    Validation(Value),

    /// Rejected locally before anything was sent.
    #[error("Invalid request: {0}")]
    Rejected(ValidationErrors),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Text for the transient notice shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ApiError::Timeout => TIMEOUT_ERROR_MESSAGE.to_string(),
            ApiError::Unauthorized => UNAUTHORIZED_MESSAGE.to_string(),
            ApiError::SessionExpired => SESSION_EXPIRED_MESSAGE.to_string(),
            ApiError::Validation(payload) => describe_server_error(payload),
            ApiError::Rejected(errors) => errors.to_string(),
            ApiError::Status { body, .. } => serde_json::from_str(body)
                .map(|payload: Value| describe_server_error(&payload))
                .unwrap_or_else(|_| GENERIC_ERROR_MESSAGE.to_string()),
            ApiError::Decode(_) => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// Only a lost session ends the current flow; everything else is a
    /// notice.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// Classify a non-success response body.
    pub(crate) fn from_response(status: u16, body: String) -> Self {
        match serde_json::from_str::<Value>(&body) {
            Ok(payload @ Value::Object(_)) if (400..500).contains(&status) => {
                ApiError::Validation(payload)
            }
            _ => ApiError::Status { status, body },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
