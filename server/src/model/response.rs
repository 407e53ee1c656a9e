use serde::{Deserialize, Serialize};

/// Envelope the orchestration endpoints answer with regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "ok".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StatusResponse {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}
