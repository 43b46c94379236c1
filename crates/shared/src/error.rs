use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Body carried by non-2xx backend responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Value,
}

impl ErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: Value::String(detail.into()),
        }
    }

    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct RemoteFailure {
    pub status: u16,
    pub detail: String,
}

impl RemoteFailure {
    pub fn new(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptShapeError {
    #[error("prompt {prompt_id} has no version {latest_version}")]
    MissingLatestVersion {
        prompt_id: String,
        latest_version: String,
    },
}
