use serde::{Deserialize, Serialize};

use crate::domain::{Prompt, Tag};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptListResponse {
    #[serde(default)]
    pub prompts: Vec<Prompt>,
}

/// Body of `POST /prompts`; also the input of a client-local trial prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrompt {
    pub title: String,
    pub initial_version_text: String,
    #[serde(default)]
    pub initial_version_notes: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePromptRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVersion {
    pub text: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub model_id_used: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddApiKeyRequest {
    pub llm_provider: String,
    pub api_key_plain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateApiKeyRequest {
    pub new_api_key_plain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaygroundTestRequest {
    pub prompt_text: String,
    pub llm_provider: String,
    pub model_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaygroundTestResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
}
