//! Typed requests against the prompt-library REST backend.
//!
//! Every call is bearer-authenticated. Responses that feed the entity store are
//! wrapped in [`Confirmed`] here and nowhere else.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{ApiKeyRecord, Prompt, PromptId, Tag, UserProfile, Version, VersionKey},
    error::{ErrorBody, RemoteFailure},
    protocol::{
        AddApiKeyRequest, CheckoutSessionRequest, CheckoutSessionResponse, NewPrompt, NewVersion,
        PlaygroundTestRequest, PlaygroundTestResponse, PromptListResponse, UpdateApiKeyRequest,
        UpdateNotesRequest, UpdatePromptRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, Operation},
    store::{Confirmed, ServerResult},
};

#[derive(Clone)]
pub struct BackendApi {
    http: Client,
    base_url: Url,
}

impl BackendApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|err| ClientError::InvalidConfig(format!("api base url '{base_url}': {err}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidConfig(format!(
                "api base url must be http(s): {base_url}"
            )));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins percent-encoded path segments onto the base url.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn list_prompts(&self, token: &str) -> Result<Confirmed, ClientError> {
        let operation = Operation::FetchPrompts;
        let body: PromptListResponse = self
            .fetch(operation, self.http.get(self.endpoint(&["prompts"])), token)
            .await?;
        let prompts = body
            .prompts
            .into_iter()
            .map(|prompt| normalize(operation, prompt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Confirmed::new(ServerResult::Loaded(prompts)))
    }

    pub async fn create_prompt(
        &self,
        token: &str,
        draft: &NewPrompt,
    ) -> Result<Confirmed, ClientError> {
        let operation = Operation::CreatePrompt;
        let prompt: Prompt = self
            .fetch(
                operation,
                self.http.post(self.endpoint(&["prompts"])).json(draft),
                token,
            )
            .await?;
        Ok(Confirmed::new(ServerResult::Created(normalize(
            operation, prompt,
        )?)))
    }

    pub async fn update_prompt(
        &self,
        token: &str,
        prompt_id: &PromptId,
        update: &UpdatePromptRequest,
    ) -> Result<Confirmed, ClientError> {
        let operation = Operation::UpdatePrompt;
        let prompt: Prompt = self
            .fetch(
                operation,
                self.http
                    .put(self.endpoint(&["prompts", prompt_id.as_str()]))
                    .json(update),
                token,
            )
            .await?;
        self.replacement(operation, prompt_id, prompt)
    }

    pub async fn delete_prompt(
        &self,
        token: &str,
        prompt_id: &PromptId,
    ) -> Result<Confirmed, ClientError> {
        self.execute(
            Operation::DeletePrompt,
            self.http
                .delete(self.endpoint(&["prompts", prompt_id.as_str()])),
            token,
        )
        .await?;
        Ok(Confirmed::new(ServerResult::Deleted(prompt_id.clone())))
    }

    pub async fn update_version_notes(
        &self,
        token: &str,
        prompt_id: &PromptId,
        version_key: &VersionKey,
        notes: &str,
    ) -> Result<Confirmed, ClientError> {
        let version: Version = self
            .fetch(
                Operation::UpdateNotes,
                self.http
                    .put(self.endpoint(&[
                        "prompts",
                        prompt_id.as_str(),
                        "versions",
                        version_key.as_str(),
                        "notes",
                    ]))
                    .json(&UpdateNotesRequest {
                        notes: notes.to_string(),
                    }),
                token,
            )
            .await?;
        Ok(Confirmed::new(ServerResult::NotesUpdated {
            prompt_id: prompt_id.clone(),
            version_key: version_key.clone(),
            notes: version.notes,
        }))
    }

    pub async fn create_version(
        &self,
        token: &str,
        prompt_id: &PromptId,
        version: &NewVersion,
    ) -> Result<Confirmed, ClientError> {
        let operation = Operation::CreateVersion;
        let created: Version = self
            .fetch(
                operation,
                self.http
                    .post(self.endpoint(&["prompts", prompt_id.as_str(), "versions"]))
                    .json(version),
                token,
            )
            .await?;
        if created.key.as_str().is_empty() {
            return Err(ClientError::InvalidResponse {
                operation,
                reason: "created version carries no version_id".to_string(),
            });
        }
        Ok(Confirmed::new(ServerResult::VersionCreated {
            prompt_id: prompt_id.clone(),
            version: created,
        }))
    }

    pub async fn add_tag(
        &self,
        token: &str,
        prompt_id: &PromptId,
        tag: &Tag,
    ) -> Result<Confirmed, ClientError> {
        let operation = Operation::AddTag;
        let prompt: Prompt = self
            .fetch(
                operation,
                self.http
                    .post(self.endpoint(&["prompts", prompt_id.as_str(), "tags"]))
                    .json(tag),
                token,
            )
            .await?;
        self.replacement(operation, prompt_id, prompt)
    }

    pub async fn remove_tag(
        &self,
        token: &str,
        prompt_id: &PromptId,
        tag_name: &str,
    ) -> Result<Confirmed, ClientError> {
        let operation = Operation::RemoveTag;
        let prompt: Prompt = self
            .fetch(
                operation,
                self.http
                    .delete(self.endpoint(&["prompts", prompt_id.as_str(), "tags", tag_name])),
                token,
            )
            .await?;
        self.replacement(operation, prompt_id, prompt)
    }

    pub async fn list_api_keys(&self, token: &str) -> Result<Vec<ApiKeyRecord>, ClientError> {
        let keys: Option<Vec<ApiKeyRecord>> = self
            .fetch(
                Operation::FetchApiKeys,
                self.http.get(self.endpoint(&["user", "api-keys"])),
                token,
            )
            .await?;
        Ok(keys.unwrap_or_default())
    }

    pub async fn add_api_key(
        &self,
        token: &str,
        request: &AddApiKeyRequest,
    ) -> Result<ApiKeyRecord, ClientError> {
        self.fetch(
            Operation::AddApiKey,
            self.http
                .post(self.endpoint(&["user", "api-keys"]))
                .json(request),
            token,
        )
        .await
    }

    pub async fn update_api_key(
        &self,
        token: &str,
        llm_provider: &str,
        request: &UpdateApiKeyRequest,
    ) -> Result<ApiKeyRecord, ClientError> {
        self.fetch(
            Operation::UpdateApiKey,
            self.http
                .put(self.endpoint(&["user", "api-keys", llm_provider]))
                .json(request),
            token,
        )
        .await
    }

    pub async fn delete_api_key(&self, token: &str, key_id: i64) -> Result<(), ClientError> {
        self.execute(
            Operation::DeleteApiKey,
            self.http
                .delete(self.endpoint(&["user", "api-keys", &key_id.to_string()])),
            token,
        )
        .await
    }

    pub async fn user_profile(&self, token: &str) -> Result<UserProfile, ClientError> {
        self.fetch(
            Operation::FetchProfile,
            self.http.get(self.endpoint(&["user", "profile"])),
            token,
        )
        .await
    }

    pub async fn mark_paywall_seen(&self, token: &str) -> Result<(), ClientError> {
        self.execute(
            Operation::MarkPaywallSeen,
            self.http
                .put(self.endpoint(&["user", "paywall-modal-seen"])),
            token,
        )
        .await
    }

    pub async fn run_playground_test(
        &self,
        token: &str,
        request: &PlaygroundTestRequest,
    ) -> Result<PlaygroundTestResponse, ClientError> {
        self.fetch(
            Operation::RunPlaygroundTest,
            self.http
                .post(self.endpoint(&["playground", "test"]))
                .json(request),
            token,
        )
        .await
    }

    pub async fn create_checkout_session(
        &self,
        token: &str,
        request: &CheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, ClientError> {
        self.fetch(
            Operation::CreateCheckoutSession,
            self.http
                .post(self.endpoint(&["billing", "create-checkout-session"]))
                .json(request),
            token,
        )
        .await
    }

    fn replacement(
        &self,
        operation: Operation,
        prompt_id: &PromptId,
        prompt: Prompt,
    ) -> Result<Confirmed, ClientError> {
        if &prompt.id != prompt_id {
            return Err(ClientError::InvalidResponse {
                operation,
                reason: format!("expected prompt {prompt_id}, got {}", prompt.id),
            });
        }
        Ok(Confirmed::new(ServerResult::Replaced(normalize(
            operation, prompt,
        )?)))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: RequestBuilder,
        token: &str,
    ) -> Result<T, ClientError> {
        let response = self.send(operation, request, token).await?;
        response
            .json()
            .await
            .map_err(|err| ClientError::InvalidResponse {
                operation,
                reason: err.to_string(),
            })
    }

    async fn execute(
        &self,
        operation: Operation,
        request: RequestBuilder,
        token: &str,
    ) -> Result<(), ClientError> {
        self.send(operation, request, token).await.map(|_| ())
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
        token: &str,
    ) -> Result<Response, ClientError> {
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| ClientError::Transport { operation, source })?;
        debug!(%operation, status = %response.status(), "backend: response");
        ensure_success(operation, response).await
    }
}

async fn ensure_success(operation: Operation, response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let fallback = status_text(status);
    let detail = match response.json::<ErrorBody>().await {
        Ok(body) => body.message().unwrap_or(fallback),
        Err(_) => fallback,
    };
    Err(ClientError::Remote {
        operation,
        failure: RemoteFailure::new(status.as_u16(), detail),
    })
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
}

fn normalize(operation: Operation, prompt: Prompt) -> Result<Prompt, ClientError> {
    prompt
        .normalized()
        .map_err(|err| ClientError::InvalidResponse {
            operation,
            reason: err.to_string(),
        })
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
