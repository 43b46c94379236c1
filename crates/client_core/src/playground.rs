//! Prompt playground: run prompt text against a provider/model and, on demand,
//! keep an edited body as a new version.

use std::fmt;

use shared::{
    domain::{PromptId, VersionKey},
    protocol::{NewVersion, PlaygroundTestRequest},
};
use tracing::{info, warn};

use crate::{
    error::{ClientError, LoginGate},
    ClientEvent, PromptClient,
};

/// Display sentinel for a test attempted while signed out.
pub const LOGIN_REQUIRED_FOR_TEST: &str = "LOGIN_REQUIRED_FOR_TEST";
pub const VERSION_SAVED_NOTICE: &str = "New version saved successfully!";

/// Result of a playground run. Every variant renders to a display string, so
/// callers never have an error path to handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaygroundOutcome {
    Output(String),
    LoginRequired,
    EmptyPrompt,
    ProviderRequired,
    ModelRequired,
    /// No bearer token could be obtained.
    AuthenticationFailed,
    /// The backend answered, but the provider reported an error.
    ProviderError {
        provider: String,
        model: String,
        error: String,
    },
    NoOutput,
    /// The request itself failed (transport or non-2xx).
    Failed {
        provider: String,
        model: String,
        message: String,
    },
}

impl PlaygroundOutcome {
    pub fn is_output(&self) -> bool {
        matches!(self, PlaygroundOutcome::Output(_))
    }
}

impl fmt::Display for PlaygroundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaygroundOutcome::Output(text) => f.write_str(text),
            PlaygroundOutcome::LoginRequired => f.write_str(LOGIN_REQUIRED_FOR_TEST),
            PlaygroundOutcome::EmptyPrompt => f.write_str("Please enter some prompt text to test."),
            PlaygroundOutcome::ProviderRequired => {
                f.write_str("LLM Provider not selected. Please select a provider in Playground.")
            }
            PlaygroundOutcome::ModelRequired => {
                f.write_str("Model not selected. Please select a model in Playground.")
            }
            PlaygroundOutcome::AuthenticationFailed => {
                f.write_str("Authentication error. Please try logging in again.")
            }
            PlaygroundOutcome::ProviderError {
                provider,
                model,
                error,
            } => write!(f, "Error from LLM ({provider} - {model}): {error}"),
            PlaygroundOutcome::NoOutput => f.write_str("No output received from LLM."),
            PlaygroundOutcome::Failed {
                provider,
                model,
                message,
            } => write!(f, "Failed to run test with {provider} ({model}): {message}"),
        }
    }
}

fn selected(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

impl PromptClient {
    /// Runs `prompt_text` once against the chosen provider and model.
    ///
    /// Never fails and never touches the store.
    pub async fn run_playground(
        &self,
        prompt_text: &str,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> PlaygroundOutcome {
        if !self.auth.is_authenticated() {
            return PlaygroundOutcome::LoginRequired;
        }
        let Some(provider) = selected(provider) else {
            return PlaygroundOutcome::ProviderRequired;
        };
        let Some(model) = selected(model) else {
            return PlaygroundOutcome::ModelRequired;
        };
        if prompt_text.trim().is_empty() {
            return PlaygroundOutcome::EmptyPrompt;
        }
        let token = match self.bearer_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "playground: no access token");
                return PlaygroundOutcome::AuthenticationFailed;
            }
        };

        let request = PlaygroundTestRequest {
            prompt_text: prompt_text.to_string(),
            llm_provider: provider.to_string(),
            model_id: model.to_string(),
        };
        match self.api.run_playground_test(&token, &request).await {
            Ok(response) => {
                if let Some(error) = response.error.filter(|error| !error.is_empty()) {
                    info!(provider, model, "playground: provider reported an error");
                    return PlaygroundOutcome::ProviderError {
                        provider: provider.to_string(),
                        model: model.to_string(),
                        error,
                    };
                }
                match response.output_text.filter(|text| !text.is_empty()) {
                    Some(text) => PlaygroundOutcome::Output(text),
                    None => PlaygroundOutcome::NoOutput,
                }
            }
            Err(err) => {
                warn!(provider, model, error = %err, "playground: test run failed");
                let message = match &err {
                    ClientError::Remote { failure, .. } => failure.detail.clone(),
                    other => other.to_string(),
                };
                PlaygroundOutcome::Failed {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    message,
                }
            }
        }
    }

    /// Keeps an edited playground body as a new version of `prompt_id`,
    /// recording the provider and model it was tested with.
    ///
    /// Refused when the text is blank or identical to `base_version`'s text.
    pub async fn save_as_new_version(
        &self,
        prompt_id: &PromptId,
        base_version: &VersionKey,
        edited_text: &str,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<VersionKey, ClientError> {
        let outcome = self.check_edited_text(prompt_id, base_version, edited_text).await;
        self.report("playground", outcome)?;

        let key = self
            .create_version(
                prompt_id,
                NewVersion {
                    text: edited_text.to_string(),
                    notes: String::new(),
                    llm_provider: selected(provider).map(str::to_string),
                    model_id_used: selected(model).map(str::to_string),
                },
            )
            .await?;
        self.emit(ClientEvent::Notice(VERSION_SAVED_NOTICE.to_string()));
        Ok(key)
    }

    async fn check_edited_text(
        &self,
        prompt_id: &PromptId,
        base_version: &VersionKey,
        edited_text: &str,
    ) -> Result<(), ClientError> {
        self.require_login(LoginGate::Save)?;
        let original = self
            .read(|store, _| {
                store
                    .get(prompt_id)
                    .and_then(|prompt| prompt.version(base_version))
                    .map(|version| version.text.clone())
            })
            .await;
        if edited_text.trim().is_empty() || original.as_deref() == Some(edited_text) {
            return Err(ClientError::validation(
                "Prompt text has not been changed or is empty.",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/playground_tests.rs"]
mod tests;
