//! Per-provider LLM API keys held by the backend for the signed-in user.

use shared::{
    domain::ApiKeyRecord,
    protocol::{AddApiKeyRequest, UpdateApiKeyRequest},
};
use tracing::info;

use crate::{
    error::{ClientError, LoginGate, Surface},
    ClientEvent, PromptClient,
};

const SETTINGS: &str = "settings";

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, ClientError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClientError::validation(format!("{field} is required.")));
    }
    Ok(value)
}

impl PromptClient {
    pub async fn api_keys(&self) -> Vec<ApiKeyRecord> {
        self.inner.lock().await.api_keys.clone()
    }

    /// Entry point of the settings surface: signed-out users are sent to login,
    /// everyone else gets a fresh key list.
    pub async fn open_settings(&self) -> Result<Vec<ApiKeyRecord>, ClientError> {
        if let Err(err) = self.require_login(LoginGate::Settings) {
            self.auth.login().await;
            return self.report(SETTINGS, Err(err));
        }
        self.refresh_api_keys().await
    }

    /// Reloads the key list. On failure the cached list is emptied.
    pub async fn refresh_api_keys(&self) -> Result<Vec<ApiKeyRecord>, ClientError> {
        let outcome = self.refresh_api_keys_impl().await;
        if outcome.is_err() {
            self.replace_api_keys(Vec::new()).await;
        }
        self.report(SETTINGS, outcome)
    }

    async fn refresh_api_keys_impl(&self) -> Result<Vec<ApiKeyRecord>, ClientError> {
        self.require_login(LoginGate::Settings)?;
        let token = self.bearer_token().await?;
        let keys = self.api.list_api_keys(&token).await?;
        info!(count = keys.len(), "api keys: loaded");
        self.replace_api_keys(keys.clone()).await;
        Ok(keys)
    }

    pub async fn add_api_key(
        &self,
        llm_provider: &str,
        api_key: &str,
    ) -> Result<ApiKeyRecord, ClientError> {
        let outcome = self.add_api_key_impl(llm_provider, api_key).await;
        self.report(SETTINGS, outcome)
    }

    async fn add_api_key_impl(
        &self,
        llm_provider: &str,
        api_key: &str,
    ) -> Result<ApiKeyRecord, ClientError> {
        self.require_login(LoginGate::Settings)?;
        let request = AddApiKeyRequest {
            llm_provider: required(llm_provider, "Provider")?.to_string(),
            api_key_plain: required(api_key, "API key")?.to_string(),
        };
        let _busy = self.begin(Surface::Settings)?;
        let token = self.bearer_token().await?;
        let record = self.api.add_api_key(&token, &request).await?;
        info!(provider = %record.llm_provider, "api keys: added");
        self.upsert_api_key(record.clone()).await;
        Ok(record)
    }

    pub async fn update_api_key(
        &self,
        llm_provider: &str,
        new_api_key: &str,
    ) -> Result<ApiKeyRecord, ClientError> {
        let outcome = self.update_api_key_impl(llm_provider, new_api_key).await;
        self.report(SETTINGS, outcome)
    }

    async fn update_api_key_impl(
        &self,
        llm_provider: &str,
        new_api_key: &str,
    ) -> Result<ApiKeyRecord, ClientError> {
        self.require_login(LoginGate::Settings)?;
        let llm_provider = required(llm_provider, "Provider")?;
        let request = UpdateApiKeyRequest {
            new_api_key_plain: required(new_api_key, "API key")?.to_string(),
        };
        let _busy = self.begin(Surface::Settings)?;
        let token = self.bearer_token().await?;
        let record = self
            .api
            .update_api_key(&token, llm_provider, &request)
            .await?;
        info!(provider = %record.llm_provider, "api keys: updated");
        self.upsert_api_key(record.clone()).await;
        Ok(record)
    }

    pub async fn delete_api_key(&self, key_id: i64) -> Result<(), ClientError> {
        let outcome = self.delete_api_key_impl(key_id).await;
        self.report(SETTINGS, outcome)
    }

    async fn delete_api_key_impl(&self, key_id: i64) -> Result<(), ClientError> {
        self.require_login(LoginGate::Settings)?;
        let _busy = self.begin(Surface::Settings)?;
        let token = self.bearer_token().await?;
        self.api.delete_api_key(&token, key_id).await?;
        info!(key_id, "api keys: deleted");
        self.inner
            .lock()
            .await
            .api_keys
            .retain(|record| record.id != key_id);
        self.emit(ClientEvent::ApiKeysChanged);
        Ok(())
    }

    async fn replace_api_keys(&self, keys: Vec<ApiKeyRecord>) {
        self.inner.lock().await.api_keys = keys;
        self.emit(ClientEvent::ApiKeysChanged);
    }

    /// One key per provider: a confirmed record replaces any with the same id or provider.
    async fn upsert_api_key(&self, record: ApiKeyRecord) {
        {
            let mut guard = self.inner.lock().await;
            guard.api_keys.retain(|existing| {
                existing.id != record.id && existing.llm_provider != record.llm_provider
            });
            guard.api_keys.push(record);
            guard.api_keys.sort_by(|a, b| a.llm_provider.cmp(&b.llm_provider));
        }
        self.emit(ClientEvent::ApiKeysChanged);
    }
}

#[cfg(test)]
#[path = "tests/api_keys_tests.rs"]
mod tests;
