//! Mutating prompt procedures.
//!
//! Each one is login-gated, holds the details busy flag for its whole run and
//! only touches the store with a backend-confirmed result. Unauthenticated
//! `create_prompt` is the exception: it writes a local-only trial prompt.

use chrono::Utc;
use shared::{
    domain::{PromptId, Tag, TagColor, VersionKey},
    protocol::{NewPrompt, NewVersion, UpdatePromptRequest},
};
use tracing::{info, warn};

use crate::{
    error::{ClientError, LoginGate, Operation, Surface},
    store::{Confirmed, LocalPrompt, MergeOutcome},
    ClientEvent, PromptClient, View,
};

const DETAILS: &str = "details";

impl PromptClient {
    pub async fn save_notes(
        &self,
        prompt_id: &PromptId,
        version_key: &VersionKey,
        notes: &str,
    ) -> Result<(), ClientError> {
        let outcome = self.save_notes_impl(prompt_id, version_key, notes).await;
        self.report(DETAILS, outcome)
    }

    async fn save_notes_impl(
        &self,
        prompt_id: &PromptId,
        version_key: &VersionKey,
        notes: &str,
    ) -> Result<(), ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self
            .api
            .update_version_notes(&token, prompt_id, version_key, notes)
            .await?;
        self.apply(confirmed).await;
        info!(%prompt_id, %version_key, "prompts: notes saved");
        Ok(())
    }

    /// Attaches a tag, reusing the spelling and colour of any existing tag
    /// whose name matches case-insensitively. Returns the tag that was sent.
    pub async fn add_tag(
        &self,
        prompt_id: &PromptId,
        name: &str,
        color: TagColor,
    ) -> Result<Tag, ClientError> {
        let outcome = self.add_tag_impl(prompt_id, name, color).await;
        self.report(DETAILS, outcome)
    }

    async fn add_tag_impl(
        &self,
        prompt_id: &PromptId,
        name: &str,
        color: TagColor,
    ) -> Result<Tag, ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        if name.trim().is_empty() {
            return Err(ClientError::validation("Tag name is required."));
        }
        let (tag, duplicate) = self
            .read(|store, _| {
                let tag = store.canonical_tag(name, color);
                let duplicate = store
                    .get(prompt_id)
                    .is_some_and(|prompt| prompt.has_tag_ignore_case(&tag.name));
                (tag, duplicate)
            })
            .await;
        if duplicate {
            return Err(ClientError::validation(format!(
                "Tag '{}' is already on this prompt.",
                tag.name
            )));
        }
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self.api.add_tag(&token, prompt_id, &tag).await?;
        self.apply(confirmed).await;
        info!(%prompt_id, tag = %tag.name, "prompts: tag added");
        Ok(tag)
    }

    pub async fn remove_tag(&self, prompt_id: &PromptId, name: &str) -> Result<(), ClientError> {
        let outcome = self.remove_tag_impl(prompt_id, name).await;
        self.report(DETAILS, outcome)
    }

    async fn remove_tag_impl(&self, prompt_id: &PromptId, name: &str) -> Result<(), ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        if name.is_empty() {
            return Err(ClientError::validation("Tag name is required."));
        }
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self.api.remove_tag(&token, prompt_id, name).await?;
        self.apply(confirmed).await;
        info!(%prompt_id, tag = name, "prompts: tag removed");
        Ok(())
    }

    /// Appends a version, repoints `latest_version` to it and, if the prompt is
    /// still selected, focuses the new version in the details view.
    pub async fn create_version(
        &self,
        prompt_id: &PromptId,
        version: NewVersion,
    ) -> Result<VersionKey, ClientError> {
        let outcome = self.create_version_impl(prompt_id, version).await;
        self.report(DETAILS, outcome)
    }

    async fn create_version_impl(
        &self,
        prompt_id: &PromptId,
        version: NewVersion,
    ) -> Result<VersionKey, ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        if version.text.trim().is_empty() {
            return Err(ClientError::validation("Version text is required."));
        }
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self.api.create_version(&token, prompt_id, &version).await?;
        let (_, key) = focus_target(Operation::CreateVersion, &confirmed)?;
        if let MergeOutcome::Dropped(_) = self.apply(confirmed).await {
            return Ok(key);
        }
        self.select_version(prompt_id, &key).await;
        if self.read(|_, selection| selection.selected_prompt_id() == Some(prompt_id)).await {
            self.set_view(View::Details).await;
        }
        info!(%prompt_id, version_key = %key, "prompts: version created");
        Ok(key)
    }

    /// Creates a prompt and focuses its first version.
    ///
    /// Signed-out visitors get a local-only trial prompt under a temporary id.
    pub async fn create_prompt(&self, draft: NewPrompt) -> Result<PromptId, ClientError> {
        let outcome = self.create_prompt_impl(draft).await;
        self.report(DETAILS, outcome)
    }

    async fn create_prompt_impl(&self, draft: NewPrompt) -> Result<PromptId, ClientError> {
        let draft = self.prepare_draft(draft).await?;
        if !self.auth.is_authenticated() {
            let local = LocalPrompt::synthesize(&draft, Utc::now().date_naive());
            let key = local.prompt().latest_version.clone();
            let (prompt_id, snapshot) = {
                let mut guard = self.inner.lock().await;
                let state = &mut *guard;
                let prompt_id = state.store.insert_local_only(local);
                let changed = state.selection.focus(&state.store, &prompt_id, &key);
                (prompt_id, changed.then(|| state.selection.snapshot()))
            };
            self.emit(ClientEvent::StoreChanged);
            if let Some(snapshot) = snapshot {
                self.emit(ClientEvent::SelectionChanged(snapshot));
            }
            info!(%prompt_id, "prompts: trial prompt created locally");
            return Ok(prompt_id);
        }

        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self.api.create_prompt(&token, &draft).await?;
        let (prompt_id, key) = focus_target(Operation::CreatePrompt, &confirmed)?;
        self.apply(confirmed).await;
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let changed = state.selection.focus(&state.store, &prompt_id, &key);
            changed.then(|| state.selection.snapshot())
        };
        if let Some(snapshot) = snapshot {
            self.emit(ClientEvent::SelectionChanged(snapshot));
        }
        info!(%prompt_id, "prompts: prompt created");
        Ok(prompt_id)
    }

    /// Trims the draft and canonicalizes its tags against the store.
    async fn prepare_draft(&self, draft: NewPrompt) -> Result<NewPrompt, ClientError> {
        let title = draft.title.trim().to_string();
        let text = draft.initial_version_text.trim().to_string();
        if title.is_empty() || text.is_empty() {
            return Err(ClientError::validation(
                "Title and Initial Prompt Text are required.",
            ));
        }
        let tags = self
            .read(|store, _| {
                let mut tags: Vec<Tag> = Vec::new();
                for candidate in &draft.tags {
                    if candidate.name.trim().is_empty() {
                        continue;
                    }
                    let tag = store.canonical_tag(&candidate.name, candidate.color);
                    if tags.iter().any(|existing| existing.matches_name(&tag.name)) {
                        continue;
                    }
                    tags.push(tag);
                }
                tags
            })
            .await;
        Ok(NewPrompt {
            title,
            initial_version_text: text,
            initial_version_notes: draft.initial_version_notes,
            tags,
        })
    }

    pub async fn delete_prompt(&self, prompt_id: &PromptId) -> Result<(), ClientError> {
        let outcome = self.delete_prompt_impl(prompt_id).await;
        self.report(DETAILS, outcome)
    }

    async fn delete_prompt_impl(&self, prompt_id: &PromptId) -> Result<(), ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let confirmed = self.api.delete_prompt(&token, prompt_id).await?;
        self.apply(confirmed).await;
        info!(%prompt_id, "prompts: prompt deleted");
        Ok(())
    }

    /// Renames a prompt. Returns `false` when the trimmed title is unchanged
    /// and no request was made.
    pub async fn rename_prompt(&self, prompt_id: &PromptId, title: &str) -> Result<bool, ClientError> {
        let outcome = self.rename_prompt_impl(prompt_id, title).await;
        self.report(DETAILS, outcome)
    }

    async fn rename_prompt_impl(&self, prompt_id: &PromptId, title: &str) -> Result<bool, ClientError> {
        self.require_login(LoginGate::Save)?;
        ensure_remote(prompt_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::validation("Title is required."));
        }
        let unchanged = self
            .read(|store, _| store.get(prompt_id).is_some_and(|prompt| prompt.title == title))
            .await;
        if unchanged {
            return Ok(false);
        }
        let _busy = self.begin(Surface::Details)?;
        let token = self.bearer_token().await?;
        let update = UpdatePromptRequest {
            title: Some(title.to_string()),
        };
        let confirmed = self.api.update_prompt(&token, prompt_id, &update).await?;
        if let MergeOutcome::Dropped(_) = self.apply(confirmed).await {
            warn!(%prompt_id, "prompts: rename confirmed for a prompt no longer held locally");
        }
        info!(%prompt_id, "prompts: prompt renamed");
        Ok(true)
    }
}

fn focus_target(
    operation: Operation,
    confirmed: &Confirmed,
) -> Result<(PromptId, VersionKey), ClientError> {
    confirmed
        .result()
        .focus_target()
        .map(|(prompt_id, key)| (prompt_id.clone(), key.clone()))
        .ok_or_else(|| ClientError::InvalidResponse {
            operation,
            reason: "result names no prompt version".to_string(),
        })
}

/// Trial prompts never leave this client.
fn ensure_remote(prompt_id: &PromptId) -> Result<(), ClientError> {
    if prompt_id.is_temporary() {
        return Err(ClientError::validation(
            "This prompt only exists on this device; create it again after logging in.",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/crud_tests.rs"]
mod tests;
