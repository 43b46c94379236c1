//! Normalized prompt/version/tag cache.
//!
//! The store only moves forward through two doors: [`EntityStore::apply_server_result`],
//! which accepts backend-confirmed results, and [`EntityStore::insert_local_only`],
//! which accepts trial prompts synthesized for unauthenticated visitors. Everything
//! else on this type is a pure read over the current snapshot.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashSet},
};

use chrono::NaiveDate;
use indexmap::{map::Entry, IndexMap};
use shared::{
    domain::{Prompt, PromptId, Tag, TagColor, Version, VersionKey},
    protocol::NewPrompt,
};
use tracing::{debug, warn};

pub const DEFAULT_TRIAL_NOTES: &str = "First version created.";

/// A backend result the store is allowed to merge.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerResult {
    Loaded(Vec<Prompt>),
    Created(Prompt),
    Replaced(Prompt),
    NotesUpdated {
        prompt_id: PromptId,
        version_key: VersionKey,
        notes: String,
    },
    VersionCreated {
        prompt_id: PromptId,
        version: Version,
    },
    Deleted(PromptId),
}

impl ServerResult {
    /// The prompt and version a result points at, if it names one.
    pub fn focus_target(&self) -> Option<(&PromptId, &VersionKey)> {
        match self {
            ServerResult::Created(prompt) | ServerResult::Replaced(prompt) => {
                Some((&prompt.id, &prompt.latest_version))
            }
            ServerResult::NotesUpdated {
                prompt_id,
                version_key,
                ..
            } => Some((prompt_id, version_key)),
            ServerResult::VersionCreated { prompt_id, version } => Some((prompt_id, &version.key)),
            ServerResult::Loaded(_) | ServerResult::Deleted(_) => None,
        }
    }
}

/// Proof that a [`ServerResult`] came back from the backend.
///
/// Only the crate's request layer can mint one, so nothing outside it can
/// advance the store speculatively.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmed(ServerResult);

impl Confirmed {
    pub(crate) fn new(result: ServerResult) -> Self {
        Self(result)
    }

    pub fn result(&self) -> &ServerResult {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The target prompt (or version) was gone locally; the late result was discarded.
    Dropped(PromptId),
}

/// A prompt that exists only on this client, keyed by a temporary id.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPrompt(Prompt);

impl LocalPrompt {
    pub fn synthesize(draft: &NewPrompt, today: NaiveDate) -> Self {
        let notes = if draft.initial_version_notes.trim().is_empty() {
            DEFAULT_TRIAL_NOTES.to_string()
        } else {
            draft.initial_version_notes.clone()
        };
        let key = VersionKey::first();
        let version = Version {
            key: key.clone(),
            text: draft.initial_version_text.clone(),
            notes,
            date: today,
            llm_provider: None,
            model_id_used: None,
        };
        Self(Prompt {
            id: PromptId::temporary(),
            title: draft.title.clone(),
            tags: draft.tags.clone(),
            versions: BTreeMap::from([(key.clone(), version)]),
            latest_version: key,
        })
    }

    pub fn prompt(&self) -> &Prompt {
        &self.0
    }
}

/// Prompts in server order, with locally created ones appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityStore {
    prompts: IndexMap<PromptId, Prompt>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    pub fn get(&self, id: &PromptId) -> Option<&Prompt> {
        self.prompts.get(id)
    }

    pub fn contains(&self, id: &PromptId) -> bool {
        self.prompts.contains_key(id)
    }

    pub fn prompts(&self) -> impl Iterator<Item = &Prompt> {
        self.prompts.values()
    }

    pub fn clear(&mut self) {
        self.prompts.clear();
    }

    pub fn apply_server_result(&mut self, confirmed: Confirmed) -> MergeOutcome {
        match confirmed.0 {
            ServerResult::Loaded(prompts) => {
                self.prompts = prompts
                    .into_iter()
                    .map(|prompt| (prompt.id.clone(), prompt))
                    .collect();
                MergeOutcome::Applied
            }
            ServerResult::Created(prompt) => {
                self.prompts.insert(prompt.id.clone(), prompt);
                MergeOutcome::Applied
            }
            ServerResult::Replaced(prompt) => match self.prompts.entry(prompt.id.clone()) {
                Entry::Occupied(mut slot) => {
                    slot.insert(prompt);
                    MergeOutcome::Applied
                }
                Entry::Vacant(slot) => {
                    warn!(prompt_id = %slot.key(), "store: dropping late replace for absent prompt");
                    MergeOutcome::Dropped(slot.into_key())
                }
            },
            ServerResult::NotesUpdated {
                prompt_id,
                version_key,
                notes,
            } => {
                let Some(version) = self
                    .prompts
                    .get_mut(&prompt_id)
                    .and_then(|prompt| prompt.versions.get_mut(&version_key))
                else {
                    warn!(%prompt_id, %version_key, "store: dropping notes update for absent version");
                    return MergeOutcome::Dropped(prompt_id);
                };
                version.notes = notes;
                MergeOutcome::Applied
            }
            ServerResult::VersionCreated { prompt_id, version } => {
                let Some(prompt) = self.prompts.get_mut(&prompt_id) else {
                    warn!(%prompt_id, "store: dropping new version for absent prompt");
                    return MergeOutcome::Dropped(prompt_id);
                };
                let key = version.key.clone();
                prompt.versions.insert(key.clone(), version);
                prompt.latest_version = key;
                MergeOutcome::Applied
            }
            ServerResult::Deleted(prompt_id) => {
                if self.prompts.shift_remove(&prompt_id).is_none() {
                    debug!(%prompt_id, "store: delete confirmed for prompt already absent");
                }
                MergeOutcome::Applied
            }
        }
    }

    pub fn insert_local_only(&mut self, local: LocalPrompt) -> PromptId {
        let id = local.0.id.clone();
        self.prompts.insert(id.clone(), local.0);
        id
    }

    /// Union of every prompt's tags, first colour seen per name, sorted by name
    /// ignoring case.
    pub fn available_tags(&self) -> Vec<Tag> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut union: Vec<Tag> = Vec::new();
        for tag in self.prompts.values().flat_map(|prompt| prompt.tags.iter()) {
            if !tag.name.is_empty() && seen.insert(tag.name.as_str()) {
                union.push(tag.clone());
            }
        }
        union.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        union
    }

    pub fn filtered_prompts(&self, active_filter_tag: &str) -> Vec<&Prompt> {
        if active_filter_tag.is_empty() {
            return self.prompts.values().collect();
        }
        self.prompts
            .values()
            .filter(|prompt| prompt.has_tag(active_filter_tag))
            .collect()
    }

    /// Resolves a candidate tag against the global union, ignoring case.
    ///
    /// A known name keeps its existing spelling and colour; an unknown name is
    /// trimmed and takes `color`.
    pub fn canonical_tag(&self, name: &str, color: TagColor) -> Tag {
        let name = name.trim();
        self.available_tags()
            .into_iter()
            .find(|tag| tag.matches_name(name))
            .unwrap_or_else(|| Tag::new(name, color))
    }
}

/// All versions of `prompt`, newest first.
///
/// Versions sharing a date fall back to the numeric suffix of their key.
pub fn versions_for_display(prompt: &Prompt) -> Vec<&Version> {
    let mut versions: Vec<&Version> = prompt.versions.values().collect();
    versions.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| compare_ordinals(&b.key, &a.key))
    });
    versions
}

fn compare_ordinals(a: &VersionKey, b: &VersionKey) -> Ordering {
    match (a.ordinal(), b.ordinal()) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
