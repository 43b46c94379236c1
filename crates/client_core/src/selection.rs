//! View/selection state machine over [`EntityStore`].
//!
//! Invalid transitions are silent no-ops; every transition reports whether it
//! changed anything so callers know when to re-render.

use shared::domain::{Prompt, PromptId, Version, VersionKey};

use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Details,
    Playground,
    Templates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveView {
    Details,
    Playground,
}

impl From<ActiveView> for View {
    fn from(value: ActiveView) -> Self {
        match value {
            ActiveView::Details => View::Details,
            ActiveView::Playground => View::Playground,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Empty,
    Active {
        prompt_id: PromptId,
        version_key: VersionKey,
        view: ActiveView,
    },
    Templates,
}

/// Flat snapshot handed to renderers and event subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    pub selected_prompt_id: Option<PromptId>,
    pub selected_version_id: Option<VersionKey>,
    pub current_view: View,
    pub active_filter_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionController {
    selection: Selection,
    filter_tag: String,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selected_prompt_id(&self) -> Option<&PromptId> {
        match &self.selection {
            Selection::Active { prompt_id, .. } => Some(prompt_id),
            _ => None,
        }
    }

    pub fn selected_version_key(&self) -> Option<&VersionKey> {
        match &self.selection {
            Selection::Active { version_key, .. } => Some(version_key),
            _ => None,
        }
    }

    pub fn current_view(&self) -> View {
        match &self.selection {
            Selection::Active { view, .. } => (*view).into(),
            Selection::Templates => View::Templates,
            Selection::Empty => View::Details,
        }
    }

    pub fn active_filter_tag(&self) -> &str {
        &self.filter_tag
    }

    pub fn snapshot(&self) -> SelectionState {
        SelectionState {
            selected_prompt_id: self.selected_prompt_id().cloned(),
            selected_version_id: self.selected_version_key().cloned(),
            current_view: self.current_view(),
            active_filter_tag: self.filter_tag.clone(),
        }
    }

    pub fn select_prompt(
        &mut self,
        store: &EntityStore,
        authenticated: bool,
        prompt_id: &PromptId,
    ) -> bool {
        if let Some(prompt) = store.get(prompt_id) {
            return self.replace(Selection::Active {
                prompt_id: prompt.id.clone(),
                version_key: prompt.latest_version.clone(),
                view: ActiveView::Details,
            });
        }
        if store.is_empty() && !authenticated {
            return false;
        }
        self.replace(Selection::Empty)
    }

    /// Ignored unless `prompt_id` is still the selected prompt, so a stale
    /// continuation cannot yank the view to a prompt the user already left.
    pub fn select_version(
        &mut self,
        store: &EntityStore,
        prompt_id: &PromptId,
        key: &VersionKey,
    ) -> bool {
        let Selection::Active {
            prompt_id: selected,
            version_key,
            ..
        } = &mut self.selection
        else {
            return false;
        };
        if selected != prompt_id {
            return false;
        }
        let exists = store
            .get(prompt_id)
            .is_some_and(|prompt| prompt.versions.contains_key(key));
        if !exists || version_key == key {
            return false;
        }
        *version_key = key.clone();
        true
    }

    pub fn set_view(&mut self, target: View) -> bool {
        let next = match target {
            View::Templates => return self.replace(Selection::Templates),
            View::Details => ActiveView::Details,
            View::Playground => ActiveView::Playground,
        };
        match &mut self.selection {
            Selection::Active { view, .. } if *view != next => {
                *view = next;
                true
            }
            _ => false,
        }
    }

    pub fn set_filter(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.filter_tag == tag {
            return false;
        }
        self.filter_tag = tag;
        true
    }

    /// Selects `key` of `prompt_id` in the details view, if both exist.
    pub(crate) fn focus(
        &mut self,
        store: &EntityStore,
        prompt_id: &PromptId,
        key: &VersionKey,
    ) -> bool {
        let exists = store
            .get(prompt_id)
            .is_some_and(|prompt| prompt.versions.contains_key(key));
        if !exists {
            return false;
        }
        self.replace(Selection::Active {
            prompt_id: prompt_id.clone(),
            version_key: key.clone(),
            view: ActiveView::Details,
        })
    }

    pub fn clear(&mut self) -> bool {
        match self.selection {
            Selection::Active { .. } => self.replace(Selection::Empty),
            _ => false,
        }
    }

    /// Re-establishes the selection invariant after the store changed.
    ///
    /// A vanished prompt empties the selection; a vanished version falls back
    /// to the prompt's latest version.
    pub fn reconcile(&mut self, store: &EntityStore) -> bool {
        let Selection::Active {
            prompt_id,
            version_key,
            ..
        } = &self.selection
        else {
            return false;
        };
        let fallback = match store.get(prompt_id) {
            None => None,
            Some(prompt) if !prompt.versions.contains_key(version_key) => {
                Some(prompt.latest_version.clone())
            }
            Some(_) => return false,
        };
        let Some(latest) = fallback else {
            return self.replace(Selection::Empty);
        };
        if let Selection::Active { version_key, .. } = &mut self.selection {
            *version_key = latest;
        }
        true
    }

    fn replace(&mut self, next: Selection) -> bool {
        if self.selection == next {
            return false;
        }
        self.selection = next;
        true
    }
}

pub fn selected_prompt<'a>(
    store: &'a EntityStore,
    selection: &SelectionController,
) -> Option<&'a Prompt> {
    selection.selected_prompt_id().and_then(|id| store.get(id))
}

/// What the main area should render for the current selection.
#[derive(Debug, Clone, PartialEq)]
pub enum MainPanel<'a> {
    Templates,
    Details {
        prompt: &'a Prompt,
        version: &'a Version,
    },
    Playground {
        prompt: &'a Prompt,
        version: &'a Version,
    },
    /// Nothing selected, or the selection points at data no longer in the store.
    Placeholder,
}

pub fn main_panel<'a>(store: &'a EntityStore, selection: &SelectionController) -> MainPanel<'a> {
    match selection.selection() {
        Selection::Templates => MainPanel::Templates,
        Selection::Empty => MainPanel::Placeholder,
        Selection::Active {
            prompt_id,
            version_key,
            view,
        } => {
            let Some((prompt, version)) = store
                .get(prompt_id)
                .and_then(|prompt| prompt.version(version_key).map(|version| (prompt, version)))
            else {
                return MainPanel::Placeholder;
            };
            match view {
                ActiveView::Details => MainPanel::Details { prompt, version },
                ActiveView::Playground => MainPanel::Playground { prompt, version },
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
