use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::domain::{ApiKeyRecord, Prompt, PromptId, Tag, UserProfile, VersionKey};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{error, info, warn};

pub mod api_keys;
pub mod auth;
pub mod backend;
pub mod config;
pub mod crud;
pub mod error;
pub mod playground;
pub mod selection;
pub mod store;
pub mod tier_gate;

pub use auth::{AnonymousAuth, AuthGateway, StaticTokenAuth};
pub use backend::BackendApi;
pub use config::{BillingConfig, ClientConfig};
pub use error::{AuthError, ClientError, LoginGate, Operation, Surface};
pub use playground::{PlaygroundOutcome, LOGIN_REQUIRED_FOR_TEST};
pub use selection::{MainPanel, Selection, SelectionController, SelectionState, View};
pub use store::{EntityStore, MergeOutcome};
pub use tier_gate::{CheckoutRedirect, LoggingCheckoutRedirect, PaywallDecision, Plan, PlanOutcome};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum ClientEvent {
    StoreChanged,
    SelectionChanged(SelectionState),
    BusyChanged { surface: Surface, busy: bool },
    Notice(String),
    Error {
        context: &'static str,
        message: String,
    },
    ProfileUpdated(Option<UserProfile>),
    ApiKeysChanged,
    ShowPaywall,
}

#[derive(Default)]
struct BusyFlags {
    details: AtomicBool,
    settings: AtomicBool,
    paywall: AtomicBool,
}

impl BusyFlags {
    fn flag(&self, surface: Surface) -> &AtomicBool {
        match surface {
            Surface::Details => &self.details,
            Surface::Settings => &self.settings,
            Surface::Paywall => &self.paywall,
        }
    }
}

/// Holds a surface's busy flag; clears it on drop, whatever the outcome.
pub(crate) struct BusyGuard<'a> {
    flag: &'a AtomicBool,
    surface: Surface,
    events: &'a broadcast::Sender<ClientEvent>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        let _ = self.events.send(ClientEvent::BusyChanged {
            surface: self.surface,
            busy: false,
        });
    }
}

struct ClientState {
    store: EntityStore,
    selection: SelectionController,
    profile: Option<UserProfile>,
    profile_loading: bool,
    api_keys: Vec<ApiKeyRecord>,
    paywall_task: Option<JoinHandle<()>>,
}

/// Top-level controller: owns the entity store and selection, and runs every
/// auth-gated backend procedure against them.
pub struct PromptClient {
    api: BackendApi,
    auth: Arc<dyn AuthGateway>,
    checkout: Arc<dyn CheckoutRedirect>,
    config: ClientConfig,
    inner: Mutex<ClientState>,
    busy: BusyFlags,
    events: broadcast::Sender<ClientEvent>,
}

impl PromptClient {
    pub fn new(
        config: ClientConfig,
        auth: Arc<dyn AuthGateway>,
    ) -> Result<Arc<Self>, ClientError> {
        Self::new_with_dependencies(config, auth, Arc::new(LoggingCheckoutRedirect))
    }

    pub fn new_with_dependencies(
        config: ClientConfig,
        auth: Arc<dyn AuthGateway>,
        checkout: Arc<dyn CheckoutRedirect>,
    ) -> Result<Arc<Self>, ClientError> {
        let api = BackendApi::new(&config.api_base_url)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(Self {
            api,
            auth,
            checkout,
            config,
            inner: Mutex::new(ClientState {
                store: EntityStore::new(),
                selection: SelectionController::new(),
                profile: None,
                profile_loading: false,
                api_keys: Vec::new(),
                paywall_task: None,
            }),
            busy: BusyFlags::default(),
            events,
        }))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    pub fn is_busy(&self, surface: Surface) -> bool {
        self.busy.flag(surface).load(Ordering::Acquire)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Runs `f` against a consistent snapshot of the store and selection.
    pub async fn read<R>(&self, f: impl FnOnce(&EntityStore, &SelectionController) -> R) -> R {
        let guard = self.inner.lock().await;
        f(&guard.store, &guard.selection)
    }

    pub async fn store_snapshot(&self) -> EntityStore {
        self.read(|store, _| store.clone()).await
    }

    pub async fn selection(&self) -> SelectionState {
        self.read(|_, selection| selection.snapshot()).await
    }

    pub async fn prompt(&self, prompt_id: &PromptId) -> Option<Prompt> {
        self.read(|store, _| store.get(prompt_id).cloned()).await
    }

    pub async fn selected_prompt(&self) -> Option<Prompt> {
        self.read(|store, selection| selection::selected_prompt(store, selection).cloned())
            .await
    }

    pub async fn available_tags(&self) -> Vec<Tag> {
        self.read(|store, _| store.available_tags()).await
    }

    /// Prompts matching the active tag filter.
    pub async fn filtered_prompts(&self) -> Vec<Prompt> {
        self.read(|store, selection| {
            store
                .filtered_prompts(selection.active_filter_tag())
                .into_iter()
                .cloned()
                .collect()
        })
        .await
    }

    pub async fn select_prompt(&self, prompt_id: &PromptId) -> bool {
        let authenticated = self.auth.is_authenticated();
        self.update_selection(|selection, store| {
            selection.select_prompt(store, authenticated, prompt_id)
        })
        .await
    }

    pub async fn select_version(&self, prompt_id: &PromptId, version_key: &VersionKey) -> bool {
        self.update_selection(|selection, store| {
            selection.select_version(store, prompt_id, version_key)
        })
        .await
    }

    pub async fn set_view(&self, view: View) -> bool {
        self.update_selection(|selection, _| selection.set_view(view))
            .await
    }

    pub async fn show_templates(&self) -> bool {
        self.set_view(View::Templates).await
    }

    pub async fn set_filter(&self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        self.update_selection(|selection, _| selection.set_filter(tag))
            .await
    }

    /// Rebuilds the store from the backend; signed-out visitors get an empty store.
    pub async fn load_prompts(&self) -> Result<(), ClientError> {
        let outcome = self.load_prompts_impl().await;
        self.report("load", outcome)
    }

    async fn load_prompts_impl(&self) -> Result<(), ClientError> {
        if !self.auth.is_authenticated() {
            self.reset_local_state().await;
            return Ok(());
        }
        let token = self.bearer_token().await?;
        let confirmed = self.api.list_prompts(&token).await?;
        self.apply(confirmed).await;
        let count = self.read(|store, _| store.len()).await;
        info!(count, "prompts: loaded");
        Ok(())
    }

    /// Initial load after authentication settles: prompts, API keys, profile,
    /// then the paywall policy. Returns the first failure, after trying everything.
    pub async fn bootstrap(self: &Arc<Self>) -> Result<(), ClientError> {
        let prompts = self.load_prompts().await;
        if self.auth.is_authenticated() {
            let keys = self.refresh_api_keys().await.map(|_| ());
            let profile = self.load_profile().await.map(|_| ());
            self.evaluate_paywall().await;
            return prompts.and(keys).and(profile);
        }
        prompts
    }

    pub async fn login(&self) {
        self.auth.login().await;
    }

    pub async fn logout(&self) {
        self.auth.logout().await;
        self.reset_local_state().await;
        {
            let mut guard = self.inner.lock().await;
            guard.profile = None;
            guard.api_keys.clear();
            if let Some(task) = guard.paywall_task.take() {
                task.abort();
            }
        }
        self.emit(ClientEvent::ProfileUpdated(None));
        self.emit(ClientEvent::ApiKeysChanged);
        info!("auth: logged out");
    }

    async fn reset_local_state(&self) {
        let selection_changed = {
            let mut guard = self.inner.lock().await;
            guard.store.clear();
            let changed = guard.selection.clear();
            changed.then(|| guard.selection.snapshot())
        };
        self.emit(ClientEvent::StoreChanged);
        if let Some(snapshot) = selection_changed {
            self.emit(ClientEvent::SelectionChanged(snapshot));
        }
    }

    async fn update_selection(
        &self,
        f: impl FnOnce(&mut SelectionController, &EntityStore) -> bool,
    ) -> bool {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let changed = f(&mut state.selection, &state.store);
            changed.then(|| state.selection.snapshot())
        };
        match snapshot {
            Some(snapshot) => {
                self.emit(ClientEvent::SelectionChanged(snapshot));
                true
            }
            None => false,
        }
    }

    /// Merges a backend-confirmed result, then re-validates the selection.
    pub(crate) async fn apply(&self, confirmed: store::Confirmed) -> MergeOutcome {
        let (outcome, selection_changed) = {
            let mut guard = self.inner.lock().await;
            let state = &mut *guard;
            let outcome = state.store.apply_server_result(confirmed);
            let changed = state.selection.reconcile(&state.store);
            (outcome, changed.then(|| state.selection.snapshot()))
        };
        if outcome == MergeOutcome::Applied {
            self.emit(ClientEvent::StoreChanged);
        }
        if let Some(snapshot) = selection_changed {
            self.emit(ClientEvent::SelectionChanged(snapshot));
        }
        outcome
    }

    pub(crate) fn require_login(&self, gate: LoginGate) -> Result<(), ClientError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::LoginRequired(gate))
        }
    }

    pub(crate) fn begin(&self, surface: Surface) -> Result<BusyGuard<'_>, ClientError> {
        let flag = self.busy.flag(surface);
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::Busy(surface))?;
        self.emit(ClientEvent::BusyChanged {
            surface,
            busy: true,
        });
        Ok(BusyGuard {
            flag,
            surface,
            events: &self.events,
        })
    }

    /// Bearer token for the next call; an expired session hands off to login.
    pub(crate) async fn bearer_token(&self) -> Result<String, ClientError> {
        match self.auth.access_token().await {
            Ok(token) => Ok(token),
            Err(AuthError::LoginRequired) => {
                warn!("auth: silent token refresh failed; redirecting to login");
                self.auth.login().await;
                Err(AuthError::LoginRequired.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn report<T>(
        &self,
        context: &'static str,
        outcome: Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        if let Err(err) = &outcome {
            match err {
                ClientError::LoginRequired(_) | ClientError::Validation(_) | ClientError::Busy(_) => {
                    info!(context, "{err}")
                }
                _ => error!(context, "{err}"),
            }
            self.emit(ClientEvent::Error {
                context,
                message: err.to_string(),
            });
        }
        outcome
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
