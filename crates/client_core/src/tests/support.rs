//! In-process fake of the prompt-library backend, plus fixtures shared by the
//! controller tests.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use shared::{
    domain::{ApiKeyRecord, Prompt, PromptId, Tag, TagColor, Tier, UserProfile, Version, VersionKey},
    protocol::{
        AddApiKeyRequest, CheckoutSessionRequest, NewPrompt, NewVersion, PlaygroundTestRequest,
        PlaygroundTestResponse, UpdateApiKeyRequest, UpdateNotesRequest, UpdatePromptRequest,
    },
};
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};

use crate::{
    auth::AuthGateway, error::AuthError, tier_gate::CheckoutRedirect, ClientConfig, PromptClient,
};

pub(crate) const TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
}

pub(crate) struct Backend {
    pub prompts: BTreeMap<PromptId, Prompt>,
    pub next_prompt: u32,
    pub today: NaiveDate,
    pub requests: Vec<RecordedRequest>,
    pub bodies: Vec<Value>,
    /// Every request is answered with this status and `{detail}` body.
    pub fail_with: Option<(StatusCode, Value)>,
    /// The next request waits for this to be notified before it is handled.
    pub hold: Option<Arc<Notify>>,
    pub profile: UserProfile,
    pub api_keys: Vec<ApiKeyRecord>,
    pub next_key_id: i64,
    pub playground: PlaygroundTestResponse,
    pub checkout_url: Option<String>,
}

impl Backend {
    fn new() -> Self {
        Self {
            prompts: BTreeMap::new(),
            next_prompt: 0,
            today: date(2025, 5, 12),
            requests: Vec::new(),
            bodies: Vec::new(),
            fail_with: None,
            hold: None,
            profile: UserProfile {
                tier: Tier::Free,
                has_seen_paywall_modal: false,
                subscription_status: None,
                email: Some("writer@example.com".to_string()),
            },
            api_keys: Vec::new(),
            next_key_id: 1,
            playground: PlaygroundTestResponse {
                output_text: Some("model output".to_string()),
                error: None,
            },
            checkout_url: Some("https://checkout.example.com/session/cs_test".to_string()),
        }
    }
}

type Shared = Arc<Mutex<Backend>>;

#[derive(Clone)]
pub(crate) struct MockBackend {
    pub url: String,
    pub state: Shared,
}

impl MockBackend {
    pub async fn seed(&self, prompt: Prompt) {
        self.state
            .lock()
            .await
            .prompts
            .insert(prompt.id.clone(), prompt);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    pub async fn last_body(&self) -> Option<Value> {
        self.state.lock().await.bodies.last().cloned()
    }

    pub async fn fail_with(&self, status: StatusCode, detail: &str) {
        self.state.lock().await.fail_with = Some((status, json!({ "detail": detail })));
    }

    pub async fn fail_without_body(&self, status: StatusCode) {
        self.state.lock().await.fail_with = Some((status, Value::Null));
    }

    pub async fn recover(&self) {
        self.state.lock().await.fail_with = None;
    }

    pub async fn hold_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.state.lock().await.hold = Some(Arc::clone(&notify));
        notify
    }

    /// Removes a prompt behind the client's back.
    pub async fn forget(&self, prompt_id: &str) {
        self.state
            .lock()
            .await
            .prompts
            .remove(&PromptId::new(prompt_id));
    }
}

pub(crate) async fn spawn_backend() -> Result<MockBackend> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state: Shared = Arc::new(Mutex::new(Backend::new()));
    let app = Router::new()
        .route("/prompts", get(list_prompts).post(create_prompt))
        .route("/prompts/:id", put(update_prompt).delete(delete_prompt))
        .route("/prompts/:id/versions", post(create_version))
        .route("/prompts/:id/versions/:key/notes", put(update_notes))
        .route("/prompts/:id/tags", post(add_tag))
        .route("/prompts/:id/tags/:name", axum::routing::delete(remove_tag))
        .route("/user/api-keys", get(list_api_keys).post(add_api_key))
        .route(
            "/user/api-keys/:key",
            put(update_api_key).delete(delete_api_key),
        )
        .route("/user/profile", get(user_profile))
        .route("/user/paywall-modal-seen", put(mark_paywall_seen))
        .route("/playground/test", post(playground_test))
        .route("/billing/create-checkout-session", post(checkout_session))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(MockBackend {
        url: format!("http://{addr}"),
        state,
    })
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let (failure, hold) = {
        let mut backend = state.lock().await;
        backend.requests.push(RecordedRequest {
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            authorization: authorization.clone(),
        });
        (backend.fail_with.clone(), backend.hold.take())
    };
    if let Some(hold) = hold {
        hold.notified().await;
    }
    if authorization.as_deref() != Some(format!("Bearer {TOKEN}").as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid token" })),
        )
            .into_response();
    }
    match failure {
        Some((status, Value::Null)) => status.into_response(),
        Some((status, body)) => (status, Json(body)).into_response(),
        None => next.run(request).await,
    }
}

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": format!("{what} not found") })),
    )
}

fn wire_version(version: &Version) -> Value {
    json!({
        "version_id": version.key,
        "text": version.text,
        "notes": version.notes,
        "date": version.date.format("%Y-%m-%d").to_string(),
        "llm_provider": version.llm_provider,
        "model_id_used": version.model_id_used,
    })
}

fn wire_prompt(prompt: &Prompt) -> Value {
    let versions: serde_json::Map<String, Value> = prompt
        .versions
        .iter()
        .map(|(key, version)| (key.to_string(), wire_version(version)))
        .collect();
    json!({
        "id": prompt.id,
        "title": prompt.title,
        "tags": prompt.tags,
        "versions": versions,
        "latest_version": prompt.latest_version,
    })
}

async fn list_prompts(State(state): State<Shared>) -> Json<Value> {
    let backend = state.lock().await;
    let prompts: Vec<Value> = backend.prompts.values().map(wire_prompt).collect();
    Json(json!({ "prompts": prompts }))
}

async fn create_prompt(State(state): State<Shared>, Json(draft): Json<NewPrompt>) -> Json<Value> {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(draft));
    backend.next_prompt += 1;
    let id = PromptId::new(format!("p{}", backend.next_prompt));
    let key = VersionKey::first();
    let prompt = Prompt {
        id: id.clone(),
        title: draft.title,
        tags: draft.tags,
        versions: BTreeMap::from([(
            key.clone(),
            Version {
                key: key.clone(),
                text: draft.initial_version_text,
                notes: draft.initial_version_notes,
                date: backend.today,
                llm_provider: None,
                model_id_used: None,
            },
        )]),
        latest_version: key,
    };
    let body = wire_prompt(&prompt);
    backend.prompts.insert(id, prompt);
    Json(body)
}

async fn update_prompt(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(update): Json<UpdatePromptRequest>,
) -> Reply {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(update));
    let prompt = backend
        .prompts
        .get_mut(&PromptId::new(id))
        .ok_or_else(|| not_found("Prompt"))?;
    if let Some(title) = update.title {
        prompt.title = title;
    }
    Ok(Json(wire_prompt(prompt)))
}

async fn delete_prompt(
    State(state): State<Shared>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let mut backend = state.lock().await;
    backend
        .prompts
        .remove(&PromptId::new(id))
        .ok_or_else(|| not_found("Prompt"))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_version(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(new_version): Json<NewVersion>,
) -> Reply {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(new_version));
    let today = backend.today;
    let prompt = backend
        .prompts
        .get_mut(&PromptId::new(id))
        .ok_or_else(|| not_found("Prompt"))?;
    let next = prompt
        .versions
        .keys()
        .filter_map(VersionKey::ordinal)
        .max()
        .unwrap_or(0)
        + 1;
    let key = VersionKey::new(format!("v{next}"));
    let version = Version {
        key: key.clone(),
        text: new_version.text,
        notes: new_version.notes,
        date: today,
        llm_provider: new_version.llm_provider,
        model_id_used: new_version.model_id_used,
    };
    let body = wire_version(&version);
    prompt.versions.insert(key.clone(), version);
    prompt.latest_version = key;
    Ok(Json(body))
}

async fn update_notes(
    State(state): State<Shared>,
    Path((id, key)): Path<(String, String)>,
    Json(update): Json<UpdateNotesRequest>,
) -> Reply {
    let mut backend = state.lock().await;
    backend.bodies.push(json!({ "notes": update.notes }));
    let version = backend
        .prompts
        .get_mut(&PromptId::new(id))
        .and_then(|prompt| prompt.versions.get_mut(&VersionKey::new(key)))
        .ok_or_else(|| not_found("Version"))?;
    version.notes = update.notes;
    Ok(Json(wire_version(version)))
}

async fn add_tag(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(tag): Json<Tag>,
) -> Reply {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(tag));
    let prompt = backend
        .prompts
        .get_mut(&PromptId::new(id))
        .ok_or_else(|| not_found("Prompt"))?;
    prompt.tags.push(tag);
    Ok(Json(wire_prompt(prompt)))
}

async fn remove_tag(
    State(state): State<Shared>,
    Path((id, name)): Path<(String, String)>,
) -> Reply {
    let mut backend = state.lock().await;
    let prompt = backend
        .prompts
        .get_mut(&PromptId::new(id))
        .ok_or_else(|| not_found("Prompt"))?;
    prompt.tags.retain(|tag| tag.name != name);
    Ok(Json(wire_prompt(prompt)))
}

async fn list_api_keys(State(state): State<Shared>) -> Json<Value> {
    Json(json!(state.lock().await.api_keys))
}

fn masked(plain: &str) -> String {
    let tail: String = plain
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

async fn add_api_key(
    State(state): State<Shared>,
    Json(request): Json<AddApiKeyRequest>,
) -> Json<Value> {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(request));
    let record = ApiKeyRecord {
        id: backend.next_key_id,
        llm_provider: request.llm_provider,
        masked_api_key: masked(&request.api_key_plain),
    };
    backend.next_key_id += 1;
    backend.api_keys.push(record.clone());
    Json(json!(record))
}

async fn update_api_key(
    State(state): State<Shared>,
    Path(provider): Path<String>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Reply {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(request));
    let record = backend
        .api_keys
        .iter_mut()
        .find(|record| record.llm_provider == provider)
        .ok_or_else(|| not_found("API key"))?;
    record.masked_api_key = masked(&request.new_api_key_plain);
    Ok(Json(json!(record)))
}

async fn delete_api_key(
    State(state): State<Shared>,
    Path(key): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let mut backend = state.lock().await;
    let before = backend.api_keys.len();
    backend
        .api_keys
        .retain(|record| record.id.to_string() != key);
    if backend.api_keys.len() == before {
        return Err(not_found("API key"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn user_profile(State(state): State<Shared>) -> Json<Value> {
    Json(json!(state.lock().await.profile))
}

async fn mark_paywall_seen(State(state): State<Shared>) -> StatusCode {
    state.lock().await.profile.has_seen_paywall_modal = true;
    StatusCode::NO_CONTENT
}

async fn playground_test(
    State(state): State<Shared>,
    Json(request): Json<PlaygroundTestRequest>,
) -> Json<Value> {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(request));
    Json(json!(backend.playground))
}

async fn checkout_session(
    State(state): State<Shared>,
    Json(request): Json<CheckoutSessionRequest>,
) -> Json<Value> {
    let mut backend = state.lock().await;
    backend.bodies.push(json!(request));
    Json(json!({ "checkout_url": backend.checkout_url }))
}

pub(crate) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(crate) fn version(key: &str, text: &str, on: NaiveDate) -> Version {
    Version {
        key: VersionKey::new(key),
        text: text.to_string(),
        notes: String::new(),
        date: on,
        llm_provider: None,
        model_id_used: None,
    }
}

/// A normalized prompt whose latest version is the last one listed.
pub(crate) fn prompt(id: &str, title: &str, tags: &[(&str, TagColor)], versions: &[Version]) -> Prompt {
    let latest_version = versions
        .last()
        .map(|version| version.key.clone())
        .unwrap_or_else(VersionKey::first);
    Prompt {
        id: PromptId::new(id),
        title: title.to_string(),
        tags: tags
            .iter()
            .map(|(name, color)| Tag::new(*name, *color))
            .collect(),
        versions: versions
            .iter()
            .map(|version| (version.key.clone(), version.clone()))
            .collect(),
        latest_version,
    }
}

/// Identity-provider double with a switchable session.
pub(crate) struct TestAuth {
    token: std::sync::Mutex<Option<String>>,
    refresh_fails: bool,
    loading: bool,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
}

impl TestAuth {
    pub fn signed_in() -> Arc<Self> {
        Arc::new(Self::with(Some(TOKEN.to_string()), false, false))
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self::with(None, false, false))
    }

    /// Authenticated, but the silent token refresh fails.
    pub fn expired() -> Arc<Self> {
        Arc::new(Self::with(Some(TOKEN.to_string()), true, false))
    }

    pub fn restoring() -> Arc<Self> {
        Arc::new(Self::with(Some(TOKEN.to_string()), false, true))
    }

    fn with(token: Option<String>, refresh_fails: bool, loading: bool) -> Self {
        Self {
            token: std::sync::Mutex::new(token),
            refresh_fails,
            loading,
            logins: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
        }
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthGateway for TestAuth {
    fn is_authenticated(&self) -> bool {
        self.token.lock().expect("token lock").is_some()
    }

    fn is_loading(&self) -> bool {
        self.loading
    }

    async fn access_token(&self) -> Result<String, AuthError> {
        if self.refresh_fails {
            return Err(AuthError::LoginRequired);
        }
        self.token
            .lock()
            .expect("token lock")
            .clone()
            .ok_or(AuthError::NotAuthenticated)
    }

    async fn login(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }

    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().expect("token lock") = None;
    }
}

#[derive(Default)]
pub(crate) struct RecordingRedirect {
    pub urls: std::sync::Mutex<Vec<String>>,
}

impl CheckoutRedirect for RecordingRedirect {
    fn open_checkout(&self, checkout_url: &str) {
        self.urls
            .lock()
            .expect("redirect lock")
            .push(checkout_url.to_string());
    }
}

pub(crate) fn test_config(url: &str) -> ClientConfig {
    let mut config = ClientConfig::with_base_url(url);
    config.paywall_delay = Duration::from_millis(20);
    config.billing.pro_monthly_price_id = Some("price_monthly".to_string());
    config.billing.pro_yearly_price_id = Some("price_yearly".to_string());
    config
}

pub(crate) fn client_with(
    backend: &MockBackend,
    auth: Arc<TestAuth>,
) -> (Arc<PromptClient>, Arc<RecordingRedirect>) {
    let redirect = Arc::new(RecordingRedirect::default());
    let client = PromptClient::new_with_dependencies(test_config(&backend.url), auth, redirect.clone())
        .expect("client");
    (client, redirect)
}

pub(crate) fn signed_in_client(backend: &MockBackend) -> Arc<PromptClient> {
    client_with(backend, TestAuth::signed_in()).0
}

pub(crate) fn signed_out_client(backend: &MockBackend) -> Arc<PromptClient> {
    client_with(backend, TestAuth::signed_out()).0
}

/// Seeds the backend with `prompts` and loads them into a signed-in client.
pub(crate) async fn loaded_client(backend: &MockBackend, prompts: Vec<Prompt>) -> Arc<PromptClient> {
    for prompt in prompts {
        backend.seed(prompt).await;
    }
    let client = signed_in_client(backend);
    client.load_prompts().await.expect("load prompts");
    client
}
