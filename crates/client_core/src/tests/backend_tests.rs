use super::*;
use crate::test_support::{date, prompt, spawn_backend, version, TOKEN};
use axum::http::{Method, StatusCode as HttpStatus};
use shared::domain::TagColor;

#[test]
fn rejects_non_http_base_urls() {
    assert!(matches!(
        BackendApi::new("not a url"),
        Err(ClientError::InvalidConfig(_))
    ));
    assert!(matches!(
        BackendApi::new("mailto:someone@example.com"),
        Err(ClientError::InvalidConfig(_))
    ));
    assert!(BackendApi::new("https://api.example.com/v1/").is_ok());
}

#[test]
fn endpoint_percent_encodes_segments_under_the_base_path() {
    let api = BackendApi::new("https://api.example.com/v1/").expect("api");
    assert_eq!(
        api.endpoint(&["prompts", "p 1", "tags", "a/b"]).as_str(),
        "https://api.example.com/v1/prompts/p%201/tags/a%2Fb"
    );
}

#[tokio::test]
async fn list_prompts_sends_bearer_token_and_normalizes_keys() {
    let backend = spawn_backend().await.expect("spawn backend");
    let d = date(2025, 5, 1);
    backend
        .seed(prompt("p1", "One", &[], &[version("v1", "x", d), version("v2", "y", d)]))
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let confirmed = api.list_prompts(TOKEN).await.expect("list prompts");

    let ServerResult::Loaded(prompts) = confirmed.result() else {
        panic!("expected a load result");
    };
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].latest_version.as_str(), "v2");
    assert_eq!(
        prompts[0].version(&VersionKey::new("v1")).map(|v| v.key.as_str()),
        Some("v1")
    );
    let requests = backend.requests().await;
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/prompts");
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer test-token"));
}

#[tokio::test]
async fn error_detail_becomes_the_failure_message() {
    let backend = spawn_backend().await.expect("spawn backend");
    backend
        .fail_with(HttpStatus::UNPROCESSABLE_ENTITY, "Title too long")
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let err = api
        .update_prompt(
            TOKEN,
            &PromptId::new("p1"),
            &UpdatePromptRequest {
                title: Some("x".to_string()),
            },
        )
        .await
        .expect_err("remote failure");

    assert_eq!(err.remote_status(), Some(422));
    assert_eq!(err.to_string(), "Failed to update prompt: Title too long");
}

#[tokio::test]
async fn missing_error_body_falls_back_to_status_text() {
    let backend = spawn_backend().await.expect("spawn backend");
    backend
        .fail_without_body(HttpStatus::SERVICE_UNAVAILABLE)
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let err = api.list_api_keys(TOKEN).await.expect_err("remote failure");

    assert_eq!(
        err.to_string(),
        "Failed to fetch user API keys: Service Unavailable"
    );
}

#[tokio::test]
async fn bad_token_is_an_unauthorized_remote_failure() {
    let backend = spawn_backend().await.expect("spawn backend");
    let api = BackendApi::new(&backend.url).expect("api");

    let err = api.user_profile("stale").await.expect_err("unauthorized");

    assert!(matches!(
        &err,
        ClientError::Remote { failure, .. } if failure.is_unauthorized()
    ));
}

#[tokio::test]
async fn tag_names_are_percent_encoded_in_the_path() {
    let backend = spawn_backend().await.expect("spawn backend");
    let d = date(2025, 5, 1);
    backend
        .seed(prompt(
            "p1",
            "One",
            &[("needs review", TagColor::Warning)],
            &[version("v1", "x", d)],
        ))
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let confirmed = api
        .remove_tag(TOKEN, &PromptId::new("p1"), "needs review")
        .await
        .expect("remove tag");

    let ServerResult::Replaced(updated) = confirmed.result() else {
        panic!("expected a replacement");
    };
    assert!(updated.tags.is_empty());
    let requests = backend.requests().await;
    assert_eq!(requests[0].method, Method::DELETE);
    assert_eq!(requests[0].path, "/prompts/p1/tags/needs%20review");
}

#[tokio::test]
async fn created_version_reads_its_key_from_version_id() {
    let backend = spawn_backend().await.expect("spawn backend");
    let d = date(2025, 5, 1);
    backend
        .seed(prompt("p1", "One", &[], &[version("v1", "x", d)]))
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let confirmed = api
        .create_version(
            TOKEN,
            &PromptId::new("p1"),
            &NewVersion {
                text: "second".to_string(),
                notes: String::new(),
                llm_provider: Some("openai".to_string()),
                model_id_used: Some("gpt-4o".to_string()),
            },
        )
        .await
        .expect("create version");

    let ServerResult::VersionCreated { prompt_id, version } = confirmed.result() else {
        panic!("expected a created version");
    };
    assert_eq!(prompt_id.as_str(), "p1");
    assert_eq!(version.key.as_str(), "v2");
    assert_eq!(version.model_id_used.as_deref(), Some("gpt-4o"));
}

#[tokio::test]
async fn delete_accepts_an_empty_no_content_reply() {
    let backend = spawn_backend().await.expect("spawn backend");
    let d = date(2025, 5, 1);
    backend
        .seed(prompt("p1", "One", &[], &[version("v1", "x", d)]))
        .await;
    let api = BackendApi::new(&backend.url).expect("api");

    let confirmed = api
        .delete_prompt(TOKEN, &PromptId::new("p1"))
        .await
        .expect("delete");

    assert_eq!(confirmed.result(), &ServerResult::Deleted(PromptId::new("p1")));
}

#[test]
fn replacement_for_another_prompt_is_rejected() {
    let api = BackendApi::new("http://localhost:8000").expect("api");
    let d = date(2025, 5, 1);
    let err = api
        .replacement(
            Operation::AddTag,
            &PromptId::new("p1"),
            prompt("p2", "Two", &[], &[version("v1", "x", d)]),
        )
        .expect_err("mismatched id");
    assert!(matches!(err, ClientError::InvalidResponse { .. }));
}

#[test]
fn prompt_without_its_latest_version_is_invalid() {
    let d = date(2025, 5, 1);
    let mut broken = prompt("p1", "One", &[], &[version("v1", "x", d)]);
    broken.latest_version = VersionKey::new("v3");
    assert!(matches!(
        normalize(Operation::FetchPrompts, broken),
        Err(ClientError::InvalidResponse { .. })
    ));
}
