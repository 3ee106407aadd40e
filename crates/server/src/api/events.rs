// Webhook ingestion.
//
// `POST /githubevent` authenticates by signature, not Basic auth. The body
// is read once as raw bytes and the signature is checked against exactly
// those bytes before the event type or payload influences anything.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::auth::signature::{verify_signature, SIGNATURE_HEADER, SignatureError};
use crate::error::{ApiError, ErrorCode};
use crate::git::mirror::SyncError;

pub const EVENT_HEADER: &str = "x-github-event";

/// Push payload, reduced to the fields acted on.
#[derive(Debug, Deserialize)]
struct PushEvent {
    #[serde(rename = "ref")]
    ref_name: String,
    repository: RepositorySummary,
}

#[derive(Debug, Deserialize)]
struct RepositorySummary {
    name: String,
}

pub async fn github_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    if let Err(signature_error) =
        verify_signature(state.config.webhook_secret.as_deref(), header, &body)
    {
        warn!(error = %signature_error, "webhook signature rejected");
        let code = match signature_error {
            SignatureError::Missing => ErrorCode::SignatureMissing,
            SignatureError::UnsupportedAlgorithm(_) => ErrorCode::UnsupportedSignatureAlgorithm,
            SignatureError::Mismatch => ErrorCode::SignatureMismatch,
        };
        return ApiError::new(code, signature_error.to_string()).into_response();
    }

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    match event {
        "ping" => {
            info!("webhook ping received");
            Json(json!({ "message": "Ping received" })).into_response()
        }
        "push" => handle_push(&state, &body).await,
        other => {
            info!(event = other, "ignoring webhook event");
            (
                StatusCode::METHOD_NOT_ALLOWED,
                Json(json!({ "message": format!("X-GitHub-Event: {other} not useful") })),
            )
                .into_response()
        }
    }
}

async fn handle_push(state: &AppState, body: &Bytes) -> Response {
    let event: PushEvent = match serde_json::from_slice(body) {
        Ok(event) => event,
        Err(parse_error) => {
            warn!(error = %parse_error, "malformed push payload");
            return ApiError::from_code(ErrorCode::InvalidPayload).into_response();
        }
    };

    let name = event.repository.name;
    info!(repository = %name, git_ref = %event.ref_name, "push event received");

    match state.mirror.sync(&name).await {
        Ok(()) => Json(json!({ "message": format!("{name} updated") })).into_response(),
        Err(SyncError::UnknownRepository(unknown)) => {
            ApiError::new(ErrorCode::UnknownRepository, format!("{unknown} not in configured list"))
                .into_response()
        }
        Err(sync_error) => {
            error!(repository = %name, error = %sync_error, "webhook-triggered sync failed");
            ApiError::from_code(ErrorCode::SyncFailed).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{json_body, state_with};
    use super::super::{build_router, AppState};
    use crate::auth::signature::compute_signature;
    use crate::git::runner::testing::{exit, MockExecutor};

    use axum::{
        body::Body,
        http::{Method, Request as HttpRequest, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    const SECRET: &str = "test-webhook-secret";
    const PUSH_BODY: &str = r#"{"ref":"refs/heads/main","repository":{"name":"repoA"}}"#;

    fn app(state: AppState) -> Router {
        build_router(state)
    }

    fn signed(body: &str) -> String {
        format!("sha1={}", compute_signature(SECRET, body.as_bytes()))
    }

    fn event_request(
        event: Option<&str>,
        signature: Option<&str>,
        body: &str,
    ) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method(Method::POST)
            .uri("/githubevent")
            .header("content-type", "application/json");
        if let Some(event) = event {
            builder = builder.header("x-github-event", event);
        }
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature", signature);
        }
        builder.body(Body::from(body.to_string())).expect("request should build")
    }

    #[tokio::test]
    async fn ping_answers_without_syncing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let body = r#"{"zen":"Design for failure.","hook_id":1}"#;
        let response = app
            .oneshot(event_request(Some("ping"), Some(&signed(body)), body))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
        let parsed = json_body(response).await;
        assert_eq!(parsed["message"], "Ping received");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn ping_signature_is_still_enforced() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("ping"), Some("sha1=deadbeef"), "{}"))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn push_with_valid_signature_pulls_then_pushes() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::succeeding(2);
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("push"), Some(&signed(PUSH_BODY)), PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
        let parsed = json_body(response).await;
        assert_eq!(parsed["message"], "repoA updated");

        let argvs = mock.call_argvs();
        assert_eq!(argvs.len(), 2);
        assert_eq!(argvs[0][1], "clone");
        assert_eq!(argvs[0][3], "https://src.example.com/org/repoA");
        assert_eq!(argvs[1][3], "push");
        assert_eq!(argvs[1][5], "git@dst.example.com:org/repoA");
    }

    #[tokio::test]
    async fn push_without_configured_secret_skips_signature_checks() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::succeeding(2);
        let app = app(state_with(dir.path(), &["repoA"], None, &mock));

        let response = app
            .oneshot(event_request(Some("push"), None, PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn wrong_digest_is_rejected_before_any_command() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("push"), Some("sha1=deadbeef"), PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "SIGNATURE_MISMATCH");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_header_is_forbidden() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("push"), None, PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "SIGNATURE_MISSING");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn unsupported_algorithm_is_not_implemented() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let signature = format!("sha256={}", compute_signature(SECRET, PUSH_BODY.as_bytes()));
        let response = app
            .oneshot(event_request(Some("push"), Some(&signature), PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "UNSUPPORTED_SIGNATURE_ALGORITHM");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn header_without_digest_is_not_implemented() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("push"), Some("sha1"), PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn non_push_events_are_not_useful() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let body = r#"{"action":"published"}"#;
        let response = app
            .oneshot(event_request(Some("release"), Some(&signed(body)), body))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let parsed = json_body(response).await;
        assert_eq!(parsed["message"], "X-GitHub-Event: release not useful");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_event_header_is_not_useful() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(None, Some(&signed("{}")), "{}"))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let parsed = json_body(response).await;
        assert_eq!(parsed["message"], "X-GitHub-Event: unknown not useful");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn push_for_unknown_repository_runs_no_commands() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let body = r#"{"ref":"refs/heads/main","repository":{"name":"rogue"}}"#;
        let response = app
            .oneshot(event_request(Some("push"), Some(&signed(body)), body))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "UNKNOWN_REPOSITORY");
        assert_eq!(parsed["error"]["message"], "rogue not in configured list");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_push_payload_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let body = "{not json";
        let response = app
            .oneshot(event_request(Some("push"), Some(&signed(body)), body))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "INVALID_PAYLOAD");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn push_payload_missing_fields_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(Vec::new());
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let body = r#"{"ref":"refs/heads/main"}"#;
        let response = app
            .oneshot(event_request(Some("push"), Some(&signed(body)), body))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "INVALID_PAYLOAD");
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn push_sync_failure_is_surfaced() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mock = MockExecutor::new(vec![exit(128, "", "fatal: repository not found\n")]);
        let app = app(state_with(dir.path(), &["repoA"], Some(SECRET), &mock));

        let response = app
            .oneshot(event_request(Some("push"), Some(&signed(PUSH_BODY)), PUSH_BODY))
            .await
            .expect("request should return a response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let parsed = json_body(response).await;
        assert_eq!(parsed["error"]["code"], "SYNC_FAILED");
        assert_eq!(mock.calls().len(), 1);
    }
}
