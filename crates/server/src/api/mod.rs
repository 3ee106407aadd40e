// HTTP surface: router assembly, shared middleware, operator endpoints.
//
// /ping and /forceupdate sit behind Basic auth; /githubevent authenticates
// by webhook signature instead and lives in `events`.

pub mod events;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::auth::basic::require_basic_auth;
use crate::config::ServerConfig;
use crate::error::{
    attach_request_id_header, request_id_from_headers_or_generate, with_request_id_scope,
    ApiError, ErrorCode,
};
use crate::git::mirror::{MirrorSync, SyncError, SyncSummary};

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub mirror: Arc<MirrorSync>,
}

pub fn build_router(state: AppState) -> Router {
    let basic_auth_layer =
        middleware::from_fn_with_state(Arc::clone(&state.config), require_basic_auth);

    apply_middleware(
        Router::new()
            .route("/ping", get(ping).route_layer(basic_auth_layer.clone()))
            .route("/forceupdate/{repo_name}", post(forceupdate).route_layer(basic_auth_layer))
            .route("/githubevent", post(events::github_event))
            .with_state(state),
    )
}

fn apply_middleware(router: Router) -> Router {
    router
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(panic_handler))
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "message": "Alive" }))
}

/// Body of a successful forceupdate: the repositories brought up to date,
/// plus the ones that failed when the outcome was mixed.
#[derive(Serialize)]
struct UpdatedEnvelope {
    #[serde(rename = "Updated")]
    updated: Vec<String>,
    #[serde(rename = "Failed", skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

/// `POST /forceupdate/{repo_name}`: sync one configured repository, or
/// every one of them when the name is the literal `all`.
async fn forceupdate(
    State(state): State<AppState>,
    Path(repo_name): Path<String>,
) -> Result<Response, ApiError> {
    if repo_name == "all" {
        return Ok(summary_response(state.mirror.sync_all().await));
    }

    match state.mirror.sync(&repo_name).await {
        Ok(()) => Ok((
            StatusCode::CREATED,
            Json(UpdatedEnvelope { updated: vec![repo_name], failed: Vec::new() }),
        )
            .into_response()),
        Err(SyncError::UnknownRepository(name)) => Err(ApiError::new(
            ErrorCode::UnknownRepository,
            format!("{name} not in configured list"),
        )),
        Err(sync_error) => {
            error!(repository = %repo_name, error = %sync_error, "forced sync failed");
            Err(ApiError::from_code(ErrorCode::SyncFailed)
                .with_details(json!({ "failed": [repo_name] })))
        }
    }
}

fn summary_response(summary: SyncSummary) -> Response {
    if summary.all_failed() {
        return ApiError::from_code(ErrorCode::SyncFailed)
            .with_details(json!({ "failed": summary.failed }))
            .into_response();
    }

    (
        StatusCode::CREATED,
        Json(UpdatedEnvelope { updated: summary.updated, failed: summary.failed }),
    )
        .into_response()
}

async fn panic_handler(request: Request<Body>, next: Next) -> Response {
    match tokio::spawn(async move { next.run(request).await }).await {
        Ok(response) => response,
        Err(join_error) => {
            error!(?join_error, "request handling panicked");
            ApiError::from_code(ErrorCode::InternalError).into_response()
        }
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request_id_from_headers_or_generate(request.headers());
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = with_request_id_scope(request_id.clone(), next.run(request)).await;

    attach_request_id_header(&mut response, &request_id);

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
