// HTTP Basic authentication for the operator endpoints.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::config::ServerConfig;
use crate::error::{ApiError, ErrorCode};

/// Middleware rejecting requests whose `Authorization: Basic` credentials
/// do not match the configured pair. Failures answer 401 with a `Basic`
/// challenge and never echo what was supplied.
pub async fn require_basic_auth(
    State(config): State<Arc<ServerConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_basic_credentials)
        .map(|(username, password)| {
            credentials_match(&username, &password, &config.auth_username, &config.auth_password)
        })
        .unwrap_or(false);

    if !authorized {
        error!(path = %request.uri().path(), "unauthorized request");
        return ApiError::from_code(ErrorCode::Unauthorized).into_response();
    }

    next.run(request).await
}

/// Decode `Basic <base64(user:pass)>` into its credential pair. The split
/// is on the first `:` so passwords may contain colons.
fn extract_basic_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Compare both halves of the pair in constant time. Both comparisons
/// always run, so a wrong username costs the same as a wrong password.
fn credentials_match(
    username: &str,
    password: &str,
    expected_username: &str,
    expected_password: &str,
) -> bool {
    let username_ok = constant_time_eq(username, expected_username);
    let password_ok = constant_time_eq(password, expected_password);
    username_ok & password_ok
}

fn constant_time_eq(given: &str, expected: &str) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given.as_bytes().ct_eq(expected.as_bytes()).into()
}
