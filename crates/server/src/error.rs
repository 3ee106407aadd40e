use std::future::Future;

use axum::{
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Stable error codes carried in every error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    SignatureMissing,
    SignatureMismatch,
    UnsupportedSignatureAlgorithm,
    UnknownRepository,
    InvalidPayload,
    SyncFailed,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::SignatureMissing => "SIGNATURE_MISSING",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::UnsupportedSignatureAlgorithm => "UNSUPPORTED_SIGNATURE_ALGORITHM",
            Self::UnknownRepository => "UNKNOWN_REPOSITORY",
            Self::InvalidPayload => "INVALID_PAYLOAD",
            Self::SyncFailed => "SYNC_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::SignatureMissing => StatusCode::FORBIDDEN,
            Self::SignatureMismatch => StatusCode::FORBIDDEN,
            Self::UnsupportedSignatureAlgorithm => StatusCode::NOT_IMPLEMENTED,
            Self::UnknownRepository => StatusCode::BAD_REQUEST,
            Self::InvalidPayload => StatusCode::BAD_REQUEST,
            Self::SyncFailed => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn default_message(self) -> &'static str {
        match self {
            Self::Unauthorized => "authentication required",
            Self::SignatureMissing => "webhook signature header is missing",
            Self::SignatureMismatch => "webhook signature does not match",
            Self::UnsupportedSignatureAlgorithm => "webhook signature algorithm is not supported",
            Self::UnknownRepository => "repository is not in the configured list",
            Self::InvalidPayload => "webhook payload could not be parsed",
            Self::SyncFailed => "mirror synchronization failed",
            Self::InternalError => "internal server error",
        }
    }
}

/// HTTP error response carrying a stable code and a human-readable message.
#[derive(Debug, Clone)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Value,
    request_id: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: json!({}), request_id: None }
    }

    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let request_id = self.request_id.or_else(current_request_id);

        let mut response = (
            self.code.status(),
            Json(json!({
                "error": {
                    "code": self.code.as_str(),
                    "message": self.message,
                    "request_id": request_id.clone(),
                    "details": self.details,
                }
            })),
        )
            .into_response();

        // Browsers and git clients expect the challenge on 401.
        if self.code == ErrorCode::Unauthorized {
            response
                .headers_mut()
                .insert("www-authenticate", HeaderValue::from_static("Basic"));
        }

        if let Some(request_id) = request_id {
            attach_request_id_header(&mut response, &request_id);
        }

        response
    }
}

pub async fn with_request_id_scope<F>(request_id: String, future: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID.scope(request_id, future).await
}

pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

pub fn request_id_from_headers_or_generate(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub fn attach_request_id_header(response: &mut Response, request_id: &str) {
    if let Ok(header) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header);
    }
}
