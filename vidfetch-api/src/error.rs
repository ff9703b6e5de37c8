/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses,
/// plus the terminal error boundary of the request pipeline.
///
/// # Response shapes
///
/// - Client errors: `{"error": "...", "message": "..."}` with a 4xx status
/// - Unmatched API routes: exactly `{"error": "API endpoint not found"}` (404)
/// - Rate limiting: plain text body with 429 and `Retry-After`
/// - Server errors: `{"error": "Internal server error", "message": "..."}` (500);
///   the message is the raw detail in development and a generic string otherwise
///
/// # Example
///
/// ```
/// use vidfetch_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::{json, Value};
///
/// async fn handler() -> ApiResult<Json<Value>> {
///     Err(ApiError::InternalError("upstream exploded".to_string()))
/// }
/// ```

use crate::config::Environment;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Body of a rate-limited response
pub const RATE_LIMIT_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Message shown for server errors outside development
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong";

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400) - e.g., malformed body
    BadRequest(String),

    /// Unmatched `/api` route (404)
    ApiNotFound,

    /// Request body over the configured limit (413)
    PayloadTooLarge { limit: usize },

    /// Too many requests (429)
    RateLimitExceeded {
        retry_after: u64,
        message: String,
    },

    /// Internal server error (500)
    InternalError(String),
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error label
    pub error: String,

    /// Human-readable detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            error: "Internal server error".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Raw detail of a server error, attached to the redacted 500 response
///
/// The error boundary swaps it into the body in development mode.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::ApiNotFound => write!(f, "API endpoint not found"),
            ApiError::PayloadTooLarge { limit } => {
                write!(f, "Payload too large: limit is {} bytes", limit)
            }
            ApiError::RateLimitExceeded { message, .. } => write!(f, "Rate limit exceeded: {}", message),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::RateLimitExceeded { retry_after, message } => {
                let mut response = (StatusCode::TOO_MANY_REQUESTS, message).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
                response
            }
            ApiError::ApiNotFound => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "API endpoint not found".to_string(),
                    message: None,
                }),
            )
                .into_response(),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Bad request".to_string(),
                    message: Some(msg),
                }),
            )
                .into_response(),
            ApiError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(ErrorResponse {
                    error: "Payload too large".to_string(),
                    message: Some(format!("Request body exceeds {} bytes", limit)),
                }),
            )
                .into_response(),
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                let mut response = (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::internal(GENERIC_ERROR_MESSAGE)),
                )
                    .into_response();
                response.extensions_mut().insert(InternalErrorDetail(msg));
                response
            }
        }
    }
}

/// Convert store errors to API errors
impl From<vidfetch_shared::session::SessionStoreError> for ApiError {
    fn from(err: vidfetch_shared::session::SessionStoreError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

/// Uncaught error boundary
///
/// Sits outside every handler and middleware that can fail. Server errors
/// leave handlers with a generic message; in development this layer
/// replaces it with the raw detail so operators see what went wrong.
pub async fn error_boundary(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;

    let Some(InternalErrorDetail(detail)) = response.extensions_mut().remove::<InternalErrorDetail>() else {
        return response;
    };

    if !environment.is_development() {
        return response;
    }

    let body = match serde_json::to_vec(&ErrorResponse::internal(detail)) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error response");
            return response;
        }
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(body))
}

/// Converts a handler panic into a 500 response
///
/// Used with `tower_http::catch_panic::CatchPanicLayer::custom`.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };

    ApiError::InternalError(detail).into_response()
}
