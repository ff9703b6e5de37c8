/// Rate limiting middleware for API endpoints
///
/// Applies the shared fixed-window [`RateLimiter`](vidfetch_shared::ratelimit::RateLimiter)
/// to every request under `/api`. Other paths pass straight through.
///
/// # Client identity
///
/// The bucket key is the client IP resolved from the socket peer and
/// `X-Forwarded-For`, trusting `api.trust_proxy_hops` proxies (see
/// [`client_ip`](super::client_ip)).
///
/// # Headers
///
/// Responses to rate-limited paths include:
/// - `X-RateLimit-Limit`: Requests allowed per window
/// - `X-RateLimit-Remaining`: Requests left in the current window
/// - `X-RateLimit-Reset`: Unix timestamp when the window closes
/// - `Retry-After`: Seconds to wait (429 responses only)

use super::client_ip::{canonical, resolve_client_ip};
use crate::app::{is_api_path, AppState};
use crate::error::{ApiError, RATE_LIMIT_MESSAGE};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use vidfetch_shared::ratelimit::RateDecision;

/// Rate limiting middleware layer
///
/// # Errors
///
/// - 429 Too Many Requests: Rate limit exceeded
/// - 500 Internal Server Error: Peer address missing from the connection
pub async fn rate_limit_layer(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !is_api_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let peer = connect_info
        .map(|ConnectInfo(addr)| canonical(addr.ip()))
        .ok_or_else(|| ApiError::InternalError("Client address unavailable".to_string()))?;

    let client = resolve_client_ip(peer, request.headers(), state.config.api.trust_proxy_hops);
    let decision = state.rate_limiter.check(client);

    if !decision.allowed {
        tracing::warn!(
            client = %client,
            limit = decision.limit,
            retry_after = decision.retry_after_secs(),
            "Rate limit exceeded"
        );

        let mut response = ApiError::RateLimitExceeded {
            retry_after: decision.retry_after_secs(),
            message: RATE_LIMIT_MESSAGE.to_string(),
        }
        .into_response();
        insert_rate_limit_headers(response.headers_mut(), &decision);
        return Ok(response);
    }

    let mut response = next.run(request).await;
    insert_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let reset_at = chrono::Utc::now().timestamp() as u64 + decision.retry_after_secs();

    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(reset_at));
}
