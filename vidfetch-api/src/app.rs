/// Application state and router builder
///
/// This module defines the shared application state and assembles the
/// request pipeline around the API routes.
///
/// # Example
///
/// ```no_run
/// use vidfetch_api::{app::AppState, config::Config};
/// use std::net::SocketAddr;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(config);
/// let app = vidfetch_api::app::build_router(state);
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
/// axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error,
    middleware::{body, rate_limit, security::SecurityHeadersLayer, session},
    routes,
};
use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use vidfetch_shared::ratelimit::RateLimiter;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Per-client request counter for `/api` paths
    pub rate_limiter: RateLimiter,

    /// Session support; `None` when no store is configured
    pub sessions: Option<session::SessionManager>,
}

impl AppState {
    /// Creates state with a limiter built from the configuration and no sessions
    pub fn new(config: Config) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window());

        Self {
            config: Arc::new(config),
            rate_limiter,
            sessions: None,
        }
    }

    /// Replaces the rate limiter
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Enables sessions
    pub fn with_sessions(mut self, sessions: session::SessionManager) -> Self {
        self.sessions = Some(sessions);
        self
    }
}

/// Whether a path belongs to the API namespace
///
/// API paths are rate limited and never fall through to static serving.
pub fn is_api_path(path: &str) -> bool {
    path == "/api" || path.starts_with("/api/")
}

/// Named API routes
///
/// ```text
/// /api
/// ├── GET /health      # Liveness probe
/// └── GET /platforms   # Supported video platforms
/// ```
///
/// A known path hit with an unsupported method answers like an unknown
/// API path.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/health",
            get(routes::health::health_check).fallback(routes::fallback::api_not_found),
        )
        .route(
            "/api/platforms",
            get(routes::platforms::list_platforms).fallback(routes::fallback::api_not_found),
        )
}

/// Wraps routes in the full request pipeline
///
/// # Middleware Stack
///
/// Outermost first:
/// 1. Request tracing (tower-http TraceLayer)
/// 2. Security headers, applied to every response
/// 3. Error boundary (development error detail)
/// 4. Panic catcher
/// 5. Rate limiting (`/api` paths only)
/// 6. Body parsing
/// 7. Sessions (when configured)
///
/// Unmatched requests go to [`routes::fallback::dispatch`].
pub fn with_pipeline(router: Router<AppState>, state: AppState) -> Router {
    let mut router = router.fallback(routes::fallback::dispatch);

    if let Some(sessions) = state.sessions.clone() {
        router = router.layer(from_fn_with_state(sessions, session::session_layer));
    }

    router
        .layer(from_fn_with_state(state.clone(), body::parse_body))
        .layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_layer))
        .layer(CatchPanicLayer::custom(error::handle_panic))
        .layer(from_fn_with_state(state.config.environment(), error::error_boundary))
        .layer(SecurityHeadersLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Builds the complete Axum router with all routes and middleware
///
/// The router reads the peer address from `ConnectInfo<SocketAddr>`; serve
/// it with `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn build_router(state: AppState) -> Router {
    with_pipeline(api_routes(), state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_is_api_path() {
        assert!(is_api_path("/api"));
        assert!(is_api_path("/api/"));
        assert!(is_api_path("/api/health"));
        assert!(is_api_path("/api/does/not/exist"));
        assert!(!is_api_path("/apis"));
        assert!(!is_api_path("/"));
        assert!(!is_api_path("/about/api"));
    }

    #[test]
    fn test_app_state_from_config() {
        let config = Config::from_map(&HashMap::from([
            ("RATE_LIMIT_MAX_REQUESTS".to_string(), "3".to_string()),
            ("RATE_LIMIT_WINDOW_SECS".to_string(), "60".to_string()),
        ]))
        .unwrap();

        let state = AppState::new(config);
        assert_eq!(state.rate_limiter.max_requests(), 3);
        assert_eq!(state.rate_limiter.window().as_secs(), 60);
        assert!(state.sessions.is_none());
    }
}
