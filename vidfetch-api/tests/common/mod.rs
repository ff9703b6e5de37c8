#![allow(dead_code)]

/// Common test utilities for integration tests
///
/// This module provides shared infrastructure for integration tests:
/// - Configuration from a fixed variable set
/// - The full request pipeline with a mock peer address
/// - A manually advanced clock for the rate limiter
/// - Response body helpers

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use vidfetch_api::app::{api_routes, with_pipeline, AppState};
use vidfetch_api::config::Config;
use vidfetch_api::middleware::session::SessionManager;
use vidfetch_shared::ratelimit::{ManualClock, RateLimiter};
use vidfetch_shared::session::SessionStore;

/// Secret the test session manager signs cookies with
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

/// Socket peer every test request arrives from
pub fn client_addr() -> SocketAddr {
    SocketAddr::from(([203, 0, 113, 7], 41000))
}

/// Builds configuration from `(name, value)` pairs
pub fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    Config::from_map(&vars).expect("test configuration is valid")
}

/// Test context containing the router and its controllable parts
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
}

impl TestContext {
    /// Default configuration, API routes only, no sessions
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder {
            config: config(&[]),
            routes: Router::new(),
            sessions: None,
            store_timeout: None,
        }
    }

    /// Sends a request through the full pipeline
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, body: &str) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub struct TestContextBuilder {
    config: Config,
    routes: Router<AppState>,
    sessions: Option<Arc<dyn SessionStore>>,
    store_timeout: Option<Duration>,
}

impl TestContextBuilder {
    /// Replaces the configuration
    pub fn env(mut self, vars: &[(&str, &str)]) -> Self {
        self.config = config(vars);
        self
    }

    /// Adds routes next to the API routes
    pub fn routes(mut self, routes: Router<AppState>) -> Self {
        self.routes = routes;
        self
    }

    /// Enables sessions backed by `store`
    pub fn sessions(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestContext {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(
            self.config.rate_limit.max_requests,
            self.config.rate_limit.window(),
            clock.clone(),
        );
        let environment = self.config.environment();

        let mut state = AppState::new(self.config).with_rate_limiter(limiter);
        if let Some(store) = self.sessions {
            let mut manager = SessionManager::new(
                store,
                TEST_SESSION_SECRET,
                Duration::from_secs(24 * 60 * 60),
                environment.is_production(),
            );
            if let Some(timeout) = self.store_timeout {
                manager = manager.with_store_timeout(timeout);
            }
            state = state.with_sessions(manager);
        }

        let app = with_pipeline(api_routes().merge(self.routes), state.clone())
            .layer(MockConnectInfo(client_addr()));

        TestContext { app, state, clock }
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Asserts the hardening headers every response must carry
pub fn assert_security_headers(response: &Response) {
    let headers = response.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "SAMEORIGIN");
    assert!(headers.get("strict-transport-security").is_some());
    assert!(headers.get("x-powered-by").is_none());
}
