/// Integration tests for per-client rate limiting of `/api` paths

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{assert_security_headers, body_json, body_text, TestContext};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;
use vidfetch_api::error::RATE_LIMIT_MESSAGE;

fn forwarded_get(uri: &str, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::empty())
        .unwrap()
}

fn expected_platforms() -> Value {
    json!({
        "platforms": [
            { "name": "YouTube", "id": "youtube", "supported": true },
            { "name": "Instagram", "id": "instagram", "supported": true },
            { "name": "TikTok", "id": "tiktok", "supported": true },
            { "name": "Facebook", "id": "facebook", "supported": true },
            { "name": "Twitter/X", "id": "twitter", "supported": true },
            { "name": "Vimeo", "id": "vimeo", "supported": true }
        ]
    })
}

#[tokio::test]
async fn test_eleventh_request_is_rejected() {
    let ctx = TestContext::new();

    for expected_remaining in (0..10).rev() {
        let response = ctx.get("/api/platforms").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "10");
        assert_eq!(
            response.headers().get("x-ratelimit-remaining").unwrap(),
            &expected_remaining.to_string()
        );
        assert_eq!(body_json(response).await, expected_platforms());
    }

    let response = ctx.get("/api/platforms").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_security_headers(&response);
    assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(retry_after, 15 * 60);

    assert_eq!(body_text(response).await, RATE_LIMIT_MESSAGE);
}

#[tokio::test]
async fn test_rejected_requests_still_count() {
    let ctx = TestContext::new();

    for _ in 0..12 {
        ctx.get("/api/platforms").await;
    }

    let client: IpAddr = common::client_addr().ip();
    assert_eq!(ctx.state.rate_limiter.window_for(client).unwrap().count, 12);
}

#[tokio::test]
async fn test_window_resets() {
    let ctx = TestContext::new();

    for _ in 0..10 {
        assert_eq!(ctx.get("/api/health").await.status(), StatusCode::OK);
    }
    assert_eq!(ctx.get("/api/health").await.status(), StatusCode::TOO_MANY_REQUESTS);

    ctx.clock.advance(Duration::from_secs(14 * 60));
    assert_eq!(ctx.get("/api/health").await.status(), StatusCode::TOO_MANY_REQUESTS);

    ctx.clock.advance(Duration::from_secs(60));
    let response = ctx.get("/api/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "9");
}

#[tokio::test]
async fn test_non_api_paths_are_not_limited() {
    let ctx = TestContext::new();

    for _ in 0..20 {
        let response = ctx.get("/about").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    assert_eq!(ctx.get("/api/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_clients_behind_proxy_are_counted_separately() {
    let ctx = TestContext::builder()
        .env(&[("RATE_LIMIT_MAX_REQUESTS", "2")])
        .build();

    for _ in 0..2 {
        let response = ctx.send(forwarded_get("/api/health", "198.51.100.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = ctx.send(forwarded_get("/api/health", "198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = ctx.send(forwarded_get("/api/health", "198.51.100.2")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Only the last hop is trusted, so a spoofed leading entry is ignored.
    let response = ctx
        .send(forwarded_get("/api/health", "10.0.0.1, 198.51.100.1"))
        .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_header_ignored_without_trusted_proxies() {
    let ctx = TestContext::builder()
        .env(&[("RATE_LIMIT_MAX_REQUESTS", "1"), ("TRUST_PROXY_HOPS", "0")])
        .build();

    let response = ctx.send(forwarded_get("/api/health", "198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx.send(forwarded_get("/api/health", "198.51.100.2")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
