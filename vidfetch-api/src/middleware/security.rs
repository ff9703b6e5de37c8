/// Security headers middleware
///
/// Adds a fixed set of hardening headers to every response, including
/// error and rate-limit responses. Header values are built once from static
/// tables; nothing in the request influences them.
///
/// # Headers Applied
///
/// - `Content-Security-Policy` - built from [`CSP_DIRECTIVES`]
/// - `Cross-Origin-Opener-Policy: same-origin`
/// - `Cross-Origin-Resource-Policy: same-origin`
/// - `Origin-Agent-Cluster: ?1`
/// - `Referrer-Policy: no-referrer`
/// - `Strict-Transport-Security: max-age=15552000; includeSubDomains`
/// - `X-Content-Type-Options: nosniff`
/// - `X-DNS-Prefetch-Control: off`
/// - `X-Download-Options: noopen`
/// - `X-Frame-Options: SAMEORIGIN`
/// - `X-Permitted-Cross-Domain-Policies: none`
/// - `X-XSS-Protection: 0`
///
/// `X-Powered-By` is removed if anything downstream set it.
///
/// # Example
///
/// ```no_run
/// use axum::Router;
/// use vidfetch_api::middleware::security::SecurityHeadersLayer;
///
/// let app: Router = Router::new()
///     .layer(SecurityHeadersLayer::new());
/// ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Content-Security-Policy directives, in emission order
///
/// An empty source list emits the bare directive name.
pub const CSP_DIRECTIVES: &[(&str, &[&str])] = &[
    ("default-src", &["'self'"]),
    ("script-src", &["'self'", "'unsafe-inline'", "'unsafe-eval'"]),
    ("style-src", &["'self'", "'unsafe-inline'"]),
    ("img-src", &["'self'", "data:", "https:"]),
    ("connect-src", &["'self'", "ws:", "wss:"]),
    ("base-uri", &["'self'"]),
    ("font-src", &["'self'", "https:", "data:"]),
    ("form-action", &["'self'"]),
    ("frame-ancestors", &["'self'"]),
    ("object-src", &["'none'"]),
    ("script-src-attr", &["'none'"]),
    ("upgrade-insecure-requests", &[]),
];

/// Hardening headers other than the CSP
const STATIC_HEADERS: &[(&str, &str)] = &[
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

/// Renders [`CSP_DIRECTIVES`] as a header value
pub fn content_security_policy() -> String {
    CSP_DIRECTIVES
        .iter()
        .map(|(directive, sources)| {
            if sources.is_empty() {
                directive.to_string()
            } else {
                format!("{} {}", directive, sources.join(" "))
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn build_policy_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_str(&content_security_policy())
            .expect("CSP table contains only visible ASCII"),
    );

    for &(name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    headers
}

/// Security headers middleware layer
#[derive(Clone)]
pub struct SecurityHeadersLayer {
    headers: Arc<HeaderMap>,
}

impl SecurityHeadersLayer {
    /// Creates a new security headers layer
    pub fn new() -> Self {
        Self {
            headers: Arc::new(build_policy_headers()),
        }
    }
}

impl Default for SecurityHeadersLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersMiddleware {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Security headers middleware service
#[derive(Clone)]
pub struct SecurityHeadersMiddleware<S> {
    inner: S,
    headers: Arc<HeaderMap>,
}

impl<S> Service<Request> for SecurityHeadersMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let future = self.inner.call(request);
        let policy = self.headers.clone();

        Box::pin(async move {
            let mut response = future.await?;

            let headers = response.headers_mut();
            headers.remove("x-powered-by");
            for (name, value) in policy.iter() {
                headers.insert(name.clone(), value.clone());
            }

            Ok(response)
        })
    }
}
