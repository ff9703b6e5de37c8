/// Request body parsing middleware
///
/// Buffers and parses JSON and URL-encoded request bodies before routing, so
/// malformed or oversized payloads are rejected with a client error before
/// any handler runs. The parsed value is available to handlers through the
/// [`ParsedBody`] extractor; the raw bytes are put back on the request so
/// regular extractors (`Json`, `Form`, `Bytes`) keep working.
///
/// # Rules
///
/// - `application/json` and `application/*+json`: top level must be an object
///   or array; an empty body parses as `{}`
/// - `application/x-www-form-urlencoded`: fields become a JSON object, repeated
///   keys collect into an array
/// - Anything else is passed through untouched
/// - Bodies over `api.body_limit_bytes` are rejected with 413
///
/// # Example
///
/// ```no_run
/// use vidfetch_api::middleware::body::ParsedBody;
/// use axum::Json;
///
/// async fn echo(ParsedBody(body): ParsedBody) -> Json<serde_json::Value> {
///     Json(body)
/// }
/// ```

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, Method},
    middleware::Next,
    response::Response,
    Form,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::convert::Infallible;

/// Parsed request body
///
/// `{}` when the request had no parseable body.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

impl Default for ParsedBody {
    fn default() -> Self {
        ParsedBody(Value::Object(Map::new()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ParsedBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<ParsedBody>().cloned().unwrap_or_default())
    }
}

/// Body encodings the parser understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    UrlEncoded,
    Other,
}

impl BodyKind {
    fn from_headers(headers: &HeaderMap) -> Self {
        let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
            return BodyKind::Other;
        };

        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json"
            || (essence.starts_with("application/") && essence.ends_with("+json"))
        {
            BodyKind::Json
        } else if essence == "application/x-www-form-urlencoded" {
            BodyKind::UrlEncoded
        } else {
            BodyKind::Other
        }
    }
}

/// Body parsing middleware layer
///
/// # Errors
///
/// - 400 Bad Request: Body is not valid JSON / URL-encoded data
/// - 413 Payload Too Large: Body exceeds the configured limit
pub async fn parse_body(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let kind = BodyKind::from_headers(request.headers());
    if kind == BodyKind::Other {
        return Ok(next.run(request).await);
    }

    let limit = state.config.api.body_limit_bytes;
    let (mut parts, body) = request.into_parts();

    let declared_length = parts
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_length.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }

    let bytes = read_limited(body, limit).await?;

    let parsed = match kind {
        BodyKind::Json => parse_json(&bytes)?,
        BodyKind::UrlEncoded => parse_urlencoded(bytes.clone()).await?,
        BodyKind::Other => Value::Object(Map::new()),
    };

    parts.extensions.insert(ParsedBody(parsed));
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, ApiError> {
    let mut stream = body.into_data_stream();
    let mut buffer = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;
        if buffer.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(buffer.freeze())
}

fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))?;

    if !(value.is_object() || value.is_array()) {
        return Err(ApiError::BadRequest(
            "JSON body must be an object or an array".to_string(),
        ));
    }

    Ok(value)
}

async fn parse_urlencoded(bytes: Bytes) -> Result<Value, ApiError> {
    let request = Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(bytes))
        .map_err(|e| ApiError::InternalError(format!("Failed to rebuild form request: {}", e)))?;

    let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid form body: {}", e.body_text())))?;

    let mut fields = Map::new();
    for (key, value) in pairs {
        match fields.get_mut(&key) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(key, Value::String(value));
            }
        }
    }

    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers
    }

    #[test]
    fn test_body_kind_detection() {
        assert_eq!(BodyKind::from_headers(&headers_with("application/json")), BodyKind::Json);
        assert_eq!(
            BodyKind::from_headers(&headers_with("Application/JSON; charset=utf-8")),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_headers(&headers_with("application/merge-patch+json")),
            BodyKind::Json
        );
        assert_eq!(
            BodyKind::from_headers(&headers_with("application/x-www-form-urlencoded")),
            BodyKind::UrlEncoded
        );
        assert_eq!(BodyKind::from_headers(&headers_with("text/plain")), BodyKind::Other);
        assert_eq!(BodyKind::from_headers(&HeaderMap::new()), BodyKind::Other);
    }

    #[test]
    fn test_parse_json_rules() {
        assert_eq!(parse_json(b"").unwrap(), json!({}));
        assert_eq!(parse_json(b"  \n").unwrap(), json!({}));
        assert_eq!(parse_json(br#"{"a":1}"#).unwrap(), json!({ "a": 1 }));
        assert_eq!(parse_json(b"[1,2]").unwrap(), json!([1, 2]));
        assert!(matches!(parse_json(b"\"text\""), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_json(b"{not json"), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_parse_urlencoded_repeated_keys() {
        let value = parse_urlencoded(Bytes::from_static(b"url=https%3A%2F%2Fexample.com&tag=a&tag=b&tag=c"))
            .await
            .unwrap();

        assert_eq!(
            value,
            json!({ "url": "https://example.com", "tag": ["a", "b", "c"] })
        );
    }

    #[tokio::test]
    async fn test_read_limited_rejects_oversize() {
        let result = read_limited(Body::from(vec![b'x'; 11]), 10).await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge { limit: 10 })));

        let bytes = read_limited(Body::from(vec![b'x'; 10]), 10).await.unwrap();
        assert_eq!(bytes.len(), 10);
    }
}
