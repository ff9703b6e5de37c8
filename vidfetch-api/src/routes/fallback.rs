/// Dispatch for requests that no named route matched
///
/// Resolved in priority order:
///
/// 1. `/api` paths answer `404 {"error":"API endpoint not found"}`
/// 2. In production, `GET`/`HEAD` requests are served from the static root;
///    paths without a matching file get the SPA shell (`index.html`) with 200
/// 3. Everything else is a plain 404

use crate::app::{is_api_path, AppState};
use crate::config::StaticFilesConfig;
use crate::error::ApiError;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

/// Where an unmatched request goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Unknown path in the API namespace
    ApiNotFound,

    /// Static asset or SPA shell
    Static,

    /// Nothing to serve
    NotFound,
}

impl Fallback {
    /// Picks the fallback for a request
    pub fn resolve(method: &Method, path: &str, serves_static: bool) -> Self {
        if is_api_path(path) {
            Fallback::ApiNotFound
        } else if serves_static && (method == Method::GET || method == Method::HEAD) {
            Fallback::Static
        } else {
            Fallback::NotFound
        }
    }
}

/// Router fallback handler
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let fallback = Fallback::resolve(
        request.method(),
        request.uri().path(),
        state.config.serves_static(),
    );

    match fallback {
        Fallback::ApiNotFound => ApiError::ApiNotFound.into_response(),
        Fallback::Static => serve_static(&state.config.static_files, request).await,
        Fallback::NotFound => {
            let message = format!("Cannot {} {}", request.method(), request.uri().path());
            (StatusCode::NOT_FOUND, message).into_response()
        }
    }
}

/// Method fallback for named API routes
pub async fn api_not_found() -> ApiError {
    ApiError::ApiNotFound
}

async fn serve_static(config: &StaticFilesConfig, request: Request) -> Response {
    let service = ServeDir::new(&config.root)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(config.index_file()));

    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
