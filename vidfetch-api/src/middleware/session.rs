/// Session attachment middleware
///
/// Attaches a [`Session`] to every request when session support is enabled.
/// The session id travels in a signed `vidfetch.sid` cookie; the data lives
/// in a [`SessionStore`].
///
/// # Lifecycle
///
/// - A valid cookie loads the stored session; a missing, tampered, or expired
///   one yields a fresh, empty session
/// - Fresh sessions are only persisted (and only get a cookie) once a handler
///   writes to them
/// - Reads never persist anything and never emit `Set-Cookie`
/// - A write saves the record with a renewed expiry and re-issues the cookie
/// - [`Session::destroy`] deletes the record and expires the cookie
///
/// # Failure
///
/// Store errors and store calls slower than the configured timeout fail the
/// request with a 500. The request never proceeds without its session.
///
/// # Example
///
/// ```no_run
/// use vidfetch_api::middleware::session::Session;
///
/// async fn count_views(session: Session) -> String {
///     let views = session.get::<u64>("views").unwrap_or(0) + 1;
///     session.insert("views", views).ok();
///     format!("{} views", views)
/// }
/// ```

use crate::config::{Environment, SessionConfig};
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use vidfetch_shared::session::cookie::{find_cookie, generate_session_id, CookieSigner};
use vidfetch_shared::session::{SessionRecord, SessionStore, SessionStoreError};

/// Name of the session cookie
pub const SESSION_COOKIE_NAME: &str = "vidfetch.sid";

/// Per-request view of a session
///
/// Cheap to clone; clones share state, so a handler's writes are visible to
/// the middleware when it commits after the handler returns.
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

#[derive(Debug, Default)]
struct SessionState {
    sid: Option<String>,
    data: Map<String, Value>,
    modified: bool,
    destroyed: bool,
}

/// What the middleware must do once the handler has run
#[derive(Debug, PartialEq)]
enum Commit {
    Untouched,
    Save(SessionRecord),
    Destroy(String),
}

impl Session {
    fn fresh() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    fn from_record(record: SessionRecord) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                sid: Some(record.sid),
                data: record.data,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session id, or `None` for a session that has never been saved
    pub fn id(&self) -> Option<String> {
        self.state().sid.clone()
    }

    /// Whether this session has not been persisted yet
    pub fn is_new(&self) -> bool {
        self.state().sid.is_none()
    }

    /// Whether a handler changed the session during this request
    pub fn is_modified(&self) -> bool {
        let state = self.state();
        state.modified || state.destroyed
    }

    /// Reads and deserializes a value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.state().data.get(key)?.clone();
        serde_json::from_value(value).ok()
    }

    /// Reads a raw JSON value
    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.state().data.get(key).cloned()
    }

    /// Stores a value, marking the session for saving
    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        let mut state = self.state();
        state.data.insert(key.to_string(), value);
        state.modified = true;
        Ok(())
    }

    /// Removes a value; only an actual removal marks the session for saving
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.state();
        let removed = state.data.remove(key);
        if removed.is_some() {
            state.modified = true;
        }
        removed
    }

    /// Removes every value
    pub fn clear(&self) {
        let mut state = self.state();
        if !state.data.is_empty() {
            state.data.clear();
            state.modified = true;
        }
    }

    /// Invalidates the session; the record is deleted after the handler returns
    pub fn destroy(&self) {
        let mut state = self.state();
        state.data.clear();
        state.destroyed = true;
    }

    fn commit(&self, expires_at: DateTime<Utc>) -> Commit {
        let mut state = self.state();

        if state.destroyed {
            return match state.sid.take() {
                Some(sid) => Commit::Destroy(sid),
                None => Commit::Untouched,
            };
        }

        if !state.modified {
            return Commit::Untouched;
        }

        let sid = state.sid.get_or_insert_with(generate_session_id).clone();
        state.modified = false;

        Commit::Save(SessionRecord {
            sid,
            data: state.data.clone(),
            expires_at,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| ApiError::InternalError("Session support is not enabled".to_string()))
    }
}

/// Session store, cookie policy, and store timeout
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    max_age: Duration,
    store_timeout: Duration,
    secure: bool,
}

impl SessionManager {
    /// Creates a manager
    ///
    /// `secure` controls the cookie's `Secure` attribute.
    pub fn new(store: Arc<dyn SessionStore>, secret: &str, max_age: Duration, secure: bool) -> Self {
        Self {
            store,
            signer: CookieSigner::new(secret),
            max_age,
            store_timeout: Duration::from_secs(5),
            secure,
        }
    }

    /// Creates a manager from configuration
    ///
    /// Cookies are `Secure` only in production.
    pub fn from_config(store: Arc<dyn SessionStore>, config: &SessionConfig, environment: Environment) -> Self {
        Self::new(
            store,
            &config.secret,
            Duration::from_secs(config.max_age_secs),
            environment.is_production(),
        )
        .with_store_timeout(Duration::from_millis(config.store_timeout_ms))
    }

    /// Sets the per-call store timeout
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn session_id_from(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| find_cookie(value, SESSION_COOKIE_NAME))
            .and_then(|value| self.signer.unsign(value))
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, SessionStoreError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(operation, error = %e, "Session store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Session store call timed out"
                );
                Err(ApiError::InternalError(format!(
                    "Session store {} timed out after {} ms",
                    operation,
                    self.store_timeout.as_millis()
                )))
            }
        }
    }

    async fn load(&self, headers: &HeaderMap) -> Result<Session, ApiError> {
        let Some(sid) = self.session_id_from(headers) else {
            return Ok(Session::fresh());
        };

        let record = self.with_timeout("load", self.store.load(&sid)).await?;
        Ok(record.map(Session::from_record).unwrap_or_else(Session::fresh))
    }

    async fn persist(&self, session: &Session, headers: &mut HeaderMap) -> Result<(), ApiError> {
        let expires_at = Utc::now() + chrono::Duration::seconds(self.max_age.as_secs() as i64);

        match session.commit(expires_at) {
            Commit::Untouched => {}
            Commit::Save(record) => {
                self.with_timeout("save", self.store.save(&record)).await?;
                headers.append(header::SET_COOKIE, self.cookie(&record.sid, expires_at)?);
            }
            Commit::Destroy(sid) => {
                self.with_timeout("destroy", self.store.destroy(&sid)).await?;
                headers.append(header::SET_COOKIE, self.expired_cookie()?);
            }
        }

        Ok(())
    }

    fn cookie(&self, sid: &str, expires_at: DateTime<Utc>) -> Result<HeaderValue, ApiError> {
        self.cookie_header(
            &self.signer.sign(sid),
            self.max_age.as_secs(),
            &expires_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        )
    }

    fn expired_cookie(&self) -> Result<HeaderValue, ApiError> {
        self.cookie_header("", 0, "Thu, 01 Jan 1970 00:00:00 GMT")
    }

    fn cookie_header(&self, value: &str, max_age: u64, expires: &str) -> Result<HeaderValue, ApiError> {
        let secure = if self.secure { "; Secure" } else { "" };
        let cookie = format!(
            "{}={}; Path=/; Max-Age={}; Expires={}; HttpOnly{}",
            SESSION_COOKIE_NAME, value, max_age, expires, secure
        );

        HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::InternalError(format!("Invalid session cookie: {}", e)))
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("max_age", &self.max_age)
            .field("store_timeout", &self.store_timeout)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

/// Session middleware layer
///
/// # Errors
///
/// - 500 Internal Server Error: Session store failed or timed out
pub async fn session_layer(
    State(manager): State<SessionManager>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = manager.load(request.headers()).await?;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;
    manager.persist(&session, response.headers_mut()).await?;

    Ok(response)
}
