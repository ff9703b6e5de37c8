/// Session persistence
///
/// Sessions are opaque JSON key/value bags identified by a random session id.
/// The id travels in a signed cookie (see [`cookie`]); the data lives in a
/// [`SessionStore`].
///
/// # Modules
///
/// - `cookie`: Session id generation and HMAC cookie signing
/// - `memory`: In-process store (tests and local development)
/// - `postgres`: PostgreSQL-backed store
///
/// # Example
///
/// ```
/// use vidfetch_shared::session::{MemorySessionStore, SessionRecord, SessionStore};
/// use chrono::{Duration, Utc};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemorySessionStore::new();
/// let mut record = SessionRecord::new("abc123".to_string(), Utc::now() + Duration::hours(24));
/// record.data.insert("views".to_string(), serde_json::json!(1));
///
/// store.save(&record).await?;
/// assert!(store.load("abc123").await?.is_some());
/// # Ok(())
/// # }
/// ```

pub mod cookie;
pub mod memory;
pub mod postgres;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Persisted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id (the unsigned cookie payload)
    pub sid: String,

    /// Session contents
    pub data: Map<String, Value>,

    /// When the record stops being valid
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates an empty record
    pub fn new(sid: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            sid,
            data: Map::new(),
            expires_at,
        }
    }

    /// Whether the record has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session store errors
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    /// Underlying database failure
    #[error("Session store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store could not be reached
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// Backend that persists sessions
///
/// Implementations must treat expired records as absent on `load`.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Fetches a live session by id
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Inserts or replaces a session
    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError>;

    /// Deletes a session; deleting a missing id is not an error
    async fn destroy(&self, sid: &str) -> Result<(), SessionStoreError>;

    /// Deletes every expired session, returning how many were removed
    async fn prune_expired(&self) -> Result<u64, SessionStoreError>;
}
