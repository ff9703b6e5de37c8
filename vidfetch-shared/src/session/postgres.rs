/// PostgreSQL session store
///
/// Persists sessions in a single table, created on startup if missing.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS session (
///     sid VARCHAR NOT NULL PRIMARY KEY,
///     sess JSON NOT NULL,
///     expire TIMESTAMPTZ NOT NULL
/// );
/// CREATE INDEX IF NOT EXISTS idx_session_expire ON session (expire);
/// ```
///
/// # Example
///
/// ```no_run
/// use vidfetch_shared::db::pool::{create_pool, DatabaseConfig};
/// use vidfetch_shared::session::{PgSessionStore, SessionStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgSessionStore::new(pool);
/// store.ensure_schema().await?;
/// let removed = store.prune_expired().await?;
/// println!("Pruned {} sessions", removed);
/// # Ok(())
/// # }
/// ```

use super::{SessionRecord, SessionStore, SessionStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{types::Json, PgPool};
use tracing::{debug, info};

/// Session store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the session table and its expiry index if missing
    pub async fn ensure_schema(&self) -> Result<(), SessionStoreError> {
        info!("Ensuring session table exists");

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS session (
                sid VARCHAR NOT NULL PRIMARY KEY,
                sess JSON NOT NULL,
                expire TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_session_expire ON session (expire)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let row: Option<(Json<Map<String, Value>>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT sess, expire FROM session WHERE sid = $1 AND expire > NOW()",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(data), expires_at)| SessionRecord {
            sid: sid.to_string(),
            data,
            expires_at,
        }))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), SessionStoreError> {
        sqlx::query(
            "INSERT INTO session (sid, sess, expire)
             VALUES ($1, $2, $3)
             ON CONFLICT (sid) DO UPDATE SET sess = EXCLUDED.sess, expire = EXCLUDED.expire",
        )
        .bind(&record.sid)
        .bind(Json(&record.data))
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        debug!(expires_at = %record.expires_at, "Session saved");
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), SessionStoreError> {
        sqlx::query("DELETE FROM session WHERE sid = $1")
            .bind(sid)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn prune_expired(&self) -> Result<u64, SessionStoreError> {
        let result = sqlx::query("DELETE FROM session WHERE expire <= NOW()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
