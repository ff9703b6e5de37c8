/// Database layer for the session store
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool creation and health checks
///
/// The session table itself is managed by
/// [`PgSessionStore::ensure_schema`](crate::session::PgSessionStore::ensure_schema).

pub mod pool;
