//! # vidfetch Shared Library
//!
//! Transport-agnostic building blocks used by the vidfetch API server.
//!
//! ## Module Organization
//!
//! - `ratelimit`: Fixed-window per-client rate limiter
//! - `session`: Session records, cookie signing, and session stores
//! - `db`: PostgreSQL connection pool for the session store

pub mod db;
pub mod ratelimit;
pub mod session;

/// Current version of the vidfetch shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
