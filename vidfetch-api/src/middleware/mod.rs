/// Middleware modules for the API server
///
/// This module contains custom middleware for:
/// - Security headers
/// - Client IP resolution behind proxies
/// - Rate limiting of `/api` paths
/// - Request body parsing
/// - Cookie-backed sessions

pub mod body;
pub mod client_ip;
pub mod rate_limit;
pub mod security;
pub mod session;
