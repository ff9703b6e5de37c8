/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Liveness probe
/// - `platforms`: Supported video platforms
/// - `fallback`: Dispatch for requests no named route matched

pub mod fallback;
pub mod health;
pub mod platforms;
