//! # vidfetch API Server Library
//!
//! This library provides the HTTP front end of vidfetch: the request
//! pipeline (security headers, rate limiting, body parsing, sessions),
//! the `/api` routes, and static delivery of the single-page client.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Request pipeline stages
//! - `routes`: API route handlers and fallback dispatch

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
