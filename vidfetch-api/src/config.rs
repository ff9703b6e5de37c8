/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. Configuration is read once at startup
/// and never changes afterwards.
///
/// # Environment Variables
///
/// - `APP_ENV` (or `NODE_ENV`): `development` or `production` (default: unspecified)
/// - `HOST`: Host to bind to (default: 0.0.0.0)
/// - `PORT`: Port to bind to (default: 5000)
/// - `TRUST_PROXY_HOPS`: Reverse proxies trusted for `X-Forwarded-For` (default: 1)
/// - `BODY_LIMIT_BYTES`: Maximum parsed request body (default: 102400)
/// - `RATE_LIMIT_WINDOW_SECS`: Rate limit window (default: 900)
/// - `RATE_LIMIT_MAX_REQUESTS`: Requests allowed per window (default: 10)
/// - `STATIC_ROOT`: Directory holding the built SPA (default: dist/public)
/// - `DATABASE_URL`: PostgreSQL URL; enables sessions when set
/// - `DATABASE_MAX_CONNECTIONS`: Session store pool size (default: 5)
/// - `SESSION_SECRET`: Cookie signing secret (required in production when sessions are enabled)
/// - `SESSION_MAX_AGE_SECS`: Session lifetime (default: 86400)
/// - `SESSION_STORE_TIMEOUT_MS`: Per-call session store timeout (default: 5000)
/// - `SESSION_PRUNE_INTERVAL_SECS`: Expired session sweep period (default: 900)
///
/// # Example
///
/// ```no_run
/// use vidfetch_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Secret used when sessions run outside production without `SESSION_SECRET`
const DEVELOPMENT_SESSION_SECRET: &str = "vidfetch-development-session-secret";

/// Longest accepted session lifetime (100 years)
const MAX_SESSION_AGE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// No mode configured: redacted errors, no static serving, insecure cookies allowed
    #[default]
    Unspecified,

    /// Verbose errors, no static serving, insecure cookies allowed
    Development,

    /// Redacted errors, static/SPA serving, `Secure` cookies
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => anyhow::bail!("Unknown environment '{}': expected development or production", other),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Unspecified => write!(f, "unspecified"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Rate limiting for `/api` paths
    pub rate_limit: RateLimitConfig,

    /// Static asset / SPA serving
    pub static_files: StaticFilesConfig,

    /// Session support; `None` when no store is configured
    pub session: Option<SessionConfig>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Execution mode
    pub environment: Environment,

    /// Number of reverse proxies whose `X-Forwarded-For` entries are trusted
    pub trust_proxy_hops: usize,

    /// Maximum size of a parsed request body in bytes
    pub body_limit_bytes: usize,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_secs: u64,

    /// Requests allowed per client per window
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 15 * 60,
            max_requests: 10,
        }
    }
}

/// Static asset configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticFilesConfig {
    /// Directory holding the built single-page application
    pub root: PathBuf,
}

impl StaticFilesConfig {
    /// Path of the SPA shell served for unmatched paths
    pub fn index_file(&self) -> PathBuf {
        self.root.join("index.html")
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Cookie signing secret
    #[serde(skip_serializing)]
    pub secret: String,

    /// Session lifetime in seconds (cookie `Max-Age` and record expiry)
    pub max_age_secs: u64,

    /// Timeout for a single store call in milliseconds
    pub store_timeout_ms: u64,

    /// Interval between expired-session sweeps in seconds
    pub prune_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A variable has an invalid value
    /// - Sessions are enabled in production without `SESSION_SECRET`
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from a fixed set of variables
    ///
    /// Useful in tests, where mutating the process environment is racy.
    pub fn from_map(vars: &HashMap<String, String>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            Some(value) => value.parse()?,
            None => Environment::default(),
        };

        let api = ApiConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            environment,
            trust_proxy_hops: parse_or(&lookup, "TRUST_PROXY_HOPS", 1)?,
            body_limit_bytes: parse_or(&lookup, "BODY_LIMIT_BYTES", 100 * 1024)?,
        };

        let rate_limit = RateLimitConfig {
            window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 15 * 60)?,
            max_requests: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 10)?,
        };

        if rate_limit.window_secs == 0 {
            anyhow::bail!("RATE_LIMIT_WINDOW_SECS must be greater than zero");
        }
        if rate_limit.max_requests == 0 {
            anyhow::bail!("RATE_LIMIT_MAX_REQUESTS must be greater than zero");
        }

        let static_files = StaticFilesConfig {
            root: lookup("STATIC_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("dist/public")),
        };

        let session = match lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            Some(database_url) => {
                let secret = match lookup("SESSION_SECRET").filter(|s| !s.is_empty()) {
                    Some(secret) => secret,
                    None if environment.is_production() => {
                        anyhow::bail!("SESSION_SECRET is required in production when DATABASE_URL is set")
                    }
                    None => DEVELOPMENT_SESSION_SECRET.to_string(),
                };

                let session = SessionConfig {
                    database_url,
                    max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
                    secret,
                    max_age_secs: parse_or(&lookup, "SESSION_MAX_AGE_SECS", 24 * 60 * 60)?,
                    store_timeout_ms: parse_or(&lookup, "SESSION_STORE_TIMEOUT_MS", 5000)?,
                    prune_interval_secs: parse_or(&lookup, "SESSION_PRUNE_INTERVAL_SECS", 15 * 60)?,
                };

                if session.max_age_secs == 0 || session.max_age_secs > MAX_SESSION_AGE_SECS {
                    anyhow::bail!(
                        "SESSION_MAX_AGE_SECS must be between 1 and {}",
                        MAX_SESSION_AGE_SECS
                    );
                }
                if session.store_timeout_ms == 0 {
                    anyhow::bail!("SESSION_STORE_TIMEOUT_MS must be greater than zero");
                }
                if session.prune_interval_secs == 0 {
                    anyhow::bail!("SESSION_PRUNE_INTERVAL_SECS must be greater than zero");
                }

                Some(session)
            }
            None => None,
        };

        Ok(Self {
            api,
            rate_limit,
            static_files,
            session,
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Execution mode
    pub fn environment(&self) -> Environment {
        self.api.environment
    }

    /// Whether unmatched non-API paths are served from the static root
    pub fn serves_static(&self) -> bool {
        self.api.environment.is_production()
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        None => Ok(default),
    }
}
