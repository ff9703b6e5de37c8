//! # vidfetch API Server
//!
//! Serves the vidfetch `/api` endpoints and, in production, the built
//! single-page client.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/vidfetch cargo run -p vidfetch-api
//! ```
//!
//! Without `DATABASE_URL` the server runs with sessions disabled.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidfetch_api::{
    app::{build_router, AppState},
    config::Config,
    middleware::session::SessionManager,
};
use vidfetch_shared::{
    db::pool::{close_pool, create_pool, DatabaseConfig},
    ratelimit::RateLimiter,
    session::{PgSessionStore, SessionStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vidfetch_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("vidfetch API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let environment = config.environment();

    let mut state = AppState::new(config.clone());
    let mut background = vec![spawn_rate_window_sweep(state.rate_limiter.clone())];

    let pool = match &config.session {
        Some(session_config) => {
            let pool = create_pool(DatabaseConfig {
                url: session_config.database_url.clone(),
                max_connections: session_config.max_connections,
                ..Default::default()
            })
            .await?;

            let store = PgSessionStore::new(pool.clone());
            store.ensure_schema().await?;
            tracing::info!("Session store ready");

            let store: Arc<dyn SessionStore> = Arc::new(store);
            background.push(spawn_session_prune(
                store.clone(),
                Duration::from_secs(session_config.prune_interval_secs),
            ));

            state = state.with_sessions(SessionManager::from_config(store, session_config, environment));
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; sessions are disabled");
            None
        }
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

    tracing::info!(
        port = config.api.port,
        environment = %environment,
        "serving on port {}",
        config.api.port
    );

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for task in background {
        task.abort();
    }
    if let Some(pool) = pool {
        close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Drops rate windows that have closed, once per window
fn spawn_rate_window_sweep(limiter: RateLimiter) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = limiter.sweep_expired();
            if removed > 0 {
                tracing::debug!(removed, "Swept expired rate windows");
            }
        }
    })
}

/// Deletes expired session records periodically
fn spawn_session_prune(store: Arc<dyn SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            match store.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Pruned expired sessions"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune expired sessions"),
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}
