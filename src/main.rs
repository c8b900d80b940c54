//! Marquee Backend - movie-of-the-day service
//!
//! Serves the daily featured movie and a movie search endpoint, and runs a
//! background worker that keeps poster images pre-fetched from TMDB so
//! request handling never blocks on the external catalog.

mod api;
mod config;
mod db;
mod jobs;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::db::Database;
use crate::jobs::PosterFetcher;
use crate::services::TmdbClient;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Database,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Marquee backend");

    let db = Database::connect(&config.database_url).await?;
    tracing::info!("Database connected");

    let tmdb = Arc::new(TmdbClient::new(config.tmdb_api_key.clone()));

    // Poster fetcher runs until the shutdown token is cancelled
    let shutdown = CancellationToken::new();
    let fetcher = PosterFetcher::new(Arc::new(db.featured_movies()), tmdb);
    let worker = tokio::spawn(fetcher.run(shutdown.clone()));

    let state = AppState {
        config: config.clone(),
        db,
    };

    let app = Router::new()
        .merge(api::health::router())
        .nest("/api", api::movies::router())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Poster fetcher worker did not exit cleanly");
    }

    tracing::info!("Server exited cleanly");
    Ok(())
}

/// Wait for ctrl-c or SIGTERM, then cancel the worker shutdown token.
/// The server drains in-flight requests once this future resolves.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = ctrl_c => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            }
        }
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received, shutting down");
    shutdown.cancel();
}
