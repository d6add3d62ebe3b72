use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use logcollect_logs::{Broadcaster, FilterQuery};

use crate::error::HttpError;
use crate::handlers;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub filter: FilterQuery,
    pub broadcaster: Broadcaster,
    /// Ends open streams so graceful shutdown can finish
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(filter: FilterQuery, broadcaster: Broadcaster, shutdown: CancellationToken) -> Self {
        Self {
            filter,
            broadcaster,
            shutdown,
        }
    }
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/filter", get(handlers::filter))
        .route("/stream", get(handlers::stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the HTTP listener. Failure here is fatal for the collector.
pub async fn bind(address: &str) -> Result<TcpListener, HttpError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| HttpError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Serve until the state's shutdown token fires
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), HttpError> {
    let shutdown = state.shutdown.clone();
    let local = listener.local_addr()?;
    tracing::info!(address = %local, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}
