/// Axum HTTP server setup and routing

use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::fixture::Fixture;
use crate::handlers::*;

/// Router for the tracker endpoint, plus asset pages under `/pages` when a
/// directory is given
pub fn create_router(fixture: Arc<Fixture>, pages_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Tracker JSON-RPC
        .route("/", post(json_rpc))
        .with_state(fixture);

    if let Some(dir) = pages_dir {
        router = router.nest_service("/pages", ServeDir::new(dir));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(
    fixture: Arc<Fixture>,
    pages_dir: Option<PathBuf>,
    host: String,
    port: u16,
) -> anyhow::Result<()> {
    let assets = fixture.asset_count();
    let app = create_router(fixture, pages_dir);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("Tracker mock listening on http://{}", addr);
    log::info!("Serving {} fixture assets", assets);

    axum::serve(listener, app).await?;

    Ok(())
}
