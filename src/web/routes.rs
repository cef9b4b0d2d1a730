use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Endpoints the browser front-end talks to
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(handlers::api::upload_audio))
        .route("/process-transcription", post(handlers::api::process_transcription))
        .route("/set-db-config", post(handlers::api::set_db_config))
        .route("/schema-mermaid", post(handlers::api::schema_mermaid))
}

// Liveness check
pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(handlers::api::health))
}
