//! API Routes
//!
//! HTTP endpoints for the intake service:
//! - `/api/intake` - Run the init or chat pipeline for a patient
//! - `/api/results/{id}` - Fetch a cached pipeline result
//! - `/api/health` - Health checks

pub mod health;
pub mod intake;

use crate::models::AppState;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    Router::new()
        .merge(intake::router(state.clone()))
        .merge(health::router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
