use crate::db;
use crate::models::{AppState, HealthResponse};
use axum::{extract::State, response::Json as ResponseJson, routing::get, Json, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> ResponseJson<HealthResponse> {
    let database = match db::health_check(&state.pool).await {
        Ok(_) => "connected".to_string(),
        Err(_) => "unavailable".to_string(),
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        database,
        reference_passages: state.reference_index.passage_count(),
    };

    Json(response)
}
