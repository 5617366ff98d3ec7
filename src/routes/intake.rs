use crate::cache::CachedResult;
use crate::conversation_log::exchange_session;
use crate::formatter::format_response;
use crate::models::{AppState, IntakeRequest, IntakeResponse};
use crate::types::AppError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/intake", post(post_intake))
        .route("/api/results/{id}", get(get_result))
        .with_state(state)
}

pub async fn post_intake(
    State(state): State<AppState>,
    Json(request): Json<IntakeRequest>,
) -> (StatusCode, ResponseJson<IntakeResponse>) {
    info!(patient = %request.patient_name, "Received intake request");
    let session_start = chrono::Utc::now();

    let mode = if request
        .user_query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .is_some()
    {
        "chat"
    } else {
        "init"
    };

    let run = state
        .workflow
        .run(&request.patient_name, request.user_query.as_deref())
        .await;

    match run {
        Ok(run) => {
            let user_query = request
                .user_query
                .as_deref()
                .map(str::trim)
                .filter(|q| !q.is_empty());
            let formatted = format_response(
                &run.message,
                &run.patient_name,
                user_query,
                &state.config.llm,
            )
            .await;

            let user_text = user_query.unwrap_or("Session initialization");
            state.conversation_logger.record(&exchange_session(
                &run.patient_name,
                user_text,
                &formatted,
                session_start,
            ));

            let result_id = state.results_cache.insert(CachedResult {
                patient_name: run.patient_name.clone(),
                mode: run.mode.as_str().to_string(),
                message: formatted.clone(),
                created_at: chrono::Utc::now(),
            });

            let response = IntakeResponse {
                success: true,
                patient_name: run.patient_name,
                mode: run.mode.as_str().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                response: Some(formatted),
                error: None,
                result_id: Some(result_id),
            };
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!(patient = %request.patient_name, error = %e, "Intake pipeline failed");

            let (status, message) = if e.is_record_lookup_failure() {
                (
                    StatusCode::NOT_FOUND,
                    format!(
                        "Patient record not found for '{}'. Please verify the name \
                         matches your discharge paperwork.",
                        request.patient_name.trim()
                    ),
                )
            } else if matches!(e, AppError::InvalidRequest(_)) {
                (StatusCode::BAD_REQUEST, e.to_string())
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Processing failed: {}", e),
                )
            };

            let response = IntakeResponse {
                success: false,
                patient_name: request.patient_name,
                mode: mode.to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                response: None,
                error: Some(message),
                result_id: None,
            };
            (status, Json(response))
        }
    }
}

async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ResponseJson<CachedResult>, (StatusCode, ResponseJson<serde_json::Value>)> {
    match state.results_cache.get(&id) {
        Some(result) => Ok(Json(result)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": format!("No cached result for id '{}'", id),
            })),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultsCache;
    use crate::config::Config;
    use crate::conversation_log::ConversationLogger;
    use crate::db::operations::test_support::{jane_doe, memory_pool};
    use crate::db::DischargeStore;
    use crate::pipeline::IntakeWorkflow;
    use crate::retrieval::ReferenceIndex;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn test_state() -> AppState {
        let pool = memory_pool().await;
        DischargeStore::insert(&pool, &jane_doe()).await.unwrap();

        let config = Config::offline("sqlite::memory:");
        let index = Arc::new(ReferenceIndex::from_documents(
            &[
                "Attend your follow-up appointment as scheduled; nephrology patients \
                 are typically seen within two weeks of discharge."
                    .to_string(),
            ],
            &config.reference,
        ));
        let workflow = Arc::new(IntakeWorkflow::new(
            pool.clone(),
            index.clone(),
            None,
            &config,
        ));
        let log_path =
            std::env::temp_dir().join(format!("intake-test-{}.jsonl", uuid::Uuid::new_v4()));

        AppState {
            pool,
            config,
            reference_index: index,
            workflow,
            results_cache: Arc::new(ResultsCache::new(&crate::config::CacheConfig {
                max_entries: 16,
                ttl_secs: 60,
            })),
            conversation_logger: Arc::new(ConversationLogger::new(log_path)),
        }
    }

    fn intake_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/intake")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_init_intake_returns_success_and_result_id() {
        let state = test_state().await;
        let app = router(state.clone());

        let response = app
            .oneshot(intake_request(serde_json::json!({"patient_name": "Jane Doe"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["mode"], "init");
        assert!(!body["response"].as_str().unwrap().is_empty());

        // The cached copy is retrievable under the returned id
        let result_id = body["result_id"].as_str().unwrap();
        let cached = state.results_cache.get(result_id).unwrap();
        assert_eq!(cached.patient_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_chat_intake_unknown_patient_is_not_found() {
        let state = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(intake_request(serde_json::json!({
                "patient_name": "Unknown Person",
                "user_query": "What medication?",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = response_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_chat_intake_answers_in_plain_text() {
        let state = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(intake_request(serde_json::json!({
                "patient_name": "Jane Doe",
                "user_query": "When is my follow-up?",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response_json(response).await;
        assert_eq!(body["mode"], "chat");
        let message = body["response"].as_str().unwrap();
        assert!(!message.contains('{'));
        assert!(message.contains("licensed clinician"));
    }

    #[tokio::test]
    async fn test_empty_patient_name_is_bad_request() {
        let state = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(intake_request(serde_json::json!({"patient_name": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_result_id_is_not_found() {
        let state = test_state().await;
        let app = router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/results/no-such-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
