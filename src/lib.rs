// Aftercare - post-discharge patient intake assistant

pub mod agents;
pub mod cache;
pub mod config;
pub mod conversation_log;
pub mod db;
pub mod formatter;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod retrieval;
pub mod routes;
pub mod search; // Web search (SerpAPI) used when the reference index is insufficient
pub mod tools;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
// Note: Import specific items from types module instead of glob to avoid name conflicts
// e.g., use aftercare::types::{LLMRequest, LLMResponse, AppResult};

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
