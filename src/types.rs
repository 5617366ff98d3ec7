// Type definitions shared across the intake pipeline

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMRequest {
    pub model: String,
    pub messages: Vec<LLMMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMMessage {
    pub role: String, // "user", "assistant", "system"
    pub content: String,
}

impl LLMMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub finish_reason: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("LLM API error: {0}")]
    LLMApi(String),

    #[error("No record found for patient '{0}'")]
    RecordNotFound(String),

    #[error("Ambiguous patient name '{0}': {1} matches")]
    AmbiguousRecord(String, usize),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether this failure should render the "please verify your name"
    /// guidance instead of a generic processing error.
    pub fn is_record_lookup_failure(&self) -> bool {
        matches!(
            self,
            AppError::RecordNotFound(_) | AppError::AmbiguousRecord(_, _)
        )
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_message() {
        let err = AppError::RecordNotFound("Jane Doe".to_string());
        assert!(err.to_string().contains("No record found"));
        assert!(err.is_record_lookup_failure());
    }

    #[test]
    fn test_ambiguous_record_message() {
        let err = AppError::AmbiguousRecord("J Doe".to_string(), 3);
        assert!(err.to_string().contains("3 matches"));
        assert!(err.is_record_lookup_failure());
    }
}
