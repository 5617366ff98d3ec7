use crate::types::{AppResult, LLMRequest, LLMResponse};
use async_trait::async_trait;

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Configuration for an LLM provider instance
pub struct LLMProviderConfig {
    pub name: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
}

impl LLM {
    pub fn new(provider: LLMProviderConfig) -> Self {
        let adapter: Box<dyn LLMAdapter> = match provider.name.as_str() {
            // Gemini generateContent API, the only provider this system uses
            "google" | "gemini" => Box::new(crate::llm::google::GoogleAdapter::new(
                &provider.api_key,
                provider.request_timeout_secs,
            )),
            _ => panic!("Unsupported provider: {}", provider.name),
        };

        Self { adapter }
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}
