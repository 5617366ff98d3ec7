use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub search: SearchConfig,
    pub reference: ReferenceConfig,
    pub log: LogConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub google_api_key: String,
    pub model: String,
    pub formatting_model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
}

impl LLMConfig {
    /// The agent loop and the response formatter both degrade to
    /// deterministic output when no key is configured.
    pub fn active_api_key(&self) -> Option<String> {
        if self.google_api_key.is_empty() {
            None
        } else {
            Some(self.google_api_key.clone())
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub serpapi_key: String,
    pub max_results: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// Directory of plain-text reference documents indexed at startup
    pub docs_dir: String,
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub passage_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub conversation_log_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://hospital_discharge.db".to_string()),
                max_connections: env::var("DB_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            llm: LLMConfig {
                google_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| crate::llm::google::models::GEMINI_2_5_FLASH.to_string()),
                formatting_model: env::var("FORMATTING_LLM_MODEL").unwrap_or_else(|_| {
                    crate::llm::google::models::GEMINI_2_0_FLASH_EXP.to_string()
                }),
                request_timeout_secs: env::var("LLM_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()?,
                max_retries: env::var("LLM_MAX_RETRIES")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
            },
            search: SearchConfig {
                serpapi_key: env::var("SERP_API_KEY").unwrap_or_default(),
                max_results: env::var("SEARCH_MAX_RESULTS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            reference: ReferenceConfig {
                docs_dir: env::var("REFERENCE_DOCS_DIR")
                    .unwrap_or_else(|_| "reference_docs".to_string()),
                top_k: env::var("REFERENCE_TOP_K")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()?,
                chunk_size: env::var("REFERENCE_CHUNK_SIZE")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
                chunk_overlap: env::var("REFERENCE_CHUNK_OVERLAP")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()?,
                passage_max_chars: env::var("REFERENCE_PASSAGE_MAX_CHARS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()?,
            },
            log: LogConfig {
                conversation_log_path: env::var("CONVERSATION_LOG_PATH")
                    .unwrap_or_else(|_| "conversation_logs.jsonl".to_string()),
            },
            cache: CacheConfig {
                max_entries: env::var("RESULTS_CACHE_MAX_ENTRIES")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()?,
                ttl_secs: env::var("RESULTS_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()?,
            },
        })
    }

    /// In-memory configuration with empty API keys, used by tests so no
    /// network call is ever attempted.
    pub fn offline(database_url: &str) -> Self {
        Self {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
            },
            database: DatabaseConfig {
                url: database_url.to_string(),
                max_connections: 1,
            },
            llm: LLMConfig {
                google_api_key: String::new(),
                model: "gemini-2.5-flash".to_string(),
                formatting_model: "gemini-2.0-flash-exp".to_string(),
                request_timeout_secs: 30,
                max_retries: 3,
            },
            search: SearchConfig {
                serpapi_key: String::new(),
                max_results: 5,
            },
            reference: ReferenceConfig {
                docs_dir: String::new(),
                top_k: 3,
                chunk_size: 1000,
                chunk_overlap: 200,
                passage_max_chars: 500,
            },
            log: LogConfig {
                conversation_log_path: String::new(),
            },
            cache: CacheConfig {
                max_entries: 256,
                ttl_secs: 3600,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_config_has_no_keys() {
        let config = Config::offline("sqlite::memory:");
        assert!(config.llm.active_api_key().is_none());
        assert!(config.search.serpapi_key.is_empty());
        assert_eq!(config.reference.top_k, 3);
    }
}
