//! SerpAPI Client
//!
//! Web search fallback for clinical questions the reference index cannot
//! answer. Returns at most five results with title, link, and snippet.

use serde::{Deserialize, Serialize};
use serpapi_search_rust::serp_api_search::SerpApiSearch;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("SerpAPI key not configured")]
    NoApiKey,

    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse search results: {0}")]
    ParseError(String),

    #[error("No results found for query")]
    NoResults,
}

/// One web search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// SerpAPI client for web search
pub struct SerpApiClient {
    api_key: String,
    max_results: usize,
}

impl SerpApiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            max_results: 5,
        }
    }

    /// Configure client from config; returns None when no key is set
    pub fn from_config(config: &crate::config::SearchConfig) -> Option<Self> {
        if config.serpapi_key.is_empty() {
            return None;
        }

        Some(Self {
            api_key: config.serpapi_key.clone(),
            max_results: config.max_results.min(5),
        })
    }

    /// Search the web and return up to five {title, link, snippet} results
    pub async fn search(&self, query: &str) -> Result<Vec<WebResult>, SearchError> {
        if self.api_key.is_empty() {
            return Err(SearchError::NoApiKey);
        }

        info!(query = %query, "Searching the web via SerpAPI");

        let mut params = HashMap::<String, String>::new();
        params.insert("q".to_string(), query.to_string());
        params.insert("hl".to_string(), "en".to_string());
        params.insert("num".to_string(), self.max_results.to_string());

        let search = SerpApiSearch::google(params, self.api_key.clone());

        let results = search
            .json()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        debug!("Raw search response received");

        let web_results = parse_organic_results(&results, self.max_results)?;

        info!(count = web_results.len(), "Web search completed");
        Ok(web_results)
    }
}

/// Walk the provider's organic_results array into the narrow result shape.
/// Pure over the response JSON so it tests against fixtures.
pub fn parse_organic_results(
    response: &serde_json::Value,
    max_results: usize,
) -> Result<Vec<WebResult>, SearchError> {
    if let Some(error) = response.get("error").and_then(|v| v.as_str()) {
        return Err(SearchError::RequestFailed(error.to_string()));
    }

    let organic_results = response
        .get("organic_results")
        .ok_or(SearchError::NoResults)?;

    let results_array = organic_results
        .as_array()
        .ok_or_else(|| SearchError::ParseError("Expected array of results".to_string()))?;

    if results_array.is_empty() {
        return Err(SearchError::NoResults);
    }

    let mut web_results = Vec::new();
    for result in results_array.iter().take(max_results) {
        let title = result
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("Untitled")
            .to_string();

        let link = result
            .get("link")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let snippet = result
            .get("snippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        web_results.push(WebResult {
            title,
            link,
            snippet,
        });
    }

    Ok(web_results)
}
