//! Agent tools
//!
//! A tool takes text in and always returns text out. Failures never
//! propagate upward as errors; they are folded into a structured JSON
//! error envelope so the owning role can adapt its response.

use crate::db::DischargeStore;
use crate::retrieval::ReferenceIndex;
use crate::search::{SerpApiClient, SearchError};
use crate::types::AppError;
use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    RecordLookup,
    ReferenceSearch,
    WebSearch,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::RecordLookup => "record_lookup",
            ToolName::ReferenceSearch => "reference_search",
            ToolName::WebSearch => "web_search",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "record_lookup" => Some(ToolName::RecordLookup),
            "reference_search" => Some(ToolName::ReferenceSearch),
            "web_search" => Some(ToolName::WebSearch),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &'static str;

    /// Run the tool. Always returns a text payload; failures become a
    /// `{"status":"error",...}` envelope rather than an Err.
    async fn run(&self, input: &str) -> String;
}

fn error_envelope(kind: &str, message: &str) -> String {
    json!({
        "status": "error",
        "kind": kind,
        "message": message,
    })
    .to_string()
}

/// Fetches a patient's discharge summary from the record store by name
pub struct RecordLookupTool {
    pool: SqlitePool,
}

impl RecordLookupTool {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Tool for RecordLookupTool {
    fn name(&self) -> ToolName {
        ToolName::RecordLookup
    }

    fn description(&self) -> &'static str {
        "Fetches a patient's complete discharge report from the hospital database by name. \
         Input: the patient's full name."
    }

    async fn run(&self, input: &str) -> String {
        match DischargeStore::lookup_by_name(&self.pool, input).await {
            Ok(record) => json!({
                "status": "success",
                "data": record,
            })
            .to_string(),
            Err(AppError::RecordNotFound(name)) => {
                debug!(patient = %name, "Record lookup found no match");
                error_envelope("not_found", &format!("No record found for patient '{}'.", name))
            }
            Err(AppError::AmbiguousRecord(name, count)) => {
                warn!(patient = %name, count, "Record lookup matched multiple rows");
                json!({
                    "status": "error",
                    "kind": "ambiguous",
                    "count": count,
                    "message": format!("Ambiguous patient name '{}': {} matches.", name, count),
                })
                .to_string()
            }
            Err(e) => {
                warn!(error = %e, "Record lookup failed");
                error_envelope("store_unavailable", &format!("Database retrieval failed: {}", e))
            }
        }
    }
}

/// Queries the reference-document index for relevant passages
pub struct ReferenceSearchTool {
    index: Arc<ReferenceIndex>,
}

impl ReferenceSearchTool {
    pub fn new(index: Arc<ReferenceIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl Tool for ReferenceSearchTool {
    fn name(&self) -> ToolName {
        ToolName::ReferenceSearch
    }

    fn description(&self) -> &'static str {
        "Queries the indexed clinical reference materials and returns the most relevant \
         passages. Input: a clinical question or topic."
    }

    async fn run(&self, input: &str) -> String {
        let passages = self.index.search(input);
        if passages.is_empty() {
            return error_envelope(
                "no_passages",
                "No indexed passages matched the query; consider a web search.",
            );
        }
        passages.join("\n\n")
    }
}

/// Performs a web search for questions outside the indexed material
pub struct WebSearchTool {
    client: Option<SerpApiClient>,
}

impl WebSearchTool {
    pub fn new(client: Option<SerpApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> ToolName {
        ToolName::WebSearch
    }

    fn description(&self) -> &'static str {
        "Performs a web search for clinical or general questions not covered by the \
         reference index. Results indicate they came from a web search."
    }

    async fn run(&self, input: &str) -> String {
        let client = match &self.client {
            Some(client) => client,
            None => return error_envelope("no_api_key", &SearchError::NoApiKey.to_string()),
        };

        match client.search(input).await {
            Ok(results) => json!({
                "status": "success",
                "source": "web_search",
                "query": input,
                "results": results,
                "note": "Information fetched via web search",
            })
            .to_string(),
            Err(e) => {
                warn!(error = %e, "Web search failed");
                error_envelope("search_failed", &format!("Web search failed: {}", e))
            }
        }
    }
}

/// The process-wide tool registry roles draw from
#[derive(Clone)]
pub struct ToolSet {
    tools: HashMap<ToolName, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new(
        pool: SqlitePool,
        index: Arc<ReferenceIndex>,
        search_client: Option<SerpApiClient>,
    ) -> Self {
        let mut tools: HashMap<ToolName, Arc<dyn Tool>> = HashMap::new();
        tools.insert(
            ToolName::RecordLookup,
            Arc::new(RecordLookupTool::new(pool)),
        );
        tools.insert(
            ToolName::ReferenceSearch,
            Arc::new(ReferenceSearchTool::new(index)),
        );
        tools.insert(ToolName::WebSearch, Arc::new(WebSearchTool::new(search_client)));
        Self { tools }
    }

    pub fn get(&self, name: ToolName) -> Option<Arc<dyn Tool>> {
        self.tools.get(&name).cloned()
    }
}
