use crate::cache::ResultsCache;
use crate::config::Config;
use crate::conversation_log::ConversationLogger;
use crate::pipeline::IntakeWorkflow;
use crate::retrieval::ReferenceIndex;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub reference_index: Arc<ReferenceIndex>,
    pub workflow: Arc<IntakeWorkflow>,
    pub results_cache: Arc<ResultsCache>,
    pub conversation_logger: Arc<ConversationLogger>,
}

/// A patient's discharge summary as returned by the record store
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DischargeRecord {
    pub patient_name: String,
    pub discharge_date: String,
    pub primary_diagnosis: String,
    pub medications: Vec<String>,
    pub dietary_restrictions: String,
    pub follow_up: String,
    pub warning_signs: String,
    pub discharge_instructions: String,
}

impl DischargeRecord {
    /// Render the record as the plain-text summary that seeds agent context
    pub fn summary_text(&self) -> String {
        format!(
            "Patient: {}\nDischarge date: {}\nPrimary diagnosis: {}\nMedications: {}\n\
             Dietary restrictions: {}\nFollow-up: {}\nWarning signs: {}\nDischarge instructions: {}",
            self.patient_name,
            self.discharge_date,
            self.primary_diagnosis,
            self.medications.join(", "),
            self.dietary_restrictions,
            self.follow_up,
            self.warning_signs,
            self.discharge_instructions,
        )
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct IntakeRequest {
    pub patient_name: String,
    #[serde(default)]
    pub user_query: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IntakeResponse {
    pub success: bool,
    pub patient_name: String,
    pub mode: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub database: String,
    pub reference_passages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_text_includes_all_fields() {
        let record = crate::db::operations::test_support::jane_doe();
        let text = record.summary_text();
        assert!(text.contains("Jane Doe"));
        assert!(text.contains("Lisinopril 10mg, Furosemide 20mg"));
        assert!(text.contains("Nephrology clinic"));
        assert!(text.contains("Warning signs"));
    }
}
