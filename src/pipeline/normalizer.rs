//! Result Normalizer
//!
//! A pipeline run's raw result is heterogeneous: plain text, an object
//! exposing a final-text field, or an ordered list of per-task outputs.
//! All shape-sniffing lives in this one module, behind a tagged union at
//! the orchestration boundary, so it can be tested independently of
//! pipeline execution.

use crate::pipeline::tasks::TaskId;
use serde_json::Value;

/// Field names under which an execution result may expose its final text
const FINAL_TEXT_FIELDS: &[&str] = &["output", "raw", "final_output", "result"];

/// System placeholder prefix for log-style task outputs
const LOGGED_PLACEHOLDER_PREFIX: &str = "Logged";

/// Minimum length for a per-task output to count as meaningful
const MIN_TASK_OUTPUT_LEN: usize = 10;

/// Minimum length for a log-entry message to qualify for display
const MIN_LOG_MESSAGE_LEN: usize = 50;

/// Keywords marking substantial clinical content in interaction-log entries
const CLINICAL_KEYWORDS: &[&str] = &[
    "fever",
    "medication",
    "symptom",
    "pain",
    "doctor",
    "treatment",
    "follow-up",
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskOutput {
    pub task: TaskId,
    pub raw: String,
}

/// The raw, possibly heterogeneous result of executing a pipeline
#[derive(Debug, Clone)]
pub enum TerminalArtifact {
    PlainText(String),
    TaggedField(Value),
    TaskOutputList(Vec<TaskOutput>),
}

impl TerminalArtifact {
    /// Extract the best single text message. Priority, first match wins:
    /// a known final-text field, then the last meaningful per-task output,
    /// then a stringification of the whole artifact.
    pub fn extract_text(&self) -> String {
        match self {
            TerminalArtifact::PlainText(text) => text.clone(),
            TerminalArtifact::TaggedField(value) => {
                for field in FINAL_TEXT_FIELDS {
                    if let Some(text) = value.get(field).and_then(|v| v.as_str()) {
                        return text.to_string();
                    }
                }
                value.to_string()
            }
            TerminalArtifact::TaskOutputList(outputs) => {
                let meaningful: Vec<&str> = outputs
                    .iter()
                    .map(|o| o.raw.trim())
                    .filter(|raw| {
                        // entries shorter than the minimum are noise
                        raw.len() >= MIN_TASK_OUTPUT_LEN
                            && !raw.starts_with(LOGGED_PLACEHOLDER_PREFIX)
                    })
                    .collect();

                match meaningful.last() {
                    // The final task's output is assumed the most relevant.
                    // In init mode that is build-index, which runs after the
                    // questionnaire; see the pipeline-ordering note in DESIGN.md.
                    Some(last) => last.to_string(),
                    None => serde_json::to_string(outputs)
                        .unwrap_or_else(|_| format!("{:?}", outputs)),
                }
            }
        }
    }
}

/// Strip surrounding markdown code-fence markers from a payload
pub fn strip_code_fences(raw: &str) -> String {
    let mut cleaned = raw.trim();
    if cleaned.starts_with("```") {
        cleaned = cleaned
            .strip_prefix("```json")
            .or_else(|| cleaned.strip_prefix("```"))
            .unwrap_or(cleaned);
        cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
        cleaned = cleaned.trim();
    }
    cleaned.to_string()
}

/// Second extraction stage for patient display: when the normalized text
/// is itself a serialized interaction log, pull out the most substantial
/// message. On parse failure or no qualifying entry the input is returned
/// unchanged, so the function is idempotent on plain text.
pub fn extract_message_from_json(raw_text: &str) -> String {
    let cleaned = strip_code_fences(raw_text);

    let data: Value = match serde_json::from_str(&cleaned) {
        Ok(data) => data,
        Err(_) => return raw_text.to_string(),
    };

    let mut messages: Vec<String> = Vec::new();

    match &data {
        Value::Object(map) => {
            if let Some(entries) = map.get("interaction_log").and_then(|v| v.as_array()) {
                for entry in entries {
                    if let Some(msg) = entry.get("message").and_then(|v| v.as_str()) {
                        if msg.len() > MIN_LOG_MESSAGE_LEN && contains_clinical_keyword(msg) {
                            messages.push(msg.to_string());
                        }
                    }
                }
            } else if let Some(entries) = map.get("log_entries").and_then(|v| v.as_array()) {
                for entry in entries {
                    if let Some(msg) = entry.get("content").and_then(|v| v.as_str()) {
                        if msg.len() > MIN_LOG_MESSAGE_LEN {
                            messages.push(msg.to_string());
                        }
                    }
                }
            }
        }
        Value::Array(entries) => {
            for entry in entries {
                let msg = entry
                    .get("message")
                    .and_then(|v| v.as_str())
                    .or_else(|| entry.get("content").and_then(|v| v.as_str()));
                if let Some(msg) = msg {
                    if msg.len() > MIN_LOG_MESSAGE_LEN {
                        messages.push(msg.to_string());
                    }
                }
            }
        }
        _ => {}
    }

    match messages.into_iter().max_by_key(|m| m.len()) {
        Some(longest) => longest,
        None => raw_text.to_string(),
    }
}

fn contains_clinical_keyword(message: &str) -> bool {
    let lower = message.to_lowercase();
    CLINICAL_KEYWORDS.iter().any(|k| lower.contains(k))
}
