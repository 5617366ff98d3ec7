//! Response formatting
//!
//! Pipeline output arrives as normalized but sometimes stilted text. An
//! auxiliary model pass rewrites it into a warm, conversational reply for
//! the patient. Formatting is strictly best-effort: any failure, missing
//! key, or suspicious (JSON-shaped) rewrite falls back to the normalized
//! text, so the caller always receives a rendered message.

use crate::config::LLMConfig;
use crate::llm::{LLMProviderConfig, LLM};
use crate::pipeline::normalizer::extract_message_from_json;
use crate::types::{LLMMessage, LLMRequest};
use tracing::{debug, warn};

/// True when text reads as a serialized JSON value rather than prose
pub fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

/// Render pipeline output for the patient.
///
/// Takes the normalized text, the patient's name, and the question that
/// prompted the run (absent for init-mode sessions). Always starts from
/// `extract_message_from_json` so embedded log payloads are unwrapped
/// before any rewriting happens.
pub async fn format_response(
    raw: &str,
    patient_name: &str,
    user_query: Option<&str>,
    llm_config: &LLMConfig,
) -> String {
    let extracted = extract_message_from_json(raw);

    let api_key = match llm_config.active_api_key() {
        Some(key) => key,
        None => {
            debug!("No formatting key configured, returning normalized text");
            return extracted;
        }
    };

    let llm = LLM::new(LLMProviderConfig {
        name: "google".to_string(),
        api_key,
        request_timeout_secs: llm_config.request_timeout_secs,
    });

    let prompt = build_rewrite_prompt(&extracted, patient_name, user_query);

    let request = LLMRequest {
        model: llm_config.formatting_model.clone(),
        messages: vec![LLMMessage::user(prompt)],
        max_tokens: Some(1024),
        temperature: Some(0.3),
        system_instruction: None,
    };

    match llm.create_chat_completion(&request).await {
        Ok(response) => {
            let cleaned = response.content.replace("```", "").trim().to_string();
            if cleaned.is_empty() || looks_like_json(&cleaned) {
                // The rewrite came back as a serialized structure, keep
                // the normalized text instead
                warn!("Formatter produced JSON-shaped output, falling back");
                extracted
            } else {
                cleaned
            }
        }
        Err(e) => {
            warn!(error = %e, "Formatting call failed, falling back to normalized text");
            extracted
        }
    }
}

fn build_rewrite_prompt(message: &str, patient_name: &str, user_query: Option<&str>) -> String {
    let question_section = match user_query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => format!(
            "\nTHE PATIENT ASKED:\n{}\n\nOpen by answering that question directly.\n",
            query
        ),
        None => String::new(),
    };

    format!(
        "Rewrite the following post-discharge care message for the patient {name} \
         in a warm, clear, conversational tone. Keep every medical fact, every \
         safety warning, and the clinician disclaimer intact. Do not add new \
         medical claims. Return only the rewritten message as plain text.\n{question_section}\n\
         MESSAGE:\n{message}",
        name = patient_name,
        question_section = question_section,
        message = message,
    )
}
