//! Role Definitions
//!
//! A role is an immutable capability bundle: a goal, a backstory, the
//! tools it may invoke, and behavioral constraints. Definitions are
//! constructed once at startup and shared read-only across runs.

use crate::tools::ToolName;

/// Hard ceiling on reasoning-loop iterations for both roles
pub const MAX_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleId {
    Intake,
    Clinical,
}

impl RoleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleId::Intake => "intake",
            RoleId::Clinical => "clinical",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub goal: String,
    pub backstory: String,
    pub tool_names: Vec<ToolName>,
    pub max_iterations: usize,
    pub allow_delegation: bool,
    pub concurrent: bool,
}

impl RoleDefinition {
    pub fn permits_tool(&self, name: ToolName) -> bool {
        self.tool_names.contains(&name)
    }
}

/// Receptionist role for post-discharge patient intake
pub fn intake_role() -> RoleDefinition {
    RoleDefinition {
        id: RoleId::Intake,
        goal: "Collect patient identity, fetch the patient's discharge report from the \
               database, ask relevant clarifying follow-up questions based on the discharge \
               information, and route clinical medical queries to the clinical agent."
            .to_string(),
        backstory: "You are a friendly, empathetic medical receptionist agent. Your job is \
                    to gather the patient's name, retrieve their discharge summary using the \
                    record lookup tool, ask follow-up questions that help the clinical agent \
                    (current symptoms, medication adherence, allergies, vital signs if \
                    available), and then delegate clinical questions to the clinical agent."
            .to_string(),
        tool_names: vec![ToolName::RecordLookup],
        max_iterations: MAX_ITERATIONS,
        allow_delegation: true,
        // Interleaved tool calls within one reasoning loop are order-sensitive
        concurrent: false,
    }
}

/// Clinical role answering post-discharge questions with retrieval grounding
pub fn clinical_role() -> RoleDefinition {
    RoleDefinition {
        id: RoleId::Clinical,
        goal: "Answer clinical questions grounded first in the indexed reference materials; \
               fall back to a web search only when the indexed material is insufficient. \
               Provide concise answers with citations. Never provide a definitive diagnosis; \
               give guidance, recommended follow-ups, and emergency instructions when \
               necessary."
            .to_string(),
        backstory: "You are a clinical support agent. You must base clinical advice on the \
                    indexed reference materials. When outside the indexed content you may \
                    perform a limited web search and cite sources. Always include a short \
                    reminder to contact a licensed clinician for definitive care. Never make \
                    ungrounded diagnostic claims."
            .to_string(),
        tool_names: vec![ToolName::ReferenceSearch, ToolName::WebSearch],
        max_iterations: MAX_ITERATIONS,
        allow_delegation: true,
        concurrent: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_role_tool_bounds() {
        let role = intake_role();
        assert!(role.permits_tool(ToolName::RecordLookup));
        assert!(!role.permits_tool(ToolName::WebSearch));
        assert_eq!(role.max_iterations, 10);
        assert!(role.allow_delegation);
        assert!(!role.concurrent);
    }

    #[test]
    fn test_clinical_role_tool_bounds() {
        let role = clinical_role();
        assert!(role.permits_tool(ToolName::ReferenceSearch));
        assert!(role.permits_tool(ToolName::WebSearch));
        assert!(!role.permits_tool(ToolName::RecordLookup));
    }

    #[test]
    fn test_clinical_role_never_diagnoses() {
        let role = clinical_role();
        assert!(role.goal.contains("Never provide a definitive diagnosis"));
        assert!(role.backstory.contains("licensed clinician"));
    }
}
