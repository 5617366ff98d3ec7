//! Task Definitions
//!
//! A task is one declared unit of work: a description template with
//! named placeholders, an owning role, an expected-output contract, and
//! the upstream tasks whose outputs become its context. Definitions are
//! process-wide and immutable; placeholder substitution happens per run,
//! before any prompt reaches a role.

use crate::agents::roles::RoleId;
use crate::tools::ToolName;
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskId {
    FetchRecord,
    FollowUpQuestionnaire,
    ClinicalQuery,
    BuildIndex,
    LogInteraction,
}

impl TaskId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskId::FetchRecord => "fetch-record",
            TaskId::FollowUpQuestionnaire => "follow-up-questionnaire",
            TaskId::ClinicalQuery => "clinical-query",
            TaskId::BuildIndex => "build-index",
            TaskId::LogInteraction => "log-interaction",
        }
    }
}

/// Input binding for a task's probe tool call
#[derive(Debug, Clone, Copy)]
pub enum ProbeInput {
    PatientName,
    UserQuery,
    Static(&'static str),
}

/// Declarative probe: the tool invocation that seeds a task's transcript
#[derive(Debug, Clone, Copy)]
pub struct TaskProbe {
    pub tool: ToolName,
    pub input: ProbeInput,
}

#[derive(Debug, Clone)]
pub struct TaskDef {
    pub id: TaskId,
    pub name: &'static str,
    pub description_template: &'static str,
    pub expected_output: &'static str,
    pub role: RoleId,
    pub upstream: Vec<TaskId>,
    pub probe: Option<TaskProbe>,
    /// Promote a probe error envelope to a pipeline failure
    pub fail_on_probe_error: bool,
}

/// Per-run input bindings for placeholder substitution
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub patient_name: String,
    pub user_query: Option<String>,
}

impl TaskDef {
    /// Substitute `{patient_name}` and `{user_query}` from the run inputs.
    /// Substitution is total; no literal placeholder survives.
    pub fn render_description(&self, inputs: &RunInputs) -> String {
        self.description_template
            .replace("{patient_name}", &inputs.patient_name)
            .replace(
                "{user_query}",
                inputs.user_query.as_deref().unwrap_or(""),
            )
    }

    pub fn resolve_probe_input(&self, probe: &TaskProbe, inputs: &RunInputs) -> String {
        match probe.input {
            ProbeInput::PatientName => inputs.patient_name.clone(),
            ProbeInput::UserQuery => inputs.user_query.clone().unwrap_or_default(),
            ProbeInput::Static(text) => text.to_string(),
        }
    }
}

pub fn fetch_record_task() -> TaskDef {
    TaskDef {
        id: TaskId::FetchRecord,
        name: "Fetch Patient Discharge Report",
        description_template: "Fetch the discharge report for patient: {patient_name}. \
            Retrieve the discharge summary for the patient whose name is provided and \
            ensure the correct patient data is fetched. Handle cases where multiple or \
            no matches are found.",
        expected_output: "A structured discharge summary containing patient name, admission \
            details, diagnosis, treatment, and discharge recommendations retrieved from the \
            database.",
        role: RoleId::Intake,
        upstream: vec![],
        probe: Some(TaskProbe {
            tool: ToolName::RecordLookup,
            input: ProbeInput::PatientName,
        }),
        fail_on_probe_error: true,
    }
}

pub fn follow_up_questionnaire_task() -> TaskDef {
    TaskDef {
        id: TaskId::FollowUpQuestionnaire,
        name: "Post-Discharge Follow-up Questionnaire",
        description_template: "Using the discharge report, ask relevant follow-up questions \
            related to the patient's current health status, medication adherence, vital \
            signs, and any complications post-discharge. Route clinical queries to the \
            clinical agent as needed.",
        expected_output: "A structured record of follow-up responses and observations, with \
            any medical questions redirected to the clinical agent for detailed guidance.",
        role: RoleId::Intake,
        upstream: vec![TaskId::FetchRecord],
        probe: None,
        fail_on_probe_error: false,
    }
}

pub fn clinical_query_task() -> TaskDef {
    TaskDef {
        id: TaskId::ClinicalQuery,
        name: "Clinical Question Answering",
        description_template: "Answer the patient's question: {user_query}\n\
            Use the indexed discharge report and medical records for patient {patient_name}. \
            Provide accurate, personalized medical guidance based on their specific \
            condition, and summarize what you retrieved while searching in a concise manner.",
        expected_output: "A clear, accurate answer to the patient's question with: a direct \
            response to their query, relevant information from their discharge report, any \
            important safety warnings or follow-up recommendations, and suggested \
            medications, treatments, or remedies. All in a concise manner.",
        role: RoleId::Clinical,
        upstream: vec![TaskId::FollowUpQuestionnaire, TaskId::FetchRecord],
        probe: Some(TaskProbe {
            tool: ToolName::ReferenceSearch,
            input: ProbeInput::UserQuery,
        }),
        fail_on_probe_error: false,
    }
}

pub fn build_index_task() -> TaskDef {
    TaskDef {
        id: TaskId::BuildIndex,
        name: "Build Reference Knowledge Base",
        description_template: "Process the clinical reference materials, chunk them, and \
            confirm the reference index supports semantic retrieval for clinical question \
            answering.",
        expected_output: "A functional retrieval pipeline capable of returning reference \
            passages for clinical questions.",
        role: RoleId::Clinical,
        upstream: vec![TaskId::ClinicalQuery],
        probe: Some(TaskProbe {
            tool: ToolName::ReferenceSearch,
            input: ProbeInput::Static("post-discharge care guidance"),
        }),
        fail_on_probe_error: false,
    }
}

/// Defined but wired into neither pipeline; the interaction sink is the
/// conversation logger collaborator instead. Kept to match the shipped
/// task catalogue.
pub fn log_interaction_task() -> TaskDef {
    TaskDef {
        id: TaskId::LogInteraction,
        name: "System Interaction Logging",
        description_template: "Log all interactions between agents and patient \
            {patient_name}, including queries, retrieved information, agent handoffs, and \
            web search invocations. Store logs with timestamps and agent identifiers.",
        expected_output: "A detailed interaction log containing timestamps, query types, \
            agent responses, and any system actions taken during the workflow.",
        role: RoleId::Intake,
        upstream: vec![],
        probe: None,
        fail_on_probe_error: false,
    }
}

pub fn all_tasks() -> Vec<TaskDef> {
    vec![
        fetch_record_task(),
        follow_up_questionnaire_task(),
        clinical_query_task(),
        build_index_task(),
        log_interaction_task(),
    ]
}

/// Upstream lists must form a DAG: no task may be its own transitive
/// upstream. The shipped pipelines are linear chains, a degenerate DAG.
pub fn validate_upstream_dag(tasks: &[TaskDef]) -> AppResult<()> {
    for task in tasks {
        let mut stack: Vec<TaskId> = task.upstream.clone();
        let mut visited: Vec<TaskId> = Vec::new();

        while let Some(current) = stack.pop() {
            if current == task.id {
                return Err(AppError::Pipeline(format!(
                    "Task '{}' is its own transitive upstream",
                    task.id.as_str()
                )));
            }
            if visited.contains(&current) {
                continue;
            }
            visited.push(current);
            if let Some(def) = tasks.iter().find(|t| t.id == current) {
                stack.extend(def.upstream.iter().copied());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> RunInputs {
        RunInputs {
            patient_name: "Jane Doe".to_string(),
            user_query: Some("When is my follow-up?".to_string()),
        }
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        for task in all_tasks() {
            let rendered = task.render_description(&inputs());
            assert!(
                !rendered.contains("{patient_name}") && !rendered.contains("{user_query}"),
                "literal placeholder survived in task '{}'",
                task.id.as_str()
            );
        }
    }

    #[test]
    fn test_clinical_query_renders_both_inputs() {
        let rendered = clinical_query_task().render_description(&inputs());
        assert!(rendered.contains("Jane Doe"));
        assert!(rendered.contains("When is my follow-up?"));
    }

    #[test]
    fn test_task_catalogue_is_a_dag() {
        assert!(validate_upstream_dag(&all_tasks()).is_ok());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut tasks = all_tasks();
        // fetch-record <-> follow-up-questionnaire
        tasks[0].upstream = vec![TaskId::FollowUpQuestionnaire];
        assert!(validate_upstream_dag(&tasks).is_err());
    }

    #[test]
    fn test_ownership_matches_roles() {
        assert_eq!(fetch_record_task().role, RoleId::Intake);
        assert_eq!(follow_up_questionnaire_task().role, RoleId::Intake);
        assert_eq!(clinical_query_task().role, RoleId::Clinical);
        assert_eq!(build_index_task().role, RoleId::Clinical);
        assert_eq!(log_interaction_task().role, RoleId::Intake);
    }

    #[test]
    fn test_fetch_record_fails_on_probe_error() {
        let task = fetch_record_task();
        assert!(task.fail_on_probe_error);
        assert!(task.upstream.is_empty());
    }
}
