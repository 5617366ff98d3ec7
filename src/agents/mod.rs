//! Agent System
//!
//! Two fixed roles drive the intake pipelines:
//!
//! - **Intake role**: identifies the patient, fetches the discharge record,
//!   asks follow-up questions, and delegates clinical questions
//! - **Clinical role**: answers clinical questions grounded in the
//!   reference index, with web search as a fallback
//!
//! Role execution is a bounded reasoning loop over the role's tool set;
//! see [`executor`].

pub mod executor;
pub mod roles;

pub use executor::AgentExecutor;
pub use roles::{clinical_role, intake_role, RoleDefinition, RoleId};
