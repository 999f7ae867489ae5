use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::definition::{BusinessStatus, StateDefinition, TerminalOutcome};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    Completed,
    Cancelled,
}

impl From<TerminalOutcome> for InstanceStatus {
    fn from(outcome: TerminalOutcome) -> Self {
        match outcome {
            TerminalOutcome::Completed => InstanceStatus::Completed,
            TerminalOutcome::Cancelled => InstanceStatus::Cancelled,
        }
    }
}

/// Kind of entity an instance drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Company,
    Application,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    pub definition_code: String,
    pub definition_version: u32,
    pub target_type: TargetType,
    pub target_id: String,
    pub current_state: String,
    pub status: InstanceStatus,
    pub created_by: String,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl WorkflowInstance {
    pub fn is_active(&self) -> bool {
        self.status == InstanceStatus::Active
    }
}

/// Immutable audit line for one fired action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowActionRecord {
    pub id: String,
    pub instance_id: WorkflowInstanceId,
    pub action_key: String,
    pub action_label: String,
    pub from_state: String,
    pub to_state: String,
    pub actor_id: String,
    pub comment: Option<String>,
    pub payload: Value,
    pub performed_at: DateTime<Utc>,
}

/// Input to [`super::WorkflowEngine::create_instance`].
#[derive(Debug, Clone)]
pub struct NewInstance {
    pub definition_code: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub created_by: String,
    pub context: Value,
}

/// Input to [`super::WorkflowEngine::perform_action`].
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub instance_id: &'a WorkflowInstanceId,
    pub action_key: &'a str,
    pub actor_id: &'a str,
    pub actor_roles: &'a [String],
    pub comment: Option<&'a str>,
    pub payload: &'a Value,
}

/// The state an instance landed on, with the business deltas for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextState {
    pub key: String,
    pub label: String,
    pub terminal: Option<TerminalOutcome>,
    pub business: BusinessStatus,
}

impl From<&StateDefinition> for NextState {
    fn from(state: &StateDefinition) -> Self {
        Self {
            key: state.key.clone(),
            label: state.label.clone(),
            terminal: state.terminal,
            business: state.business.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub instance: WorkflowInstance,
    pub action: WorkflowActionRecord,
    pub next_state: NextState,
}
