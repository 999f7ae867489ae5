use super::intent::ChangeKind;
use crate::workflows::engine::{
    ActionDefinition, BusinessStatus, StateDefinition, TerminalOutcome, WorkflowDefinition,
};

pub const SUBMITTED: &str = "submitted";
pub const UNDER_REVIEW: &str = "under_review";
pub const NEEDS_CHANGES: &str = "needs_changes";
pub const APPROVED: &str = "approved";
pub const REJECTED: &str = "rejected";

pub const ROUTE_TO_REVIEW: &str = "route_to_review";
pub const APPROVE: &str = "approve";
pub const REJECT: &str = "reject";
pub const REQUEST_CHANGES: &str = "request_changes";
pub const RESUBMIT: &str = "resubmit";

const REVIEWERS: &[&str] = &["registry_authority", "admin"];
const ROUTERS: &[&str] = &["registry_authority", "admin", "system"];
const APPLICANTS: &[&str] = &["applicant"];

const DEFINITION_VERSION: u32 = 1;

/// Approval graphs for every change kind, keyed by workflow code.
#[derive(Debug)]
pub struct RegistryBlueprint {
    definitions: Vec<(ChangeKind, WorkflowDefinition)>,
}

impl RegistryBlueprint {
    pub fn standard() -> Self {
        Self {
            definitions: ChangeKind::ordered()
                .into_iter()
                .map(|kind| (kind, standard_definition(kind)))
                .collect(),
        }
    }

    pub fn definition(&self, kind: ChangeKind) -> Option<&WorkflowDefinition> {
        self.definitions
            .iter()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, definition)| definition)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &WorkflowDefinition> {
        self.definitions.iter().map(|(_, definition)| definition)
    }
}

/// Company status each state implies for the kinds that move the company itself.
fn company_status(kind: ChangeKind, state: &str) -> Option<&'static str> {
    match (kind, state) {
        (ChangeKind::Registration, SUBMITTED | UNDER_REVIEW | NEEDS_CHANGES) => {
            Some("under_review")
        }
        (ChangeKind::Registration, APPROVED) => Some("active"),
        (ChangeKind::Registration, REJECTED) => Some("rejected"),
        (ChangeKind::Deregistration, APPROVED) => Some("archived"),
        _ => None,
    }
}

fn state(kind: ChangeKind, key: &str, label: &str) -> StateDefinition {
    let mut business = BusinessStatus::application(key);
    if let Some(status) = company_status(kind, key) {
        business = business.with_company(status);
    }
    StateDefinition::new(key, label).business(business)
}

pub fn standard_definition(kind: ChangeKind) -> WorkflowDefinition {
    WorkflowDefinition {
        code: kind.workflow_code().to_string(),
        version: DEFINITION_VERSION,
        name: kind.label().to_string(),
        initial_state: SUBMITTED.to_string(),
        states: vec![
            state(kind, SUBMITTED, "Submitted"),
            state(kind, UNDER_REVIEW, "Under review"),
            state(kind, NEEDS_CHANGES, "Needs changes"),
            state(kind, APPROVED, "Approved").terminal(TerminalOutcome::Completed),
            state(kind, REJECTED, "Rejected").terminal(TerminalOutcome::Completed),
        ],
        actions: vec![
            ActionDefinition::new(ROUTE_TO_REVIEW, "Route to review", UNDER_REVIEW)
                .from_states(&[SUBMITTED])
                .roles(ROUTERS),
            ActionDefinition::new(APPROVE, "Approve", APPROVED)
                .from_states(&[SUBMITTED, UNDER_REVIEW])
                .roles(REVIEWERS),
            ActionDefinition::new(REJECT, "Reject", REJECTED)
                .from_states(&[SUBMITTED, UNDER_REVIEW, NEEDS_CHANGES])
                .roles(REVIEWERS),
            ActionDefinition::new(REQUEST_CHANGES, "Request changes", NEEDS_CHANGES)
                .from_states(&[UNDER_REVIEW])
                .roles(REVIEWERS),
            ActionDefinition::new(RESUBMIT, "Resubmit", SUBMITTED)
                .from_states(&[NEEDS_CHANGES])
                .roles(APPLICANTS),
        ],
    }
}

/// Actions that may only fire once consent is approved.
pub fn requires_consent(action_key: &str) -> bool {
    matches!(action_key, ROUTE_TO_REVIEW | APPROVE)
}
