use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

/// How an instance ends once it lands on a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Completed,
    Cancelled,
}

/// Semantic deltas a caller applies when an instance enters a state.
///
/// The engine treats both fields as opaque keys; the registry maps them onto
/// its own company and application status enums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_status: Option<String>,
}

impl BusinessStatus {
    pub fn application(status: &str) -> Self {
        Self {
            company_status: None,
            application_status: Some(status.to_string()),
        }
    }

    pub fn with_company(mut self, status: &str) -> Self {
        self.company_status = Some(status.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDefinition {
    pub key: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<TerminalOutcome>,
    #[serde(default)]
    pub business: BusinessStatus,
}

impl StateDefinition {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            terminal: None,
            business: BusinessStatus::default(),
        }
    }

    pub fn terminal(mut self, outcome: TerminalOutcome) -> Self {
        self.terminal = Some(outcome);
        self
    }

    pub fn business(mut self, business: BusinessStatus) -> Self {
        self.business = business;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub key: String,
    pub label: String,
    pub from: Vec<String>,
    pub to: String,
    pub roles: Vec<String>,
}

impl ActionDefinition {
    pub fn new(key: &str, label: &str, to: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            from: Vec::new(),
            to: to.to_string(),
            roles: Vec::new(),
        }
    }

    pub fn from_states(mut self, states: &[&str]) -> Self {
        self.from = states.iter().map(|state| state.to_string()).collect();
        self
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|role| role.to_string()).collect();
        self
    }

    pub fn allows_from(&self, state: &str) -> bool {
        self.from.iter().any(|source| source == state)
    }

    pub fn permits(&self, actor_roles: &[String]) -> bool {
        self.roles
            .iter()
            .any(|required| actor_roles.iter().any(|held| held == required))
    }
}

/// A named, versioned state graph. Pure data: nothing in here knows which
/// entity an instance is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub code: String,
    pub version: u32,
    pub name: String,
    pub initial_state: String,
    pub states: Vec<StateDefinition>,
    pub actions: Vec<ActionDefinition>,
}

impl WorkflowDefinition {
    pub fn state(&self, key: &str) -> Option<&StateDefinition> {
        self.states.iter().find(|state| state.key == key)
    }

    pub fn action(&self, key: &str) -> Option<&ActionDefinition> {
        self.actions.iter().find(|action| action.key == key)
    }

    pub fn actions_from<'a>(
        &'a self,
        state: &'a str,
    ) -> impl Iterator<Item = &'a ActionDefinition> + 'a {
        self.actions
            .iter()
            .filter(move |action| action.allows_from(state))
    }

    /// Structural checks run before a definition is stored.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.code.trim().is_empty() {
            return Err(DefinitionError::EmptyCode);
        }

        let mut state_keys = BTreeSet::new();
        for state in &self.states {
            if !state_keys.insert(state.key.as_str()) {
                return Err(DefinitionError::DuplicateState(state.key.clone()));
            }
        }

        if !state_keys.contains(self.initial_state.as_str()) {
            return Err(DefinitionError::UnknownInitialState(
                self.initial_state.clone(),
            ));
        }

        let mut action_keys = BTreeSet::new();
        let mut edges: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for action in &self.actions {
            if !action_keys.insert(action.key.as_str()) {
                return Err(DefinitionError::DuplicateAction(action.key.clone()));
            }
            if action.roles.is_empty() {
                return Err(DefinitionError::ActionWithoutRoles(action.key.clone()));
            }
            if action.from.is_empty() {
                return Err(DefinitionError::ActionWithoutSource(action.key.clone()));
            }
            if !state_keys.contains(action.to.as_str()) {
                return Err(DefinitionError::UnknownState {
                    action: action.key.clone(),
                    state: action.to.clone(),
                });
            }
            for source in &action.from {
                let Some(state) = self.state(source) else {
                    return Err(DefinitionError::UnknownState {
                        action: action.key.clone(),
                        state: source.clone(),
                    });
                };
                if state.terminal.is_some() {
                    return Err(DefinitionError::TerminalHasExit {
                        state: source.clone(),
                        action: action.key.clone(),
                    });
                }
                edges
                    .entry(source.as_str())
                    .or_default()
                    .push(action.to.as_str());
            }
        }

        let mut reached = BTreeSet::new();
        let mut queue = VecDeque::from([self.initial_state.as_str()]);
        while let Some(state) = queue.pop_front() {
            if !reached.insert(state) {
                continue;
            }
            if let Some(targets) = edges.get(state) {
                queue.extend(targets.iter().copied());
            }
        }

        if let Some(orphan) = self
            .states
            .iter()
            .find(|state| !reached.contains(state.key.as_str()))
        {
            return Err(DefinitionError::Unreachable(orphan.key.clone()));
        }

        if !self.states.iter().any(|state| state.terminal.is_some()) {
            return Err(DefinitionError::NoTerminalState);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("workflow definition code must not be blank")]
    EmptyCode,
    #[error("state {0} declared more than once")]
    DuplicateState(String),
    #[error("action {0} declared more than once")]
    DuplicateAction(String),
    #[error("initial state {0} is not declared")]
    UnknownInitialState(String),
    #[error("action {action} references undeclared state {state}")]
    UnknownState { action: String, state: String },
    #[error("action {0} does not name any allowed role")]
    ActionWithoutRoles(String),
    #[error("action {0} does not name any source state")]
    ActionWithoutSource(String),
    #[error("terminal state {state} has outgoing action {action}")]
    TerminalHasExit { state: String, action: String },
    #[error("state {0} is unreachable from the initial state")]
    Unreachable(String),
    #[error("definition has no terminal state")]
    NoTerminalState,
}
