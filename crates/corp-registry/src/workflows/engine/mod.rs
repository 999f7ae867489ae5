//! Generic, data-driven workflow state machine.
//!
//! Definitions are plain values; the engine validates and stores them, binds
//! instances to targets, and fires one role-gated action at a time. It knows
//! nothing about companies or applications beyond the opaque business keys a
//! definition attaches to its states.

mod definition;
mod instance;
mod store;

pub use definition::{
    ActionDefinition, BusinessStatus, DefinitionError, StateDefinition, TerminalOutcome,
    WorkflowDefinition,
};
pub use instance::{
    ActionRequest, InstanceStatus, NewInstance, NextState, TargetType, Transition,
    WorkflowActionRecord, WorkflowInstance, WorkflowInstanceId,
};
pub use store::{RepositoryError, WorkflowTx};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

pub const CANCEL_ACTION_KEY: &str = "cancel";

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow definition {0} not found")]
    DefinitionNotFound(String),
    #[error("workflow definition {code} is invalid: {source}")]
    InvalidDefinition {
        code: String,
        #[source]
        source: DefinitionError,
    },
    #[error("workflow instance {0} not found")]
    InstanceNotFound(String),
    #[error("workflow instance {0} is no longer active")]
    InstanceInactive(String),
    #[error("invalid transition: action {action} is not available from state {state}")]
    InvalidTransition { action: String, state: String },
    #[error("actor {actor} lacks a role permitted to perform {action}")]
    Forbidden { action: String, actor: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    /// Idempotent upsert by code. A stored definition with the same code and
    /// version is left untouched; anything else replaces it.
    pub fn ensure_definition<T>(
        &self,
        tx: &mut T,
        definition: &WorkflowDefinition,
    ) -> Result<(), WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        definition
            .validate()
            .map_err(|source| WorkflowError::InvalidDefinition {
                code: definition.code.clone(),
                source,
            })?;

        match tx.definition(&definition.code)? {
            Some(stored) if stored == *definition => Ok(()),
            Some(stored) if stored.version > definition.version => Ok(()),
            _ => {
                debug!(code = %definition.code, version = definition.version, "storing workflow definition");
                tx.put_definition(definition.clone())?;
                Ok(())
            }
        }
    }

    pub fn create_instance<T>(
        &self,
        tx: &mut T,
        request: NewInstance,
    ) -> Result<WorkflowInstance, WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        let definition = tx
            .definition(&request.definition_code)?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(request.definition_code.clone()))?;

        let now = Utc::now();
        let instance = WorkflowInstance {
            id: WorkflowInstanceId(tx.allocate_id("wf")),
            definition_code: definition.code.clone(),
            definition_version: definition.version,
            target_type: request.target_type,
            target_id: request.target_id,
            current_state: definition.initial_state.clone(),
            status: InstanceStatus::Active,
            created_by: request.created_by,
            context: request.context,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        tx.insert_instance(instance.clone())?;
        Ok(instance)
    }

    /// Fires one action. The instance update and its audit line are written
    /// through the same unit of work.
    pub fn perform_action<T>(
        &self,
        tx: &mut T,
        request: ActionRequest<'_>,
    ) -> Result<Transition, WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        let mut instance = tx
            .instance(request.instance_id)?
            .ok_or_else(|| WorkflowError::InstanceNotFound(request.instance_id.0.clone()))?;
        if !instance.is_active() {
            return Err(WorkflowError::InstanceInactive(instance.id.0.clone()));
        }

        let definition = tx
            .definition(&instance.definition_code)?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(instance.definition_code.clone()))?;

        let action = definition
            .action(request.action_key)
            .filter(|action| action.allows_from(&instance.current_state))
            .ok_or_else(|| WorkflowError::InvalidTransition {
                action: request.action_key.to_string(),
                state: instance.current_state.clone(),
            })?;

        if !action.permits(request.actor_roles) {
            return Err(WorkflowError::Forbidden {
                action: action.key.clone(),
                actor: request.actor_id.to_string(),
            });
        }

        let target = definition
            .state(&action.to)
            .ok_or_else(|| WorkflowError::InvalidDefinition {
                code: definition.code.clone(),
                source: DefinitionError::UnknownState {
                    action: action.key.clone(),
                    state: action.to.clone(),
                },
            })?;

        let now = Utc::now();
        let from_state = std::mem::replace(&mut instance.current_state, target.key.clone());
        instance.updated_at = now;
        if let Some(outcome) = target.terminal {
            instance.status = InstanceStatus::from(outcome);
            instance.closed_at = Some(now);
        }

        let record = WorkflowActionRecord {
            id: tx.allocate_id("act"),
            instance_id: instance.id.clone(),
            action_key: action.key.clone(),
            action_label: action.label.clone(),
            from_state,
            to_state: target.key.clone(),
            actor_id: request.actor_id.to_string(),
            comment: request.comment.map(str::to_string),
            payload: request.payload.clone(),
            performed_at: now,
        };

        tx.update_instance(instance.clone())?;
        tx.append_action(record.clone())?;

        debug!(
            instance = %instance.id.0,
            action = %record.action_key,
            from = %record.from_state,
            to = %record.to_state,
            "workflow transition"
        );

        Ok(Transition {
            instance,
            action: record,
            next_state: NextState::from(target),
        })
    }

    /// Stops an active instance without moving it, leaving an audit line.
    pub fn cancel_instance<T>(
        &self,
        tx: &mut T,
        instance_id: &WorkflowInstanceId,
        actor_id: &str,
        comment: Option<&str>,
    ) -> Result<WorkflowInstance, WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        let mut instance = tx
            .instance(instance_id)?
            .ok_or_else(|| WorkflowError::InstanceNotFound(instance_id.0.clone()))?;
        if !instance.is_active() {
            return Err(WorkflowError::InstanceInactive(instance.id.0.clone()));
        }

        let now = Utc::now();
        instance.status = InstanceStatus::Cancelled;
        instance.updated_at = now;
        instance.closed_at = Some(now);

        let record = WorkflowActionRecord {
            id: tx.allocate_id("act"),
            instance_id: instance.id.clone(),
            action_key: CANCEL_ACTION_KEY.to_string(),
            action_label: "Cancelled".to_string(),
            from_state: instance.current_state.clone(),
            to_state: instance.current_state.clone(),
            actor_id: actor_id.to_string(),
            comment: comment.map(str::to_string),
            payload: Value::Null,
            performed_at: now,
        };

        tx.update_instance(instance.clone())?;
        tx.append_action(record)?;
        Ok(instance)
    }

    /// Actions the given roles could fire from the instance's current state.
    pub fn available_actions<T>(
        &self,
        tx: &T,
        instance_id: &WorkflowInstanceId,
        actor_roles: &[String],
    ) -> Result<Vec<ActionDefinition>, WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        let instance = tx
            .instance(instance_id)?
            .ok_or_else(|| WorkflowError::InstanceNotFound(instance_id.0.clone()))?;
        if !instance.is_active() {
            return Ok(Vec::new());
        }
        let definition = tx
            .definition(&instance.definition_code)?
            .ok_or_else(|| WorkflowError::DefinitionNotFound(instance.definition_code.clone()))?;

        Ok(definition
            .actions_from(&instance.current_state)
            .filter(|action| action.permits(actor_roles))
            .cloned()
            .collect())
    }

    pub fn history<T>(
        &self,
        tx: &T,
        instance_id: &WorkflowInstanceId,
    ) -> Result<Vec<WorkflowActionRecord>, WorkflowError>
    where
        T: WorkflowTx + ?Sized,
    {
        if tx.instance(instance_id)?.is_none() {
            return Err(WorkflowError::InstanceNotFound(instance_id.0.clone()));
        }
        Ok(tx.actions(instance_id)?)
    }
}
