use super::definition::WorkflowDefinition;
use super::instance::{WorkflowActionRecord, WorkflowInstance, WorkflowInstanceId};

/// Error enumeration for store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Engine tables, seen through an open unit of work.
pub trait WorkflowTx {
    /// Allocates a fresh identifier with the given prefix.
    fn allocate_id(&mut self, prefix: &str) -> String;

    fn definition(&self, code: &str) -> Result<Option<WorkflowDefinition>, RepositoryError>;
    fn put_definition(&mut self, definition: WorkflowDefinition) -> Result<(), RepositoryError>;

    fn instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, RepositoryError>;
    fn insert_instance(&mut self, instance: WorkflowInstance) -> Result<(), RepositoryError>;
    fn update_instance(&mut self, instance: WorkflowInstance) -> Result<(), RepositoryError>;

    fn append_action(&mut self, record: WorkflowActionRecord) -> Result<(), RepositoryError>;
    fn actions(
        &self,
        instance_id: &WorkflowInstanceId,
    ) -> Result<Vec<WorkflowActionRecord>, RepositoryError>;
}
