use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::consent::ConsentItem;
use super::domain::{
    ApplicationId, ApplicationStatus, Company, CompanyId, ConsentStatus, UserId,
};
use super::intent::{ChangeIntent, ChangeKind};
use crate::workflows::engine::{RepositoryError, WorkflowInstanceId, WorkflowTx};

/// Stored application, including its intent payload and both status tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub company_id: CompanyId,
    pub applicant_id: UserId,
    pub kind: ChangeKind,
    pub intent: ChangeIntent,
    pub status: ApplicationStatus,
    pub workflow_code: String,
    pub workflow_instance_id: WorkflowInstanceId,
    pub stage: String,
    pub consent_status: ConsentStatus,
    pub consent_completed_at: Option<DateTime<Utc>>,
    /// Company workflow binding displaced by this application, restored on withdrawal.
    pub previous_company_workflow: Option<WorkflowInstanceId>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl ApplicationRecord {
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            company_id: self.company_id.clone(),
            kind: self.kind,
            status: self.status.key(),
            stage: self.stage.clone(),
            consent_status: self.consent_status.label(),
            workflow_instance_id: self.workflow_instance_id.clone(),
            resolved_at: self.resolved_at,
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub company_id: CompanyId,
    pub kind: ChangeKind,
    pub status: &'static str,
    pub stage: String,
    pub consent_status: &'static str,
    pub workflow_instance_id: WorkflowInstanceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Immutable log line written after every state-changing registry operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub company_id: CompanyId,
    pub application_id: Option<ApplicationId>,
    pub actor_id: UserId,
    /// Directory name of the actor at the time of writing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_name: Option<String>,
    pub action_key: String,
    pub action_label: String,
    pub state: String,
    pub comment: Option<String>,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Registry tables, seen through an open unit of work.
pub trait RegistryTx: WorkflowTx {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    fn insert_company(&mut self, company: Company) -> Result<(), RepositoryError>;
    fn update_company(&mut self, company: Company) -> Result<(), RepositoryError>;

    fn application(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn insert_application(&mut self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn update_application(&mut self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    /// Applications still in flight for the given kind, across all companies.
    fn open_applications(&self, kind: ChangeKind) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    fn consent_items(&self, application_id: &ApplicationId) -> Result<Vec<ConsentItem>, RepositoryError>;
    fn insert_consent_item(&mut self, item: ConsentItem) -> Result<(), RepositoryError>;
    fn update_consent_item(&mut self, item: ConsentItem) -> Result<(), RepositoryError>;
    fn delete_consent_items(&mut self, application_id: &ApplicationId) -> Result<usize, RepositoryError>;

    fn append_audit(&mut self, record: AuditRecord) -> Result<(), RepositoryError>;
    fn audits(&self, company_id: &CompanyId) -> Result<Vec<AuditRecord>, RepositoryError>;
}

/// Transactional store. Writes made by `work` become visible only when it
/// returns `Ok`; an `Err` leaves every table as it was.
pub trait RegistryStore: Send + Sync {
    fn transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn RegistryTx) -> Result<R, E>,
        E: From<RepositoryError>;
}
