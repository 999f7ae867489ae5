use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::consent::ConsentItem;
use super::domain::{ApplicationId, Company, CompanyId};
use super::intent::ChangeKind;
use super::repository::{ApplicationRecord, AuditRecord, RegistryStore, RegistryTx};
use crate::workflows::engine::{
    RepositoryError, WorkflowActionRecord, WorkflowDefinition, WorkflowInstance,
    WorkflowInstanceId, WorkflowTx,
};

#[derive(Debug, Default, Clone)]
struct Tables {
    sequences: HashMap<String, u64>,
    definitions: HashMap<String, WorkflowDefinition>,
    instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    actions: Vec<WorkflowActionRecord>,
    companies: BTreeMap<CompanyId, Company>,
    applications: BTreeMap<ApplicationId, ApplicationRecord>,
    consent_items: Vec<ConsentItem>,
    audits: Vec<AuditRecord>,
}

/// In-memory store. A transaction works on a copy of every table and swaps
/// it in on success, so writers are serialized and failures leave no trace.
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    tables: Mutex<Tables>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with existing companies.
    pub fn with_companies(companies: impl IntoIterator<Item = Company>) -> Self {
        let tables = Tables {
            companies: companies
                .into_iter()
                .map(|company| (company.id.clone(), company))
                .collect(),
            ..Tables::default()
        };
        Self {
            tables: Mutex::new(tables),
        }
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn transaction<R, E, F>(&self, work: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn RegistryTx) -> Result<R, E>,
        E: From<RepositoryError>,
    {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("registry store lock poisoned".into()))?;
        let mut working = guard.clone();
        let result = work(&mut working)?;
        *guard = working;
        Ok(result)
    }
}

impl WorkflowTx for Tables {
    fn allocate_id(&mut self, prefix: &str) -> String {
        let next = self.sequences.entry(prefix.to_string()).or_insert(0);
        *next += 1;
        format!("{prefix}-{:06}", *next)
    }

    fn definition(&self, code: &str) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.get(code).cloned())
    }

    fn put_definition(&mut self, definition: WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.insert(definition.code.clone(), definition);
        Ok(())
    }

    fn instance(
        &self,
        id: &WorkflowInstanceId,
    ) -> Result<Option<WorkflowInstance>, RepositoryError> {
        Ok(self.instances.get(id).cloned())
    }

    fn insert_instance(&mut self, instance: WorkflowInstance) -> Result<(), RepositoryError> {
        if self.instances.contains_key(&instance.id) {
            return Err(RepositoryError::Conflict);
        }
        self.instances.insert(instance.id.clone(), instance);
        Ok(())
    }

    fn update_instance(&mut self, instance: WorkflowInstance) -> Result<(), RepositoryError> {
        let slot = self
            .instances
            .get_mut(&instance.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = instance;
        Ok(())
    }

    fn append_action(&mut self, record: WorkflowActionRecord) -> Result<(), RepositoryError> {
        self.actions.push(record);
        Ok(())
    }

    fn actions(
        &self,
        instance_id: &WorkflowInstanceId,
    ) -> Result<Vec<WorkflowActionRecord>, RepositoryError> {
        Ok(self
            .actions
            .iter()
            .filter(|record| &record.instance_id == instance_id)
            .cloned()
            .collect())
    }
}

impl RegistryTx for Tables {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        Ok(self.companies.get(id).cloned())
    }

    fn insert_company(&mut self, company: Company) -> Result<(), RepositoryError> {
        if self.companies.contains_key(&company.id) {
            return Err(RepositoryError::Conflict);
        }
        self.companies.insert(company.id.clone(), company);
        Ok(())
    }

    fn update_company(&mut self, company: Company) -> Result<(), RepositoryError> {
        let slot = self
            .companies
            .get_mut(&company.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = company;
        Ok(())
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.applications.get(id).cloned())
    }

    fn insert_application(&mut self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        if self.applications.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        self.applications.insert(record.id.clone(), record);
        Ok(())
    }

    fn update_application(&mut self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let slot = self
            .applications
            .get_mut(&record.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = record;
        Ok(())
    }

    fn open_applications(&self, kind: ChangeKind) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self
            .applications
            .values()
            .filter(|record| record.kind == kind && record.is_open())
            .cloned()
            .collect())
    }

    fn consent_items(&self, application_id: &ApplicationId) -> Result<Vec<ConsentItem>, RepositoryError> {
        Ok(self
            .consent_items
            .iter()
            .filter(|item| &item.application_id == application_id)
            .cloned()
            .collect())
    }

    fn insert_consent_item(&mut self, item: ConsentItem) -> Result<(), RepositoryError> {
        let duplicate = self.consent_items.iter().any(|existing| {
            existing.id == item.id
                || (existing.application_id == item.application_id
                    && existing.requirement == item.requirement)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        self.consent_items.push(item);
        Ok(())
    }

    fn update_consent_item(&mut self, item: ConsentItem) -> Result<(), RepositoryError> {
        let slot = self
            .consent_items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = item;
        Ok(())
    }

    fn delete_consent_items(&mut self, application_id: &ApplicationId) -> Result<usize, RepositoryError> {
        let before = self.consent_items.len();
        self.consent_items
            .retain(|item| &item.application_id != application_id);
        Ok(before - self.consent_items.len())
    }

    fn append_audit(&mut self, record: AuditRecord) -> Result<(), RepositoryError> {
        self.audits.push(record);
        Ok(())
    }

    fn audits(&self, company_id: &CompanyId) -> Result<Vec<AuditRecord>, RepositoryError> {
        Ok(self
            .audits
            .iter()
            .filter(|record| &record.company_id == company_id)
            .cloned()
            .collect())
    }
}
