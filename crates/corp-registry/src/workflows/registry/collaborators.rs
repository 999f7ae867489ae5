//! Black-box services the registry consults but does not own.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::domain::{CompanyId, UserId};

pub trait UserDirectory: Send + Sync {
    fn exists(&self, user_id: &UserId) -> bool;
    fn display_name(&self, user_id: &UserId) -> Option<String>;
}

/// Company name uniqueness.
pub trait NameRegistry: Send + Sync {
    /// Whether `name` is free, ignoring the company it already belongs to.
    fn is_available(&self, name: &str, excluding: Option<&CompanyId>) -> bool;
    /// Records `name` as belonging to `company_id`, releasing its previous name.
    fn claim(&self, name: &str, company_id: &CompanyId);
}

/// Administrative division and the registration authority that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDivision {
    pub path: String,
    pub authority_name: Option<String>,
    pub authority_company_id: Option<CompanyId>,
}

pub trait DivisionResolver: Send + Sync {
    fn resolve(&self, division_id: &str) -> Option<ResolvedDivision>;
}

/// The three collaborators a registry service is wired with.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub names: Arc<dyn NameRegistry>,
    pub divisions: Arc<dyn DivisionResolver>,
}

impl Collaborators {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        names: Arc<dyn NameRegistry>,
        divisions: Arc<dyn DivisionResolver>,
    ) -> Self {
        Self {
            users,
            names,
            divisions,
        }
    }

    /// In-memory collaborators that know the given users and nothing else.
    pub fn in_memory(users: impl IntoIterator<Item = (UserId, String)>) -> Self {
        Self::new(
            Arc::new(InMemoryUserDirectory::new(users)),
            Arc::new(InMemoryNameRegistry::default()),
            Arc::new(StaticDivisionResolver::default()),
        )
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: HashMap<UserId, String>,
}

impl InMemoryUserDirectory {
    pub fn new(users: impl IntoIterator<Item = (UserId, String)>) -> Self {
        Self {
            users: users.into_iter().collect(),
        }
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn exists(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    fn display_name(&self, user_id: &UserId) -> Option<String> {
        self.users.get(user_id).cloned()
    }
}

/// Case-insensitive name index.
#[derive(Debug, Default)]
pub struct InMemoryNameRegistry {
    names: RwLock<BTreeMap<String, CompanyId>>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl NameRegistry for InMemoryNameRegistry {
    fn is_available(&self, name: &str, excluding: Option<&CompanyId>) -> bool {
        let Ok(names) = self.names.read() else {
            return false;
        };
        match names.get(&normalize(name)) {
            None => true,
            Some(owner) => Some(owner) == excluding,
        }
    }

    fn claim(&self, name: &str, company_id: &CompanyId) {
        if let Ok(mut names) = self.names.write() {
            names.retain(|_, owner| owner != company_id);
            names.insert(normalize(name), company_id.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct StaticDivisionResolver {
    divisions: HashMap<String, ResolvedDivision>,
}

impl StaticDivisionResolver {
    pub fn new(divisions: impl IntoIterator<Item = (String, ResolvedDivision)>) -> Self {
        Self {
            divisions: divisions.into_iter().collect(),
        }
    }
}

impl DivisionResolver for StaticDivisionResolver {
    fn resolve(&self, division_id: &str) -> Option<ResolvedDivision> {
        self.divisions.get(division_id).cloned()
    }
}
