//! Consent ledger: who must decide on an application, what they decided, and
//! how the decisions add up under each change kind's rule.

mod aggregation;
mod ledger;
mod seeding;

pub use aggregation::{aggregate, AggregationRule};
pub use ledger::{ConsentLedger, ConsentSummary};
pub use seeding::plan_requirements;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, CompanyId, ConsentStatus, HolderRef, UserId};
use crate::workflows::engine::RepositoryError;

/// Capacity in which a stakeholder is asked to consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentRole {
    LegalRepresentative,
    ShareholderUser,
    ShareholderCompanyLegal,
    Director,
    Chairperson,
    Manager,
    DeputyManager,
    FinancialOfficer,
    Supervisor,
    TransferorUser,
    TransferorCompanyLegal,
    TransfereeUser,
    TransfereeCompanyLegal,
}

impl ConsentRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::LegalRepresentative => "Legal representative",
            Self::ShareholderUser => "Shareholder",
            Self::ShareholderCompanyLegal => "Shareholder company legal representative",
            Self::Director => "Director",
            Self::Chairperson => "Chairperson",
            Self::Manager => "Manager",
            Self::DeputyManager => "Deputy manager",
            Self::FinancialOfficer => "Financial officer",
            Self::Supervisor => "Supervisor",
            Self::TransferorUser => "Transferor",
            Self::TransferorCompanyLegal => "Transferor company legal representative",
            Self::TransfereeUser => "Transferee",
            Self::TransfereeCompanyLegal => "Transferee company legal representative",
        }
    }
}

/// Natural key of a consent row; seeding never inserts the same key twice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConsentRequirement {
    pub required_user_id: UserId,
    pub role: ConsentRole,
    pub shareholder_company_id: Option<CompanyId>,
    pub shareholder_user_id: Option<UserId>,
}

impl ConsentRequirement {
    pub fn new(required_user_id: UserId, role: ConsentRole) -> Self {
        Self {
            required_user_id,
            role,
            shareholder_company_id: None,
            shareholder_user_id: None,
        }
    }

    /// Cross-references the cap-table row this requirement speaks for.
    pub fn for_holder(mut self, holder: &HolderRef) -> Self {
        self.shareholder_user_id = holder.as_user();
        self.shareholder_company_id = holder.as_company();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentItem {
    pub id: String,
    pub application_id: ApplicationId,
    #[serde(flatten)]
    pub requirement: ConsentRequirement,
    pub status: ConsentStatus,
    pub decided_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConsentItem {
    /// Shareholder identity this row carries weight for, if any.
    pub fn holder(&self) -> Option<HolderRef> {
        let requirement = &self.requirement;
        match (
            &requirement.shareholder_user_id,
            &requirement.shareholder_company_id,
        ) {
            (Some(user), _) => Some(HolderRef::user(user)),
            (None, Some(company)) => Some(HolderRef::company(company)),
            (None, None) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConsentStatus::Pending
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("no pending consent items for user {user} on application {application}")]
    NoPendingItems {
        application: ApplicationId,
        user: UserId,
    },
    #[error("shareholder company {0} does not exist")]
    UnknownCompany(CompanyId),
    #[error("company {0} has no legal representative to consent on its behalf")]
    MissingLegalRepresentative(CompanyId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
