use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ratio::Ratio;
use crate::workflows::engine::WorkflowInstanceId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Draft,
    UnderReview,
    Active,
    Suspended,
    Archived,
    Rejected,
}

impl CompanyStatus {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UnderReview => "under_review",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [
            Self::Draft,
            Self::UnderReview,
            Self::Active,
            Self::Suspended,
            Self::Archived,
            Self::Rejected,
        ]
        .into_iter()
        .find(|status| status.key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HolderKind {
    User,
    Company,
}

/// Identity of a shareholder; rows are always located by this, never by position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HolderRef {
    pub kind: HolderKind,
    pub id: String,
}

impl HolderRef {
    pub fn user(id: &UserId) -> Self {
        Self {
            kind: HolderKind::User,
            id: id.0.clone(),
        }
    }

    pub fn company(id: &CompanyId) -> Self {
        Self {
            kind: HolderKind::Company,
            id: id.0.clone(),
        }
    }

    pub fn as_user(&self) -> Option<UserId> {
        (self.kind == HolderKind::User).then(|| UserId(self.id.clone()))
    }

    pub fn as_company(&self) -> Option<CompanyId> {
        (self.kind == HolderKind::Company).then(|| CompanyId(self.id.clone()))
    }
}

impl fmt::Display for HolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            HolderKind::User => write!(f, "U:{}", self.id),
            HolderKind::Company => write!(f, "C:{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shareholder {
    #[serde(flatten)]
    pub holder: HolderRef,
    pub ratio: Ratio,
    pub voting_ratio: Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfficerRole {
    LegalRepresentative,
    Director,
    Chairperson,
    ViceChairperson,
    Manager,
    DeputyManager,
    Supervisor,
    SupervisorChairperson,
    FinancialOfficer,
}

impl OfficerRole {
    /// Roles that may have at most one holder at any time.
    pub const fn is_single_holder(self) -> bool {
        matches!(
            self,
            Self::LegalRepresentative
                | Self::Chairperson
                | Self::ViceChairperson
                | Self::Manager
                | Self::DeputyManager
                | Self::SupervisorChairperson
                | Self::FinancialOfficer
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    pub user_id: UserId,
    pub role: OfficerRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VotingRightsMode {
    #[default]
    ByCapital,
    Custom,
}

/// Registration sub-record of a limited liability company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlcRegistration {
    pub registered_capital: u64,
    pub domicile_address: String,
    pub domicile_division_id: Option<String>,
    pub domicile_division_path: Option<String>,
    pub registration_authority_name: Option<String>,
    pub registration_authority_company_id: Option<CompanyId>,
    pub business_scope: String,
    pub operating_term_years: Option<u16>,
    pub voting_rights_mode: VotingRightsMode,
    pub shareholders: Vec<Shareholder>,
    pub officers: Vec<Officer>,
}

impl LlcRegistration {
    pub fn shareholder(&self, holder: &HolderRef) -> Option<&Shareholder> {
        self.shareholders
            .iter()
            .find(|shareholder| &shareholder.holder == holder)
    }

    pub fn holders_of(&self, role: OfficerRole) -> Vec<UserId> {
        self.officers
            .iter()
            .filter(|officer| officer.role == role)
            .map(|officer| officer.user_id.clone())
            .collect()
    }

    pub fn holder_of(&self, role: OfficerRole) -> Option<UserId> {
        self.officers
            .iter()
            .find(|officer| officer.role == role)
            .map(|officer| officer.user_id.clone())
    }

    /// Drops every officer holding one of `roles`, then appends `incoming`.
    pub fn replace_officers(&mut self, roles: &[OfficerRole], incoming: Vec<Officer>) {
        self.officers.retain(|officer| !roles.contains(&officer.role));
        self.officers.extend(incoming);
    }

    pub fn total_ratio(&self) -> Ratio {
        self.shareholders.iter().map(|holder| holder.ratio).sum()
    }

    pub fn total_voting_ratio(&self) -> Ratio {
        self.shareholders
            .iter()
            .map(|holder| holder.voting_ratio)
            .sum()
    }

    /// Cap-table and roster invariants that must hold after every write.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.shareholders.is_empty() {
            if self.total_ratio() != Ratio::WHOLE {
                return Err(format!(
                    "shareholder ratios sum to {}, expected 100%",
                    self.total_ratio()
                ));
            }
            if self.total_voting_ratio() != Ratio::WHOLE {
                return Err(format!(
                    "shareholder voting ratios sum to {}, expected 100%",
                    self.total_voting_ratio()
                ));
            }
        }

        let mut seen_holders = BTreeSet::new();
        for shareholder in &self.shareholders {
            if !seen_holders.insert(&shareholder.holder) {
                return Err(format!("shareholder {} listed twice", shareholder.holder));
            }
        }

        let mut seen_single = BTreeSet::new();
        let mut seen_pairs = BTreeSet::new();
        for officer in &self.officers {
            if officer.role.is_single_holder() && !seen_single.insert(officer.role) {
                return Err(format!("role {:?} has more than one holder", officer.role));
            }
            if !seen_pairs.insert((officer.role, &officer.user_id)) {
                return Err(format!(
                    "{} holds role {:?} twice",
                    officer.user_id, officer.role
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub status: CompanyStatus,
    pub visibility: Visibility,
    pub category: Option<String>,
    pub legal_representative_id: Option<UserId>,
    pub registration: Option<LlcRegistration>,
    pub workflow_instance_id: Option<WorkflowInstanceId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn shareholders(&self) -> &[Shareholder] {
        self.registration
            .as_ref()
            .map(|registration| registration.shareholders.as_slice())
            .unwrap_or_default()
    }

    pub fn officers_with(&self, role: OfficerRole) -> Vec<UserId> {
        self.registration
            .as_ref()
            .map(|registration| registration.holders_of(role))
            .unwrap_or_default()
    }
}

/// Roles an actor presents; verified upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Applicant,
    Admin,
    RegistryAuthority,
    System,
}

impl ActorRole {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::Admin => "admin",
            Self::RegistryAuthority => "registry_authority",
            Self::System => "system",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [
            Self::Applicant,
            Self::Admin,
            Self::RegistryAuthority,
            Self::System,
        ]
        .into_iter()
        .find(|role| role.key() == key.trim())
    }
}

/// Whoever is acting, human or the registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: BTreeSet<ActorRole>,
}

impl Actor {
    pub fn user(id: &str, roles: &[ActorRole]) -> Self {
        Self {
            user_id: UserId(id.to_string()),
            roles: roles.iter().copied().collect(),
        }
    }

    pub fn system(id: &str) -> Self {
        Self::user(id, &[ActorRole::System])
    }

    pub fn has(&self, role: ActorRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_reviewer(&self) -> bool {
        self.has(ActorRole::Admin) || self.has(ActorRole::RegistryAuthority)
    }

    pub fn role_keys(&self) -> Vec<String> {
        self.roles.iter().map(|role| role.key().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    UnderReview,
    NeedsChanges,
    Approved,
    Rejected,
    Archived,
}

impl ApplicationStatus {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::NeedsChanges => "needs_changes",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [
            Self::Submitted,
            Self::UnderReview,
            Self::NeedsChanges,
            Self::Approved,
            Self::Rejected,
            Self::Archived,
        ]
        .into_iter()
        .find(|status| status.key() == key)
    }

    pub const fn is_open(self) -> bool {
        matches!(
            self,
            Self::Submitted | Self::UnderReview | Self::NeedsChanges
        )
    }
}

/// Decision state of one consent row, and the aggregate verdict of a ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Rejected,
}

impl ConsentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}
