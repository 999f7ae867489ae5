//! Change kinds and their intent payloads.
//!
//! Every kind is bound at compile time to one workflow code, one consent
//! aggregation rule and one applier; the payload is a closed sum type that is
//! stored verbatim on the application.

use serde::{Deserialize, Serialize};

use super::consent::AggregationRule;
use super::domain::{CompanyId, HolderRef, UserId, VotingRightsMode};
use super::ratio::Ratio;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Registration,
    Rename,
    Deregistration,
    DomicileChange,
    BusinessScopeChange,
    CapitalChange,
    OfficerChange,
    ManagementChange,
    EquityTransfer,
}

impl ChangeKind {
    pub const fn ordered() -> [Self; 9] {
        [
            Self::Registration,
            Self::Rename,
            Self::Deregistration,
            Self::DomicileChange,
            Self::BusinessScopeChange,
            Self::CapitalChange,
            Self::OfficerChange,
            Self::ManagementChange,
            Self::EquityTransfer,
        ]
    }

    pub const fn workflow_code(self) -> &'static str {
        match self {
            Self::Registration => "company_registration",
            Self::Rename => "company_rename",
            Self::Deregistration => "company_deregistration",
            Self::DomicileChange => "company_domicile_change",
            Self::BusinessScopeChange => "company_business_scope_change",
            Self::CapitalChange => "company_capital_change",
            Self::OfficerChange => "company_officer_change",
            Self::ManagementChange => "company_management_change",
            Self::EquityTransfer => "company_equity_transfer",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Registration => "Company registration",
            Self::Rename => "Company rename",
            Self::Deregistration => "Company deregistration",
            Self::DomicileChange => "Domicile change",
            Self::BusinessScopeChange => "Business scope change",
            Self::CapitalChange => "Registered capital change",
            Self::OfficerChange => "Director and supervisor change",
            Self::ManagementChange => "Management change",
            Self::EquityTransfer => "Equity transfer",
        }
    }

    pub const fn rule(self) -> AggregationRule {
        match self {
            Self::Registration | Self::EquityTransfer => AggregationRule::Unanimous,
            Self::Rename
            | Self::Deregistration
            | Self::DomicileChange
            | Self::BusinessScopeChange
            | Self::CapitalChange => AggregationRule::VotingSupermajority,
            Self::OfficerChange => AggregationRule::VotingMajorityWithOfficers,
            Self::ManagementChange => AggregationRule::DirectorHeadcountWithManagers,
        }
    }
}

/// Intent payload, tagged by change kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ChangeIntent {
    Registration(LlcFormation),
    Rename(RenameIntent),
    Deregistration(DeregistrationIntent),
    DomicileChange(DomicileIntent),
    BusinessScopeChange(BusinessScopeIntent),
    CapitalChange(CapitalIntent),
    OfficerChange(OfficerIntent),
    ManagementChange(ManagementIntent),
    EquityTransfer(EquityTransferIntent),
}

impl ChangeIntent {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Registration(_) => ChangeKind::Registration,
            Self::Rename(_) => ChangeKind::Rename,
            Self::Deregistration(_) => ChangeKind::Deregistration,
            Self::DomicileChange(_) => ChangeKind::DomicileChange,
            Self::BusinessScopeChange(_) => ChangeKind::BusinessScopeChange,
            Self::CapitalChange(_) => ChangeKind::CapitalChange,
            Self::OfficerChange(_) => ChangeKind::OfficerChange,
            Self::ManagementChange(_) => ChangeKind::ManagementChange,
            Self::EquityTransfer(_) => ChangeKind::EquityTransfer,
        }
    }

    /// Trims and deduplicates identifier lists so seeding and appliers see
    /// the same canonical payload.
    pub fn normalized(self) -> Self {
        match self {
            Self::Registration(mut formation) => {
                formation.director_ids = dedup_ids(formation.director_ids);
                formation.supervisor_ids = dedup_ids(formation.supervisor_ids);
                formation.name = formation.name.trim().to_string();
                Self::Registration(formation)
            }
            Self::Rename(rename) => Self::Rename(RenameIntent {
                new_name: rename.new_name.trim().to_string(),
            }),
            Self::OfficerChange(officers) => Self::OfficerChange(OfficerIntent {
                director_ids: dedup_ids(officers.director_ids),
                supervisor_ids: dedup_ids(officers.supervisor_ids),
            }),
            Self::BusinessScopeChange(scope) => Self::BusinessScopeChange(BusinessScopeIntent {
                business_scope: scope.business_scope.trim().to_string(),
            }),
            other => other,
        }
    }

    /// Every person the payload names, for existence checks.
    pub fn referenced_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = Vec::new();
        let holders = |table: &[ShareholderIntent]| -> Vec<UserId> {
            table
                .iter()
                .filter_map(|shareholder| shareholder.holder.as_user())
                .collect()
        };
        match self {
            Self::Registration(formation) => {
                users.extend(holders(&formation.shareholders));
                users.extend(formation.director_ids.iter().cloned());
                users.extend(formation.supervisor_ids.iter().cloned());
                users.extend(
                    [
                        &formation.chairperson_id,
                        &formation.vice_chairperson_id,
                        &formation.manager_id,
                        &formation.deputy_manager_id,
                        &formation.financial_officer_id,
                        &formation.supervisor_chairperson_id,
                    ]
                    .into_iter()
                    .flatten()
                    .cloned(),
                );
                users.push(formation.legal_representative_id.clone());
            }
            Self::CapitalChange(capital) => users.extend(holders(&capital.shareholders)),
            Self::OfficerChange(officers) => {
                users.extend(officers.director_ids.iter().cloned());
                users.extend(officers.supervisor_ids.iter().cloned());
            }
            Self::ManagementChange(management) => users.extend(
                [
                    &management.manager_id,
                    &management.deputy_manager_id,
                    &management.financial_officer_id,
                ]
                .into_iter()
                .flatten()
                .cloned(),
            ),
            Self::EquityTransfer(transfer) => users.extend(
                [&transfer.transferor, &transfer.transferee]
                    .into_iter()
                    .filter_map(HolderRef::as_user),
            ),
            Self::Rename(_)
            | Self::Deregistration(_)
            | Self::DomicileChange(_)
            | Self::BusinessScopeChange(_) => {}
        }
        users.sort();
        users.dedup();
        users
    }

    /// Checks that need nothing beyond the payload itself.
    ///
    /// Registration payloads are checked by the formation guard instead.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        match self {
            Self::Registration(_) | Self::Deregistration(_) => Ok(()),
            Self::Rename(rename) => require("new_name", &rename.new_name),
            Self::DomicileChange(domicile) => require("domicile_address", &domicile.domicile_address),
            Self::BusinessScopeChange(scope) => require("business_scope", &scope.business_scope),
            Self::CapitalChange(capital) => capital.validate(),
            Self::OfficerChange(officers) => officers.validate(),
            Self::ManagementChange(management) => management.validate(),
            Self::EquityTransfer(transfer) => transfer.validate(),
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankField(field))
    } else {
        Ok(())
    }
}

pub(crate) fn dedup_ids(ids: Vec<UserId>) -> Vec<UserId> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        let trimmed = UserId(id.0.trim().to_string());
        if !trimmed.0.is_empty() && !seen.contains(&trimmed) {
            seen.push(trimmed);
        }
    }
    seen
}

/// One row of a proposed cap table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareholderIntent {
    #[serde(flatten)]
    pub holder: HolderRef,
    pub ratio: Ratio,
    #[serde(default)]
    pub voting_ratio: Option<Ratio>,
}

impl ShareholderIntent {
    /// Voting weight under the given mode; by-capital mirrors the capital ratio.
    pub fn effective_voting_ratio(&self, mode: VotingRightsMode) -> Ratio {
        match mode {
            VotingRightsMode::ByCapital => self.ratio,
            VotingRightsMode::Custom => self.voting_ratio.unwrap_or(Ratio::ZERO),
        }
    }
}

/// Validates a proposed cap table: non-empty, distinct holders, positive
/// ratios, and sums of exactly 100%.
pub(crate) fn validate_cap_table(
    shareholders: &[ShareholderIntent],
    mode: VotingRightsMode,
) -> Result<(), ValidationError> {
    if shareholders.is_empty() {
        return Err(ValidationError::NoShareholders);
    }

    let mut seen = Vec::with_capacity(shareholders.len());
    for shareholder in shareholders {
        if shareholder.holder.id.trim().is_empty() {
            return Err(ValidationError::BlankField("shareholder id"));
        }
        if seen.contains(&&shareholder.holder) {
            return Err(ValidationError::DuplicateShareholder(
                shareholder.holder.to_string(),
            ));
        }
        seen.push(&shareholder.holder);
        if shareholder.ratio.is_zero() {
            return Err(ValidationError::ZeroRatio(shareholder.holder.to_string()));
        }
        if mode == VotingRightsMode::Custom && shareholder.voting_ratio.is_none() {
            return Err(ValidationError::MissingVotingRatio(
                shareholder.holder.to_string(),
            ));
        }
    }

    let total: Ratio = shareholders.iter().map(|holder| holder.ratio).sum();
    if total != Ratio::WHOLE {
        return Err(ValidationError::RatioSum {
            field: "ratio",
            total,
        });
    }

    if mode == VotingRightsMode::Custom {
        let voting: Ratio = shareholders
            .iter()
            .map(|holder| holder.effective_voting_ratio(mode))
            .sum();
        if voting != Ratio::WHOLE {
            return Err(ValidationError::RatioSum {
                field: "voting_ratio",
                total: voting,
            });
        }
    }

    Ok(())
}

/// First-time LLC formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlcFormation {
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub registered_capital: i64,
    pub domicile_address: String,
    #[serde(default)]
    pub domicile_division_id: Option<String>,
    #[serde(default)]
    pub domicile_division_path: Option<String>,
    #[serde(default)]
    pub registration_authority_name: Option<String>,
    #[serde(default)]
    pub registration_authority_company_id: Option<CompanyId>,
    pub business_scope: String,
    #[serde(default)]
    pub operating_term_years: Option<u16>,
    #[serde(default)]
    pub voting_rights_mode: VotingRightsMode,
    pub shareholders: Vec<ShareholderIntent>,
    pub director_ids: Vec<UserId>,
    #[serde(default)]
    pub chairperson_id: Option<UserId>,
    #[serde(default)]
    pub vice_chairperson_id: Option<UserId>,
    #[serde(default)]
    pub manager_id: Option<UserId>,
    #[serde(default)]
    pub deputy_manager_id: Option<UserId>,
    #[serde(default)]
    pub financial_officer_id: Option<UserId>,
    #[serde(default)]
    pub supervisor_ids: Vec<UserId>,
    #[serde(default)]
    pub supervisor_chairperson_id: Option<UserId>,
    pub legal_representative_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameIntent {
    pub new_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregistrationIntent {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomicileIntent {
    pub domicile_address: String,
    #[serde(default)]
    pub domicile_division_id: Option<String>,
    #[serde(default)]
    pub domicile_division_path: Option<String>,
    #[serde(default)]
    pub registration_authority_name: Option<String>,
    #[serde(default)]
    pub registration_authority_company_id: Option<CompanyId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessScopeIntent {
    pub business_scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapitalChangeType {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapitalIntent {
    pub change_type: CapitalChangeType,
    pub old_registered_capital: i64,
    pub new_registered_capital: i64,
    #[serde(default)]
    pub voting_rights_mode: VotingRightsMode,
    #[serde(default)]
    pub shareholders: Vec<ShareholderIntent>,
}

impl CapitalIntent {
    fn validate(&self) -> Result<(), ValidationError> {
        for value in [self.old_registered_capital, self.new_registered_capital] {
            if value < 0 {
                return Err(ValidationError::NegativeCapital(value));
            }
        }
        let direction_holds = match self.change_type {
            CapitalChangeType::Increase => self.new_registered_capital > self.old_registered_capital,
            CapitalChangeType::Decrease => self.new_registered_capital < self.old_registered_capital,
        };
        if !direction_holds {
            return Err(ValidationError::CapitalDirection {
                change_type: self.change_type,
                old: self.old_registered_capital,
                new: self.new_registered_capital,
            });
        }
        if !self.shareholders.is_empty() {
            validate_cap_table(&self.shareholders, self.voting_rights_mode)?;
        }
        Ok(())
    }
}

/// Replacement director and supervisor rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficerIntent {
    pub director_ids: Vec<UserId>,
    #[serde(default)]
    pub supervisor_ids: Vec<UserId>,
}

impl OfficerIntent {
    fn validate(&self) -> Result<(), ValidationError> {
        check_director_count(self.director_ids.len())?;
        if let Some(overlap) = self
            .supervisor_ids
            .iter()
            .find(|supervisor| self.director_ids.contains(supervisor))
        {
            return Err(ValidationError::SupervisorOverlap(overlap.clone()));
        }
        Ok(())
    }
}

pub(crate) fn check_director_count(count: usize) -> Result<(), ValidationError> {
    if count == 1 || count >= 3 {
        Ok(())
    } else {
        Err(ValidationError::DirectorCount(count))
    }
}

/// Replacement manager-tier holders; an absent field clears that role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementIntent {
    #[serde(default)]
    pub manager_id: Option<UserId>,
    #[serde(default)]
    pub deputy_manager_id: Option<UserId>,
    #[serde(default)]
    pub financial_officer_id: Option<UserId>,
}

impl ManagementIntent {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.manager_id.is_none()
            && self.deputy_manager_id.is_none()
            && self.financial_officer_id.is_none()
        {
            return Err(ValidationError::NothingToChange);
        }
        if let (Some(manager), Some(deputy)) = (&self.manager_id, &self.deputy_manager_id) {
            if manager == deputy {
                return Err(ValidationError::DuplicateOfficer(manager.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityTransferIntent {
    pub transferor: HolderRef,
    pub transferee: HolderRef,
    pub ratio: Ratio,
    pub voting_ratio: Ratio,
}

impl EquityTransferIntent {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.transferor == self.transferee {
            return Err(ValidationError::SelfTransfer);
        }
        if self.ratio.is_zero() && self.voting_ratio.is_zero() {
            return Err(ValidationError::EmptyTransfer);
        }
        if self.transferee.id.trim().is_empty() {
            return Err(ValidationError::BlankField("transferee"));
        }
        Ok(())
    }
}

/// Malformed or inconsistent intent, caught before any write.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    BlankField(&'static str),
    #[error("at least one shareholder is required")]
    NoShareholders,
    #[error("shareholder {0} is listed more than once")]
    DuplicateShareholder(String),
    #[error("shareholder {0} must hold a positive ratio")]
    ZeroRatio(String),
    #[error("shareholder {0} needs a voting ratio under custom voting rights")]
    MissingVotingRatio(String),
    #[error("{field} values sum to {total}, expected 100%")]
    RatioSum { field: &'static str, total: Ratio },
    #[error("director count must be 1 or at least 3 (found {0})")]
    DirectorCount(usize),
    #[error("a chairperson is required when the board has more than one director")]
    ChairpersonRequired,
    #[error("chairperson {0} must be one of the directors")]
    ChairpersonNotDirector(UserId),
    #[error("legal representative {0} must be a director or the manager")]
    LegalRepresentativeIneligible(UserId),
    #[error("supervisor {0} may not also be a director, manager, deputy manager or financial officer")]
    SupervisorOverlap(UserId),
    #[error("{0} is named for more than one exclusive role")]
    DuplicateOfficer(UserId),
    #[error("registered capital must not be negative (found {0})")]
    NegativeCapital(i64),
    #[error("capital change {change_type:?} is inconsistent with {old} -> {new}")]
    CapitalDirection {
        change_type: CapitalChangeType,
        old: i64,
        new: i64,
    },
    #[error("declared old capital {declared} does not match registered capital {registered}")]
    StaleCapital { declared: i64, registered: u64 },
    #[error("the proposed name matches the current name")]
    UnchangedName,
    #[error("transferor and transferee must differ")]
    SelfTransfer,
    #[error("a transfer must move a positive ratio or voting ratio")]
    EmptyTransfer,
    #[error("the change does not alter anything")]
    NothingToChange,
    #[error("user {0} is unknown")]
    UnknownUser(UserId),
    #[error("division {0} could not be resolved")]
    UnknownDivision(String),
    #[error("expected a {expected:?} payload, found {found:?}")]
    KindMismatch {
        expected: ChangeKind,
        found: ChangeKind,
    },
    #[error("{0}")]
    InvalidPayload(String),
}
