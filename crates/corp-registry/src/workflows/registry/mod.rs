//! Corporate registry: change applications for limited liability companies.
//!
//! An application carries a typed intent, collects consent from the
//! stakeholders that intent affects, moves through an approval workflow and,
//! once approved, is written onto the company by the applier for its kind.

pub mod appliers;
pub mod blueprint;
pub mod collaborators;
pub mod consent;
pub mod domain;
pub mod formation;
pub mod intent;
pub mod memory;
pub mod ratio;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use appliers::ApplierError;
pub use blueprint::RegistryBlueprint;
pub use collaborators::{
    Collaborators, DivisionResolver, InMemoryNameRegistry, InMemoryUserDirectory, NameRegistry,
    ResolvedDivision, StaticDivisionResolver, UserDirectory,
};
pub use consent::{
    AggregationRule, ConsentError, ConsentItem, ConsentLedger, ConsentRequirement, ConsentRole,
    ConsentSummary,
};
pub use domain::{
    Actor, ActorRole, ApplicationId, ApplicationStatus, Company, CompanyId, CompanyStatus,
    ConsentStatus, HolderKind, HolderRef, LlcRegistration, Officer, OfficerRole, Shareholder,
    UserId, Visibility, VotingRightsMode,
};
pub use intent::{
    BusinessScopeIntent, CapitalChangeType, CapitalIntent, ChangeIntent, ChangeKind,
    DeregistrationIntent, DomicileIntent, EquityTransferIntent, LlcFormation, ManagementIntent,
    OfficerIntent, RenameIntent, ShareholderIntent, ValidationError,
};
pub use memory::MemoryRegistryStore;
pub use ratio::{Ratio, RatioError};
pub use repository::{
    ApplicationRecord, ApplicationStatusView, AuditRecord, RegistryStore, RegistryTx,
};
pub use router::registry_router;
pub use service::{
    ActionCommand, ActionOutcome, ConsentDecision, ConsentOutcome, ConsentView, RegistryError,
    RegistryService, SubmitRequest,
};
