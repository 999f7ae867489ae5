use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::RegistryConfig;
use crate::workflows::registry::collaborators::{Collaborators, ResolvedDivision};
use crate::workflows::registry::consent::{ConsentItem, ConsentRequirement, ConsentRole};
use crate::workflows::registry::domain::{
    Actor, ActorRole, ApplicationId, Company, CompanyId, CompanyStatus, ConsentStatus, HolderRef,
    LlcRegistration, Officer, OfficerRole, Shareholder, UserId, Visibility, VotingRightsMode,
};
use crate::workflows::registry::intent::{LlcFormation, ShareholderIntent};
use crate::workflows::registry::memory::MemoryRegistryStore;
use crate::workflows::registry::ratio::Ratio;
use crate::workflows::registry::service::RegistryService;
use crate::workflows::registry::{InMemoryNameRegistry, InMemoryUserDirectory, StaticDivisionResolver};

pub(super) const COMPANY: &str = "co-acme";
pub(super) const PARENT: &str = "co-parent";

pub(super) fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

pub(super) fn percent(value: u32) -> Ratio {
    Ratio::from_basis_points(value * 100)
}

pub(super) fn applicant() -> Actor {
    Actor::user("u1", &[])
}

pub(super) fn reviewer() -> Actor {
    Actor::user("clerk", &[ActorRole::RegistryAuthority])
}

pub(super) fn known_users() -> Vec<(UserId, String)> {
    [
        "u1", "u2", "u3", "d1", "d2", "d3", "m1", "m2", "s1", "s2", "f1", "parent-legal",
    ]
    .into_iter()
    .map(|id| (user(id), format!("User {id}")))
    .collect()
}

pub(super) fn holding(holder: HolderRef, voting: u32) -> Shareholder {
    Shareholder {
        holder,
        ratio: percent(voting),
        voting_ratio: percent(voting),
    }
}

/// Active company owned by users `u1`, `u2`, ... with the given voting percentages.
pub(super) fn company_with(voting: &[u32]) -> Company {
    let shareholders = voting
        .iter()
        .enumerate()
        .map(|(index, share)| holding(HolderRef::user(&user(&format!("u{}", index + 1))), *share))
        .collect();
    company(COMPANY, shareholders)
}

pub(super) fn company(id: &str, shareholders: Vec<Shareholder>) -> Company {
    let now = Utc::now();
    Company {
        id: CompanyId(id.to_string()),
        name: format!("{id} LLC"),
        status: CompanyStatus::Active,
        visibility: Visibility::Public,
        category: Some("llc".to_string()),
        legal_representative_id: Some(user("d1")),
        registration: Some(LlcRegistration {
            registered_capital: 1_000_000,
            domicile_address: "1 Market Street".to_string(),
            domicile_division_id: None,
            domicile_division_path: None,
            registration_authority_name: None,
            registration_authority_company_id: None,
            business_scope: "Consulting".to_string(),
            operating_term_years: Some(30),
            voting_rights_mode: VotingRightsMode::ByCapital,
            shareholders,
            officers: vec![
                Officer {
                    user_id: user("d1"),
                    role: OfficerRole::LegalRepresentative,
                },
                Officer {
                    user_id: user("d1"),
                    role: OfficerRole::Director,
                },
                Officer {
                    user_id: user("m1"),
                    role: OfficerRole::Manager,
                },
                Officer {
                    user_id: user("s1"),
                    role: OfficerRole::Supervisor,
                },
            ],
        }),
        workflow_instance_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub(super) fn parent_company() -> Company {
    let mut parent = company(
        PARENT,
        vec![holding(HolderRef::user(&user("u3")), 100)],
    );
    parent.legal_representative_id = Some(user("parent-legal"));
    parent
}

pub(super) fn collaborators() -> Collaborators {
    Collaborators::new(
        Arc::new(InMemoryUserDirectory::new(known_users())),
        Arc::new(InMemoryNameRegistry::default()),
        Arc::new(StaticDivisionResolver::new([(
            "div-harbor".to_string(),
            ResolvedDivision {
                path: "Coastal / Harbor District".to_string(),
                authority_name: Some("Harbor Registry Office".to_string()),
                authority_company_id: None,
            },
        )])),
    )
}

pub(super) fn build_service(
    companies: Vec<Company>,
) -> (RegistryService<MemoryRegistryStore>, Arc<MemoryRegistryStore>) {
    build_service_with(companies, RegistryConfig::default())
}

pub(super) fn build_service_with(
    companies: Vec<Company>,
    config: RegistryConfig,
) -> (RegistryService<MemoryRegistryStore>, Arc<MemoryRegistryStore>) {
    let store = Arc::new(MemoryRegistryStore::with_companies(companies));
    let service = RegistryService::new(store.clone(), collaborators(), &config);
    (service, store)
}

pub(super) fn formation() -> LlcFormation {
    LlcFormation {
        name: "Harbor Lights LLC".to_string(),
        category: Some("llc".to_string()),
        registered_capital: 500_000,
        domicile_address: "1 Quay Street".to_string(),
        domicile_division_id: Some("div-harbor".to_string()),
        domicile_division_path: None,
        registration_authority_name: None,
        registration_authority_company_id: None,
        business_scope: "Marine supplies".to_string(),
        operating_term_years: Some(20),
        voting_rights_mode: VotingRightsMode::ByCapital,
        shareholders: vec![
            ShareholderIntent {
                holder: HolderRef::user(&user("u1")),
                ratio: percent(70),
                voting_ratio: None,
            },
            ShareholderIntent {
                holder: HolderRef::company(&CompanyId(PARENT.to_string())),
                ratio: percent(30),
                voting_ratio: None,
            },
        ],
        director_ids: vec![user("d1")],
        chairperson_id: None,
        vice_chairperson_id: None,
        manager_id: Some(user("m1")),
        deputy_manager_id: None,
        financial_officer_id: None,
        supervisor_ids: vec![user("s1")],
        supervisor_chairperson_id: None,
        legal_representative_id: user("d1"),
    }
}

/// Ledger row for aggregation tests; shareholder rows carry their holder cross-reference.
pub(super) fn item(
    required: &str,
    role: ConsentRole,
    holder: Option<HolderRef>,
    status: ConsentStatus,
) -> ConsentItem {
    let mut requirement = ConsentRequirement::new(user(required), role);
    if let Some(holder) = holder {
        requirement = requirement.for_holder(&holder);
    }
    ConsentItem {
        id: format!("ci-{required}-{role:?}"),
        application_id: ApplicationId("app-test".to_string()),
        requirement,
        status,
        decided_at: None,
        comment: None,
        created_at: Utc::now(),
    }
}

pub(super) fn shareholder_item(id: &str, status: ConsentStatus) -> ConsentItem {
    item(
        id,
        ConsentRole::ShareholderUser,
        Some(HolderRef::user(&user(id))),
        status,
    )
}

pub(super) async fn read_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json")
}

pub(super) fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
