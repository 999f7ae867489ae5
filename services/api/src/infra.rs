use chrono::Utc;
use corp_registry::config::RegistryConfig;
use corp_registry::workflows::registry::{
    Collaborators, Company, CompanyId, CompanyStatus, HolderRef, InMemoryNameRegistry,
    InMemoryUserDirectory, LlcRegistration, MemoryRegistryStore, NameRegistry, Officer,
    OfficerRole, Ratio, RegistryService, ResolvedDivision, Shareholder, StaticDivisionResolver,
    UserId, Visibility, VotingRightsMode,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type Registry = RegistryService<MemoryRegistryStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) const SAMPLE_COMPANY: &str = "co-sample";

const SAMPLE_USERS: &[(&str, &str)] = &[
    ("alice", "Alice Moreau"),
    ("bruno", "Bruno Ekwueme"),
    ("chen", "Chen Wei"),
    ("dana", "Dana Kowalski"),
    ("emil", "Emil Sørensen"),
    ("farah", "Farah Haddad"),
    ("gus", "Gus Lindqvist"),
];

fn user(id: &str) -> UserId {
    UserId(id.to_string())
}

fn percent(value: u32) -> Ratio {
    Ratio::from_basis_points(value * 100)
}

/// Collaborators backed by a fixed roster, one resolvable division, and a
/// name registry that already knows the sample company.
pub(crate) fn sample_collaborators() -> Collaborators {
    let users = SAMPLE_USERS
        .iter()
        .map(|(id, name)| (user(id), (*name).to_string()));
    let names = InMemoryNameRegistry::default();
    names.claim("Harborview Trading LLC", &CompanyId(SAMPLE_COMPANY.to_string()));
    let divisions = StaticDivisionResolver::new([(
        "div-harbor".to_string(),
        ResolvedDivision {
            path: "Coastal Province / Harbor District".to_string(),
            authority_name: Some("Harbor District Registry".to_string()),
            authority_company_id: None,
        },
    )]);

    Collaborators::new(
        Arc::new(InMemoryUserDirectory::new(users)),
        Arc::new(names),
        Arc::new(divisions),
    )
}

/// Active sample company held 50/30/20 by alice, bruno and chen.
pub(crate) fn sample_company() -> Company {
    let now = Utc::now();
    let holding = |id: &str, share: u32| Shareholder {
        holder: HolderRef::user(&user(id)),
        ratio: percent(share),
        voting_ratio: percent(share),
    };
    let officer = |id: &str, role: OfficerRole| Officer {
        user_id: user(id),
        role,
    };

    Company {
        id: CompanyId(SAMPLE_COMPANY.to_string()),
        name: "Harborview Trading LLC".to_string(),
        status: CompanyStatus::Active,
        visibility: Visibility::Public,
        category: Some("llc".to_string()),
        legal_representative_id: Some(user("dana")),
        registration: Some(LlcRegistration {
            registered_capital: 2_000_000,
            domicile_address: "4 Pier Road".to_string(),
            domicile_division_id: Some("div-harbor".to_string()),
            domicile_division_path: Some("Coastal Province / Harbor District".to_string()),
            registration_authority_name: Some("Harbor District Registry".to_string()),
            registration_authority_company_id: None,
            business_scope: "Wholesale of marine equipment".to_string(),
            operating_term_years: Some(30),
            voting_rights_mode: VotingRightsMode::ByCapital,
            shareholders: vec![
                holding("alice", 50),
                holding("bruno", 30),
                holding("chen", 20),
            ],
            officers: vec![
                officer("dana", OfficerRole::LegalRepresentative),
                officer("dana", OfficerRole::Director),
                officer("emil", OfficerRole::Manager),
                officer("farah", OfficerRole::Supervisor),
            ],
        }),
        workflow_instance_id: None,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn sample_registry(config: &RegistryConfig) -> Arc<Registry> {
    let store = Arc::new(MemoryRegistryStore::with_companies([sample_company()]));
    Arc::new(RegistryService::new(store, sample_collaborators(), config))
}
