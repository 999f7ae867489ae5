use std::sync::Arc;

use super::common::*;
use crate::config::RegistryConfig;
use crate::workflows::engine::{InstanceStatus, RepositoryError, WorkflowInstanceId, WorkflowTx};
use crate::workflows::registry::blueprint;
use crate::workflows::registry::consent::ConsentError;
use crate::workflows::registry::domain::{
    Actor, ActorRole, ApplicationStatus, Company, CompanyId, CompanyStatus, ConsentStatus,
    HolderRef, OfficerRole,
};
use crate::workflows::registry::intent::{
    CapitalChangeType, CapitalIntent, ChangeIntent, DeregistrationIntent, EquityTransferIntent,
    ManagementIntent, OfficerIntent, RenameIntent, ShareholderIntent, ValidationError,
};
use crate::workflows::registry::memory::MemoryRegistryStore;
use crate::workflows::registry::repository::{ApplicationRecord, RegistryStore};
use crate::workflows::registry::service::{
    ActionCommand, ConsentDecision, RegistryError, RegistryService, SubmitRequest,
};

type Service = RegistryService<MemoryRegistryStore>;

const PRIOR_BINDING: &str = "wfi-prior";

fn bound_company(voting: &[u32]) -> Company {
    let mut company = company_with(voting);
    company.workflow_instance_id = Some(WorkflowInstanceId(PRIOR_BINDING.to_string()));
    company
}

fn submit(service: &Service, intent: ChangeIntent) -> ApplicationRecord {
    service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent,
            },
        )
        .expect("submission accepted")
}

fn consent(service: &Service, application: &ApplicationRecord, who: &str, approve: bool) -> bool {
    service
        .decide_consent(
            &Actor::user(who, &[]),
            &application.id,
            ConsentDecision {
                approve,
                comment: None,
            },
        )
        .expect("decision recorded")
        .terminated
}

fn act(service: &Service, application: &ApplicationRecord, action_key: &str) -> ApplicationRecord {
    service
        .perform_action(
            &reviewer(),
            &application.id,
            ActionCommand {
                action_key: action_key.to_string(),
                comment: None,
                payload: None,
            },
        )
        .expect("action performed")
        .application
}

fn deregistration() -> ChangeIntent {
    ChangeIntent::Deregistration(DeregistrationIntent {
        reason: Some("business wound down".to_string()),
    })
}

fn rename(name: &str) -> ChangeIntent {
    ChangeIntent::Rename(RenameIntent {
        new_name: name.to_string(),
    })
}

fn transfer(ratio: u32) -> ChangeIntent {
    ChangeIntent::EquityTransfer(EquityTransferIntent {
        transferor: HolderRef::user(&user("u1")),
        transferee: HolderRef::user(&user("u3")),
        ratio: percent(ratio),
        voting_ratio: percent(ratio),
    })
}

fn instance_status(store: &MemoryRegistryStore, id: &WorkflowInstanceId) -> InstanceStatus {
    store
        .transaction(|tx| Ok::<_, RepositoryError>(tx.instance(id)?))
        .expect("store readable")
        .expect("instance exists")
        .status
}

#[test]
fn deregistration_needs_both_halves_and_archives_on_approval() {
    let (service, _) = build_service(vec![bound_company(&[50, 50])]);
    let application = submit(&service, deregistration());
    assert_eq!(application.consent_status, ConsentStatus::Pending);
    assert_eq!(
        service
            .company(&application.company_id)
            .expect("company")
            .workflow_instance_id,
        Some(application.workflow_instance_id.clone())
    );

    assert!(!consent(&service, &application, "u1", true));
    let halfway = service.get(&application.id).expect("application");
    assert_eq!(halfway.consent_status, ConsentStatus::Pending);
    assert_eq!(halfway.status, ApplicationStatus::Submitted);

    consent(&service, &application, "u2", true);
    let routed = service.get(&application.id).expect("application");
    assert_eq!(routed.consent_status, ConsentStatus::Approved);
    assert_eq!(routed.status, ApplicationStatus::UnderReview);
    assert!(routed.consent_completed_at.is_some());

    let approved = act(&service, &application, blueprint::APPROVE);
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert!(approved.resolved_at.is_some());

    let company = service.company(&application.company_id).expect("company");
    assert_eq!(company.status, CompanyStatus::Archived);
    assert_eq!(
        company.workflow_instance_id,
        Some(application.workflow_instance_id)
    );
}

#[test]
fn shareholder_rejection_terminates_deregistration_and_restores_binding() {
    let (service, store) = build_service(vec![bound_company(&[50, 50])]);
    let application = submit(&service, deregistration());

    assert!(consent(&service, &application, "u2", false));

    let closed = service.get(&application.id).expect("application");
    assert_eq!(closed.status, ApplicationStatus::Rejected);
    assert_eq!(closed.consent_status, ConsentStatus::Rejected);
    assert!(closed.resolved_at.is_some());
    assert_eq!(
        instance_status(&store, &application.workflow_instance_id),
        InstanceStatus::Cancelled
    );

    let company = service.company(&application.company_id).expect("company");
    assert_eq!(company.status, CompanyStatus::Active);
    assert_eq!(
        company.workflow_instance_id,
        Some(WorkflowInstanceId(PRIOR_BINDING.to_string()))
    );

    let actions: Vec<String> = service
        .audit_trail(&application.company_id)
        .expect("audit trail")
        .into_iter()
        .map(|record| record.action_key)
        .collect();
    assert_eq!(actions, ["submit", "consent_decision", "auto_terminate"]);
}

#[test]
fn nominated_director_rejection_terminates_officer_change() {
    let (service, _) = build_service(vec![company_with(&[100])]);
    let application = submit(
        &service,
        ChangeIntent::OfficerChange(OfficerIntent {
            director_ids: vec![user("d1"), user("d2"), user("d3")],
            supervisor_ids: vec![user("s1")],
        }),
    );

    let view = service.consent_items(&application.id).expect("consents");
    let mut required: Vec<String> = view
        .items
        .iter()
        .map(|item| item.requirement.required_user_id.0.clone())
        .collect();
    required.sort();
    assert_eq!(required, ["d2", "d3", "u1"]);

    consent(&service, &application, "u1", true);
    consent(&service, &application, "d2", true);
    assert!(consent(&service, &application, "d3", false));

    let closed = service.get(&application.id).expect("application");
    assert_eq!(closed.status, ApplicationStatus::Rejected);
    let company = service.company(&application.company_id).expect("company");
    assert_eq!(company.officers_with(OfficerRole::Director), vec![user("d1")]);
}

#[test]
fn unanimous_rejection_waits_for_a_reviewer() {
    let (service, _) = build_service(vec![company_with(&[60, 40])]);
    let application = submit(&service, transfer(20));

    assert!(!consent(&service, &application, "u3", false));
    let stalled = service.get(&application.id).expect("application");
    assert_eq!(stalled.consent_status, ConsentStatus::Rejected);
    assert_eq!(stalled.status, ApplicationStatus::Submitted);

    let rejected = act(&service, &application, blueprint::REJECT);
    assert_eq!(rejected.status, ApplicationStatus::Rejected);
}

#[test]
fn transfer_approved_after_cap_table_shrank_is_refused() {
    let (service, _) = build_service(vec![company_with(&[60, 40])]);
    let transfer = submit(&service, transfer(40));
    consent(&service, &transfer, "u1", true);
    consent(&service, &transfer, "u3", true);
    assert_eq!(
        service.get(&transfer.id).expect("application").status,
        ApplicationStatus::UnderReview
    );

    let capital = submit(
        &service,
        ChangeIntent::CapitalChange(CapitalIntent {
            change_type: CapitalChangeType::Increase,
            old_registered_capital: 1_000_000,
            new_registered_capital: 2_000_000,
            voting_rights_mode: Default::default(),
            shareholders: vec![
                ShareholderIntent {
                    holder: HolderRef::user(&user("u1")),
                    ratio: percent(30),
                    voting_ratio: None,
                },
                ShareholderIntent {
                    holder: HolderRef::user(&user("u2")),
                    ratio: percent(70),
                    voting_ratio: None,
                },
            ],
        }),
    );
    consent(&service, &capital, "u1", true);
    consent(&service, &capital, "u2", true);
    act(&service, &capital, blueprint::APPROVE);

    let error = service
        .perform_action(
            &reviewer(),
            &transfer.id,
            ActionCommand {
                action_key: blueprint::APPROVE.to_string(),
                comment: None,
                payload: None,
            },
        )
        .expect_err("holding no longer covers the transfer");
    assert!(matches!(error, RegistryError::Consistency(_)));

    let untouched = service.get(&transfer.id).expect("application");
    assert_eq!(untouched.status, ApplicationStatus::UnderReview);
    let company = service.company(&transfer.company_id).expect("company");
    assert_eq!(
        company
            .registration
            .expect("registered")
            .shareholder(&HolderRef::user(&user("u1")))
            .map(|row| row.ratio),
        Some(percent(30))
    );
}

#[test]
fn withdrawing_a_deregistration_restores_the_prior_binding() {
    let (service, _) = build_service(vec![bound_company(&[50, 50])]);
    let application = submit(&service, deregistration());
    consent(&service, &application, "u1", true);

    let withdrawn = service
        .withdraw(&applicant(), &application.id, Some("changed our minds"))
        .expect("withdrawn");
    assert_eq!(withdrawn.status, ApplicationStatus::Archived);
    assert_eq!(withdrawn.stage, "Withdrawn");

    let company = service.company(&application.company_id).expect("company");
    assert_eq!(
        company.workflow_instance_id,
        Some(WorkflowInstanceId(PRIOR_BINDING.to_string()))
    );

    let summary = service.consent_summary(&application.id).expect("summary");
    assert_eq!((summary.approved, summary.rejected, summary.pending), (1, 1, 0));
}

#[test]
fn withdrawing_other_kinds_leaves_the_binding_alone() {
    let (service, _) = build_service(vec![bound_company(&[100])]);
    let application = submit(&service, rename("Acme Holdings"));

    service
        .withdraw(&applicant(), &application.id, None)
        .expect("withdrawn");

    let company = service.company(&application.company_id).expect("company");
    assert_eq!(
        company.workflow_instance_id,
        Some(WorkflowInstanceId(PRIOR_BINDING.to_string()))
    );
    assert_eq!(company.status, CompanyStatus::Active);
}

#[test]
fn only_the_applicant_or_an_admin_may_withdraw() {
    let (service, _) = build_service(vec![company_with(&[100])]);
    let application = submit(&service, rename("Acme Holdings"));

    let error = service
        .withdraw(&Actor::user("u2", &[]), &application.id, None)
        .expect_err("stranger cannot withdraw");
    assert!(matches!(error, RegistryError::Authorization(_)));

    service
        .withdraw(&Actor::user("ops", &[ActorRole::Admin]), &application.id, None)
        .expect("admin may withdraw");
    let error = service
        .withdraw(&applicant(), &application.id, None)
        .expect_err("already closed");
    assert!(matches!(error, RegistryError::Conflict(_)));
}

#[test]
fn review_actions_wait_for_consent() {
    let (service, _) = build_service_with(
        vec![company_with(&[60, 40])],
        RegistryConfig {
            system_actor_id: "system".to_string(),
            auto_route: false,
        },
    );
    let application = submit(&service, rename("Acme Holdings"));

    let error = service
        .perform_action(
            &reviewer(),
            &application.id,
            ActionCommand {
                action_key: blueprint::APPROVE.to_string(),
                comment: None,
                payload: None,
            },
        )
        .expect_err("consent still pending");
    assert!(matches!(error, RegistryError::ConsentIncomplete(_)));

    consent(&service, &application, "u1", true);
    consent(&service, &application, "u2", true);
    let waiting = service.get(&application.id).expect("application");
    assert_eq!(waiting.consent_status, ConsentStatus::Approved);
    assert_eq!(waiting.status, ApplicationStatus::Submitted);

    let approved = act(&service, &application, blueprint::APPROVE);
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(
        service.company(&application.company_id).expect("company").name,
        "Acme Holdings"
    );
}

#[test]
fn changes_requested_then_revised_and_resubmitted() {
    let (service, _) = build_service(vec![company_with(&[100])]);
    let application = submit(&service, rename("Acme Holdings"));
    consent(&service, &application, "u1", true);
    let needs_changes = act(&service, &application, blueprint::REQUEST_CHANGES);
    assert_eq!(needs_changes.status, ApplicationStatus::NeedsChanges);

    let error = service
        .revise(&Actor::user("u2", &[]), &application.id, rename("Acme Group"))
        .expect_err("only the applicant revises");
    assert!(matches!(error, RegistryError::Authorization(_)));

    let error = service
        .revise(&applicant(), &application.id, deregistration())
        .expect_err("kind is fixed");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::KindMismatch { .. })
    ));

    let revised = service
        .revise(&applicant(), &application.id, rename("Acme Group"))
        .expect("revised");
    assert_eq!(revised.intent, rename("Acme Group"));

    let outcome = service
        .resubmit(&applicant(), &application.id, Some("name fixed"))
        .expect("resubmitted");
    assert_eq!(outcome.action.action_key, blueprint::RESUBMIT);
    assert_eq!(outcome.application.status, ApplicationStatus::Submitted);
    assert_eq!(outcome.application.consent_status, ConsentStatus::Pending);
    let summary = service.consent_summary(&application.id).expect("summary");
    assert_eq!((summary.total, summary.pending), (1, 1));

    consent(&service, &application, "u1", true);
    act(&service, &application, blueprint::APPROVE);
    assert_eq!(
        service.company(&application.company_id).expect("company").name,
        "Acme Group"
    );

    let actions: Vec<String> = service
        .workflow_history(&application.id)
        .expect("history")
        .into_iter()
        .map(|record| record.action_key)
        .collect();
    assert_eq!(
        actions,
        [
            blueprint::ROUTE_TO_REVIEW,
            blueprint::REQUEST_CHANGES,
            blueprint::RESUBMIT,
            blueprint::ROUTE_TO_REVIEW,
            blueprint::APPROVE,
        ]
    );
}

#[test]
fn registration_activates_a_draft_company() {
    let (service, _) = build_service(vec![parent_company()]);
    let application = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: None,
                intent: ChangeIntent::Registration(formation()),
            },
        )
        .expect("registration accepted");

    let draft = service.company(&application.company_id).expect("draft");
    assert_eq!(draft.status, CompanyStatus::UnderReview);
    assert_eq!(draft.name, "Harbor Lights LLC");
    assert_eq!(
        draft.workflow_instance_id,
        Some(application.workflow_instance_id.clone())
    );

    let ChangeIntent::Registration(stored) = &application.intent else {
        panic!("registration intent expected");
    };
    assert_eq!(
        stored.domicile_division_path.as_deref(),
        Some("Coastal / Harbor District")
    );
    assert_eq!(
        stored.registration_authority_name.as_deref(),
        Some("Harbor Registry Office")
    );

    for who in ["d1", "u1", "parent-legal", "s1", "m1"] {
        consent(&service, &application, who, true);
    }
    assert_eq!(
        service.get(&application.id).expect("application").status,
        ApplicationStatus::UnderReview
    );

    act(&service, &application, blueprint::APPROVE);
    let company = service.company(&application.company_id).expect("company");
    assert_eq!(company.status, CompanyStatus::Active);
    assert_eq!(company.legal_representative_id, Some(user("d1")));
    let registration = company.registration.expect("registered");
    assert_eq!(registration.registered_capital, 500_000);
    assert_eq!(registration.shareholders.len(), 2);

    let error = service
        .submit(
            &Actor::user("u2", &[]),
            SubmitRequest {
                company_id: None,
                intent: ChangeIntent::Registration(formation()),
            },
        )
        .expect_err("name now taken");
    assert!(matches!(error, RegistryError::Conflict(_)));
}

#[test]
fn submission_guards() {
    let mut suspended = company(
        "co-suspended",
        vec![holding(HolderRef::user(&user("u1")), 100)],
    );
    suspended.status = CompanyStatus::Suspended;
    let (service, _) = build_service(vec![company_with(&[100]), suspended]);

    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId("co-suspended".to_string())),
                intent: rename("Other"),
            },
        )
        .expect_err("inactive company");
    assert!(matches!(error, RegistryError::Conflict(_)));

    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent: ChangeIntent::OfficerChange(OfficerIntent {
                    director_ids: vec![user("ghost")],
                    supervisor_ids: vec![],
                }),
            },
        )
        .expect_err("unknown user");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::UnknownUser(_))
    ));

    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent: rename(&format!("{COMPANY} LLC")),
            },
        )
        .expect_err("same name");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::UnchangedName)
    ));

    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent: ChangeIntent::CapitalChange(CapitalIntent {
                    change_type: CapitalChangeType::Increase,
                    old_registered_capital: 10,
                    new_registered_capital: 20,
                    voting_rights_mode: Default::default(),
                    shareholders: vec![],
                }),
            },
        )
        .expect_err("stale capital");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::StaleCapital { .. })
    ));

    submit(&service, rename("Acme Holdings"));
    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent: rename("Acme Partners"),
            },
        )
        .expect_err("one rename at a time");
    assert!(matches!(error, RegistryError::Conflict(_)));
}

#[test]
fn repeated_decision_is_reported_not_applied() {
    let (service, _) = build_service(vec![company_with(&[60, 40])]);
    let application = submit(&service, rename("Acme Holdings"));
    consent(&service, &application, "u2", true);

    let error = service
        .decide_consent(
            &Actor::user("u2", &[]),
            &application.id,
            ConsentDecision {
                approve: false,
                comment: None,
            },
        )
        .expect_err("nothing pending");
    assert!(matches!(
        error,
        RegistryError::Consent(ConsentError::NoPendingItems { .. })
    ));
    let summary = service.consent_summary(&application.id).expect("summary");
    assert_eq!((summary.approved, summary.rejected), (1, 0));
}

#[test]
fn approval_rechecks_consent_after_the_cap_table_moves() {
    let (service, _) = build_service(vec![company_with(&[50, 50])]);
    let dissolution = submit(&service, deregistration());
    consent(&service, &dissolution, "u1", true);
    consent(&service, &dissolution, "u2", true);
    assert_eq!(
        service.get(&dissolution.id).expect("application").consent_status,
        ConsentStatus::Approved
    );

    let sale = submit(&service, transfer(50));
    consent(&service, &sale, "u1", true);
    consent(&service, &sale, "u3", true);
    act(&service, &sale, blueprint::APPROVE);

    let stalled = service.get(&dissolution.id).expect("application");
    assert_eq!(stalled.consent_status, ConsentStatus::Pending);
    assert_eq!(stalled.status, ApplicationStatus::UnderReview);
    let incoming: Vec<ConsentStatus> = service
        .consent_items(&dissolution.id)
        .expect("ledger")
        .items
        .into_iter()
        .filter(|item| item.requirement.required_user_id == user("u3"))
        .map(|item| item.status)
        .collect();
    assert_eq!(incoming, vec![ConsentStatus::Pending]);

    let error = service
        .perform_action(
            &reviewer(),
            &dissolution.id,
            ActionCommand {
                action_key: blueprint::APPROVE.to_string(),
                comment: None,
                payload: None,
            },
        )
        .expect_err("the new holder has not consented");
    assert!(matches!(error, RegistryError::ConsentIncomplete(_)));
    assert_eq!(
        service.company(&dissolution.company_id).expect("company").status,
        CompanyStatus::Active
    );

    consent(&service, &dissolution, "u3", true);
    let approved = act(&service, &dissolution, blueprint::APPROVE);
    assert_eq!(approved.status, ApplicationStatus::Approved);
    assert_eq!(
        service.company(&dissolution.company_id).expect("company").status,
        CompanyStatus::Archived
    );
}

#[test]
fn revision_cannot_take_a_claimed_name() {
    let collaborators = collaborators();
    collaborators
        .names
        .claim("Taken LLC", &CompanyId("co-other".to_string()));
    let service = RegistryService::new(
        Arc::new(MemoryRegistryStore::with_companies([company_with(&[100])])),
        collaborators,
        &RegistryConfig::default(),
    );

    let error = service
        .submit(
            &applicant(),
            SubmitRequest {
                company_id: Some(CompanyId(COMPANY.to_string())),
                intent: rename("Taken LLC"),
            },
        )
        .expect_err("name belongs to another company");
    assert!(matches!(error, RegistryError::Conflict(_)));

    let application = submit(&service, rename("Acme Holdings"));
    consent(&service, &application, "u1", true);
    act(&service, &application, blueprint::REQUEST_CHANGES);

    let error = service
        .revise(&applicant(), &application.id, rename("Taken LLC"))
        .expect_err("revision hits the same name check");
    assert!(matches!(error, RegistryError::Conflict(_)));
    assert_eq!(
        service.get(&application.id).expect("application").intent,
        rename("Acme Holdings")
    );
}

#[test]
fn supervisors_stay_out_of_management() {
    let (service, _) = build_service(vec![company_with(&[100])]);
    let request = |intent: ChangeIntent| SubmitRequest {
        company_id: Some(CompanyId(COMPANY.to_string())),
        intent,
    };

    let error = service
        .submit(
            &applicant(),
            request(ChangeIntent::ManagementChange(ManagementIntent {
                manager_id: Some(user("s1")),
                deputy_manager_id: None,
                financial_officer_id: None,
            })),
        )
        .expect_err("sitting supervisor nominated as manager");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::SupervisorOverlap(ref who)) if *who == user("s1")
    ));

    let error = service
        .submit(
            &applicant(),
            request(ChangeIntent::OfficerChange(OfficerIntent {
                director_ids: vec![user("d1")],
                supervisor_ids: vec![user("m1")],
            })),
        )
        .expect_err("sitting manager nominated as supervisor");
    assert!(matches!(
        error,
        RegistryError::Validation(ValidationError::SupervisorOverlap(ref who)) if *who == user("m1")
    ));
}

#[test]
fn audit_lines_carry_directory_names() {
    let (service, _) = build_service(vec![company_with(&[100])]);
    let application = submit(&service, rename("Acme Holdings"));
    consent(&service, &application, "u1", true);
    act(&service, &application, blueprint::APPROVE);

    let trail = service
        .audit_trail(&application.company_id)
        .expect("audit trail");
    let names: Vec<(String, Option<String>)> = trail
        .into_iter()
        .map(|record| (record.action_key, record.actor_name))
        .collect();
    assert_eq!(
        names,
        vec![
            ("submit".to_string(), Some("User u1".to_string())),
            ("consent_decision".to_string(), Some("User u1".to_string())),
            (blueprint::ROUTE_TO_REVIEW.to_string(), None),
            (blueprint::APPROVE.to_string(), None),
        ]
    );
}
