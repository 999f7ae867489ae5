use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::appliers::{self, ApplierError};
use super::blueprint::{self, RegistryBlueprint};
use super::collaborators::Collaborators;
use super::consent::{
    plan_requirements, ConsentError, ConsentItem, ConsentLedger, ConsentSummary,
};
use super::domain::{
    Actor, ActorRole, ApplicationId, ApplicationStatus, Company, CompanyId, CompanyStatus,
    ConsentStatus, OfficerRole, UserId, Visibility,
};
use super::formation;
use super::intent::{ChangeIntent, ChangeKind, ValidationError};
use super::repository::{ApplicationRecord, AuditRecord, RegistryStore, RegistryTx};
use crate::config::RegistryConfig;
use crate::workflows::engine::{
    ActionDefinition, ActionRequest, NewInstance, NextState, RepositoryError, TargetType,
    Transition, WorkflowActionRecord, WorkflowEngine, WorkflowError,
};

/// Submission body: the target company (absent for a first registration) and the intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    pub intent: ChangeIntent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCommand {
    pub action_key: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub approve: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentOutcome {
    pub application: ApplicationRecord,
    pub decided: Vec<ConsentItem>,
    pub verdict: ConsentStatus,
    /// Set when the verdict closed the application without a reviewer.
    pub terminated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub application: ApplicationRecord,
    pub action: WorkflowActionRecord,
    pub next_state: NextState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentView {
    pub items: Vec<ConsentItem>,
    pub summary: ConsentSummary,
}

/// Orchestrates applications: validation, consent, workflow and appliers,
/// each operation inside one store transaction.
pub struct RegistryService<S> {
    store: Arc<S>,
    collaborators: Collaborators,
    engine: WorkflowEngine,
    blueprint: Arc<RegistryBlueprint>,
    system: Actor,
    auto_route: bool,
}

impl<S> RegistryService<S>
where
    S: RegistryStore + 'static,
{
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: &RegistryConfig) -> Self {
        Self {
            store,
            collaborators,
            engine: WorkflowEngine::new(),
            blueprint: Arc::new(RegistryBlueprint::standard()),
            system: Actor::system(&config.system_actor_id),
            auto_route: config.auto_route,
        }
    }

    pub fn system_actor(&self) -> &Actor {
        &self.system
    }

    /// Validates the intent, opens the application and its workflow instance,
    /// and seeds the consent ledger.
    pub fn submit(
        &self,
        actor: &Actor,
        request: SubmitRequest,
    ) -> Result<ApplicationRecord, RegistryError> {
        let mut intent = request.intent.normalized();
        let kind = intent.kind();
        self.validate_intent(&mut intent)?;

        let company_id = match (kind, request.company_id) {
            (ChangeKind::Registration, _) => None,
            (_, Some(company_id)) => Some(company_id),
            (_, None) => {
                return Err(ValidationError::BlankField("company_id").into());
            }
        };

        let record = self.store.transaction(|tx| {
            let definition = self
                .blueprint
                .definition(kind)
                .ok_or_else(|| RegistryError::NotFound(format!("workflow for {kind:?}")))?;
            self.engine.ensure_definition(tx, definition)?;

            let mut company = match &company_id {
                Some(company_id) => {
                    let company = load_company(tx, company_id)?;
                    if company.status != CompanyStatus::Active {
                        return Err(RegistryError::Conflict(format!(
                            "company {} is {} and cannot take new applications",
                            company.id,
                            company.status.key()
                        )));
                    }
                    company
                }
                None => draft_company(tx, &intent),
            };
            self.check_in_flight(tx, kind, &company, &intent, None)?;
            check_against_company(&intent, &company)?;

            let application_id = ApplicationId(tx.allocate_id("app"));
            let (target_type, target_id) = match kind {
                ChangeKind::Registration => (TargetType::Company, company.id.0.clone()),
                _ => (TargetType::Application, application_id.0.clone()),
            };
            let instance = self.engine.create_instance(
                tx,
                NewInstance {
                    definition_code: definition.code.clone(),
                    target_type,
                    target_id,
                    created_by: actor.user_id.0.clone(),
                    context: json!({
                        "application_id": application_id,
                        "company_id": company.id,
                    }),
                },
            )?;

            let mut previous_company_workflow = None;
            match kind {
                ChangeKind::Registration => {
                    company.workflow_instance_id = Some(instance.id.clone());
                }
                ChangeKind::Deregistration => {
                    previous_company_workflow = company
                        .workflow_instance_id
                        .replace(instance.id.clone());
                }
                _ => {}
            }

            let initial = definition
                .state(&definition.initial_state)
                .map(NextState::from)
                .ok_or_else(|| {
                    RegistryError::Consistency(format!(
                        "workflow {} has no initial state",
                        definition.code
                    ))
                })?;

            let now = Utc::now();
            let mut application = ApplicationRecord {
                id: application_id.clone(),
                company_id: company.id.clone(),
                applicant_id: actor.user_id.clone(),
                kind,
                intent: intent.clone(),
                status: ApplicationStatus::Submitted,
                workflow_code: definition.code.clone(),
                workflow_instance_id: instance.id.clone(),
                stage: initial.label.clone(),
                consent_status: ConsentStatus::Pending,
                consent_completed_at: None,
                previous_company_workflow,
                submitted_at: now,
                updated_at: now,
                resolved_at: None,
            };
            apply_business(&mut application, &mut company, &initial);

            if company_id.is_some() {
                tx.update_company(company.clone())?;
            } else {
                tx.insert_company(company.clone())?;
            }
            tx.insert_application(application.clone())?;

            let requirements = plan_requirements(tx, &intent, &company)?;
            ConsentLedger::seed(tx, &application_id, requirements)?;
            let verdict = ConsentLedger::recompute_progress(tx, &application_id, kind.rule())?;

            self.write_audit(
                tx,
                &application,
                &actor.user_id,
                ("submit", "Submitted"),
                None,
                serde_json::to_value(&intent).unwrap_or(Value::Null),
            )?;

            if verdict == ConsentStatus::Approved {
                self.auto_route(tx, &application_id)?;
            }
            load_application(tx, &application_id)
        })?;

        info!(
            application = %record.id,
            company = %record.company_id,
            kind = ?record.kind,
            applicant = %record.applicant_id,
            "application submitted"
        );
        Ok(record)
    }

    /// Records `actor`'s decision on every pending row they hold, then
    /// re-evaluates the application's consent.
    pub fn decide_consent(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        decision: ConsentDecision,
    ) -> Result<ConsentOutcome, RegistryError> {
        let outcome = self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            if !application.is_open() {
                return Err(RegistryError::Conflict(format!(
                    "application {} is {}",
                    application.id,
                    application.status.key()
                )));
            }

            let decided = ConsentLedger::decide(
                tx,
                application_id,
                &actor.user_id,
                decision.approve,
                decision.comment.as_deref(),
            )?;
            let rule = application.kind.rule();
            let verdict = ConsentLedger::recompute_progress(tx, application_id, rule)?;

            let application = load_application(tx, application_id)?;
            self.write_audit(
                tx,
                &application,
                &actor.user_id,
                (
                    "consent_decision",
                    if decision.approve {
                        "Consent approved"
                    } else {
                        "Consent rejected"
                    },
                ),
                decision.comment.as_deref(),
                json!({ "approve": decision.approve, "verdict": verdict }),
            )?;

            let mut terminated = false;
            match verdict {
                ConsentStatus::Rejected if rule.terminates_on_rejection() => {
                    self.terminate(tx, application)?;
                    terminated = true;
                }
                ConsentStatus::Approved => self.auto_route(tx, application_id)?,
                _ => {}
            }

            Ok(ConsentOutcome {
                application: load_application(tx, application_id)?,
                decided,
                verdict,
                terminated,
            })
        });

        match &outcome {
            Ok(outcome) => info!(
                application = %application_id,
                user = %actor.user_id,
                approve = decision.approve,
                verdict = outcome.verdict.label(),
                "consent decision recorded"
            ),
            Err(RegistryError::Consent(ConsentError::NoPendingItems { .. })) => warn!(
                application = %application_id,
                user = %actor.user_id,
                "consent decision ignored: nothing pending for this user"
            ),
            Err(_) => {}
        }
        outcome
    }

    /// Fires a workflow action on behalf of `actor`.
    pub fn perform_action(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        command: ActionCommand,
    ) -> Result<ActionOutcome, RegistryError> {
        if command.action_key == blueprint::RESUBMIT {
            return self.resubmit(actor, application_id, command.comment.as_deref());
        }

        let outcome = self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            self.fire(
                tx,
                application,
                actor,
                &command.action_key,
                command.comment.as_deref(),
                command.payload.clone().unwrap_or(Value::Null),
            )
        })?;
        self.after_commit(&outcome);
        Ok(outcome)
    }

    /// Withdraws an open application: pending consent is rejected, the
    /// workflow instance cancelled and the application archived.
    pub fn withdraw(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        comment: Option<&str>,
    ) -> Result<ApplicationRecord, RegistryError> {
        let record = self.store.transaction(|tx| {
            let mut application = load_application(tx, application_id)?;
            if application.applicant_id != actor.user_id && !actor.has(ActorRole::Admin) {
                return Err(RegistryError::Authorization(format!(
                    "only the applicant may withdraw application {}",
                    application.id
                )));
            }
            if !application.is_open() {
                return Err(RegistryError::Conflict(format!(
                    "application {} is {} and cannot be withdrawn",
                    application.id,
                    application.status.key()
                )));
            }

            ConsentLedger::reject_pending(tx, application_id, Some("application withdrawn"))?;
            self.engine
                .cancel_instance(tx, &application.workflow_instance_id, &actor.user_id.0, comment)?;

            let mut company = load_company(tx, &application.company_id)?;
            restore_binding(&application, &mut company);
            if application.kind == ChangeKind::Registration {
                company.status = CompanyStatus::Archived;
            }
            company.updated_at = Utc::now();
            tx.update_company(company)?;

            let now = Utc::now();
            application.status = ApplicationStatus::Archived;
            application.stage = "Withdrawn".to_string();
            application.updated_at = now;
            application.resolved_at = Some(now);
            tx.update_application(application.clone())?;

            self.write_audit(
                tx,
                &application,
                &actor.user_id,
                ("withdraw", "Withdrawn"),
                comment,
                Value::Null,
            )?;
            Ok(application)
        })?;

        info!(application = %record.id, user = %actor.user_id, "application withdrawn");
        Ok(record)
    }

    /// Sends an application back for review after changes were requested,
    /// rebuilding its consent ledger from the current payload.
    pub fn resubmit(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        comment: Option<&str>,
    ) -> Result<ActionOutcome, RegistryError> {
        let outcome = self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            if application.status != ApplicationStatus::NeedsChanges {
                return Err(RegistryError::Conflict(format!(
                    "application {} is {}; only applications needing changes can be resubmitted",
                    application.id,
                    application.status.key()
                )));
            }
            let kind = application.kind;
            let intent = application.intent.clone();

            let outcome = self.fire(
                tx,
                application,
                actor,
                blueprint::RESUBMIT,
                comment,
                Value::Null,
            )?;

            let removed = ConsentLedger::clear(tx, application_id)?;
            let company = load_company(tx, &outcome.application.company_id)?;
            let requirements = plan_requirements(tx, &intent, &company)?;
            let seeded = ConsentLedger::seed(tx, application_id, requirements)?;
            debug!(
                application = %application_id,
                removed,
                seeded = seeded.len(),
                "consent ledger rebuilt"
            );

            let mut application = load_application(tx, application_id)?;
            application.consent_status = ConsentStatus::Pending;
            application.consent_completed_at = None;
            tx.update_application(application)?;
            let verdict = ConsentLedger::recompute_progress(tx, application_id, kind.rule())?;
            if verdict == ConsentStatus::Approved {
                self.auto_route(tx, application_id)?;
            }

            Ok(ActionOutcome {
                application: load_application(tx, application_id)?,
                ..outcome
            })
        })?;

        info!(application = %application_id, user = %actor.user_id, "application resubmitted");
        Ok(outcome)
    }

    /// Replaces the payload of an application awaiting changes.
    pub fn revise(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        intent: ChangeIntent,
    ) -> Result<ApplicationRecord, RegistryError> {
        let mut intent = intent.normalized();
        self.validate_intent(&mut intent)?;

        let record = self.store.transaction(|tx| {
            let mut application = load_application(tx, application_id)?;
            if application.applicant_id != actor.user_id {
                return Err(RegistryError::Authorization(format!(
                    "only the applicant may revise application {}",
                    application.id
                )));
            }
            if application.status != ApplicationStatus::NeedsChanges {
                return Err(RegistryError::Conflict(format!(
                    "application {} is {}; the payload can only change while changes are requested",
                    application.id,
                    application.status.key()
                )));
            }
            if intent.kind() != application.kind {
                return Err(ValidationError::KindMismatch {
                    expected: application.kind,
                    found: intent.kind(),
                }
                .into());
            }

            let mut company = load_company(tx, &application.company_id)?;
            self.check_in_flight(tx, application.kind, &company, &intent, Some(&application.id))?;
            check_against_company(&intent, &company)?;
            if let ChangeIntent::Registration(formation) = &intent {
                company.name = formation.name.clone();
                company.category = formation.category.clone();
                company.updated_at = Utc::now();
                tx.update_company(company)?;
            }

            application.intent = intent.clone();
            application.updated_at = Utc::now();
            tx.update_application(application.clone())?;
            self.write_audit(
                tx,
                &application,
                &actor.user_id,
                ("revise", "Payload revised"),
                None,
                serde_json::to_value(&intent).unwrap_or(Value::Null),
            )?;
            Ok(application)
        })?;

        info!(application = %record.id, user = %actor.user_id, "application payload revised");
        Ok(record)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<ApplicationRecord, RegistryError> {
        self.store
            .transaction(|tx| load_application(tx, application_id))
    }

    pub fn company(&self, company_id: &CompanyId) -> Result<Company, RegistryError> {
        self.store.transaction(|tx| load_company(tx, company_id))
    }

    pub fn consent_items(&self, application_id: &ApplicationId) -> Result<ConsentView, RegistryError> {
        self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            let items = tx.consent_items(application_id)?;
            let summary = ConsentSummary::from_items(&items, application.consent_status);
            Ok(ConsentView { items, summary })
        })
    }

    pub fn consent_summary(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ConsentSummary, RegistryError> {
        Ok(self.consent_items(application_id)?.summary)
    }

    pub fn audit_trail(&self, company_id: &CompanyId) -> Result<Vec<AuditRecord>, RegistryError> {
        self.store.transaction(|tx| {
            load_company(tx, company_id)?;
            Ok(tx.audits(company_id)?)
        })
    }

    pub fn workflow_history(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<WorkflowActionRecord>, RegistryError> {
        self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            Ok(self
                .engine
                .history(&*tx, &application.workflow_instance_id)?)
        })
    }

    /// Actions `actor` could fire right now, before consent gating.
    pub fn available_actions(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Vec<ActionDefinition>, RegistryError> {
        self.store.transaction(|tx| {
            let application = load_application(tx, application_id)?;
            let roles = roles_for(actor, &application);
            Ok(self
                .engine
                .available_actions(&*tx, &application.workflow_instance_id, &roles)?)
        })
    }

    fn validate_intent(&self, intent: &mut ChangeIntent) -> Result<(), RegistryError> {
        match &*intent {
            ChangeIntent::Registration(llc) => formation::check(llc)?,
            other => other.validate_shape()?,
        }

        if let Some(unknown) = intent
            .referenced_users()
            .into_iter()
            .find(|user| !self.collaborators.users.exists(user))
        {
            return Err(ValidationError::UnknownUser(unknown).into());
        }

        self.resolve_division(intent)?;
        Ok(())
    }

    /// Fills domicile path and authority from the division resolver when the
    /// intent leaves them out. Authority lookup is best effort.
    fn resolve_division(&self, intent: &mut ChangeIntent) -> Result<(), ValidationError> {
        let (division_id, path, authority_name, authority_company) = match intent {
            ChangeIntent::Registration(formation) => (
                &formation.domicile_division_id,
                &mut formation.domicile_division_path,
                &mut formation.registration_authority_name,
                &mut formation.registration_authority_company_id,
            ),
            ChangeIntent::DomicileChange(domicile) => (
                &domicile.domicile_division_id,
                &mut domicile.domicile_division_path,
                &mut domicile.registration_authority_name,
                &mut domicile.registration_authority_company_id,
            ),
            _ => return Ok(()),
        };
        let Some(division_id) = division_id.as_deref() else {
            return Ok(());
        };

        let resolved = self
            .collaborators
            .divisions
            .resolve(division_id)
            .ok_or_else(|| ValidationError::UnknownDivision(division_id.to_string()))?;
        if path.is_none() {
            *path = Some(resolved.path);
        }
        if authority_name.is_none() {
            *authority_name = resolved.authority_name;
        }
        if authority_company.is_none() {
            *authority_company = resolved.authority_company_id;
        }
        Ok(())
    }

    /// Rejects a second open application of the same kind, and names that are
    /// taken. `current` is the application being revised, if any.
    fn check_in_flight(
        &self,
        tx: &dyn RegistryTx,
        kind: ChangeKind,
        company: &Company,
        intent: &ChangeIntent,
        current: Option<&ApplicationId>,
    ) -> Result<(), RegistryError> {
        let open: Vec<ApplicationRecord> = tx
            .open_applications(kind)?
            .into_iter()
            .filter(|record| Some(&record.id) != current)
            .collect();
        let clash = match intent {
            ChangeIntent::Registration(formation) => open.iter().find(|record| {
                matches!(&record.intent, ChangeIntent::Registration(other)
                    if other.name.eq_ignore_ascii_case(&formation.name))
            }),
            _ => open.iter().find(|record| record.company_id == company.id),
        };
        if let Some(existing) = clash {
            return Err(RegistryError::Conflict(format!(
                "application {} of the same kind is already in flight",
                existing.id
            )));
        }

        let names = &self.collaborators.names;
        match intent {
            ChangeIntent::Registration(formation)
                if !names.is_available(&formation.name, Some(&company.id)) =>
            {
                Err(RegistryError::Conflict(format!(
                    "company name {} is already taken",
                    formation.name
                )))
            }
            ChangeIntent::Rename(rename) if !names.is_available(&rename.new_name, Some(&company.id)) => {
                Err(RegistryError::Conflict(format!(
                    "company name {} is already taken",
                    rename.new_name
                )))
            }
            _ => Ok(()),
        }
    }

    /// Gates, fires and applies one workflow action inside an open transaction.
    fn fire(
        &self,
        tx: &mut dyn RegistryTx,
        mut application: ApplicationRecord,
        actor: &Actor,
        action_key: &str,
        comment: Option<&str>,
        payload: Value,
    ) -> Result<ActionOutcome, RegistryError> {
        if blueprint::requires_consent(action_key) {
            let verdict =
                ConsentLedger::recompute_progress(tx, &application.id, application.kind.rule())?;
            if verdict != ConsentStatus::Approved {
                return Err(RegistryError::ConsentIncomplete(application.id.clone()));
            }
            application = load_application(tx, &application.id)?;
        }

        let roles = roles_for(actor, &application);
        let Transition {
            action, next_state, ..
        } = self.engine.perform_action(
            tx,
            ActionRequest {
                instance_id: &application.workflow_instance_id,
                action_key,
                actor_id: &actor.user_id.0,
                actor_roles: &roles,
                comment,
                payload: &payload,
            },
        )?;

        let mut company = load_company(tx, &application.company_id)?;
        apply_business(&mut application, &mut company, &next_state);

        if action.action_key == blueprint::APPROVE {
            appliers::apply(&application, &mut company)?;
            info!(
                application = %application.id,
                company = %company.id,
                kind = ?application.kind,
                "change applied"
            );
        }
        if next_state.terminal.is_some() {
            application.resolved_at = Some(action.performed_at);
            if application.status != ApplicationStatus::Approved {
                restore_binding(&application, &mut company);
            }
        }

        company.updated_at = action.performed_at;
        application.updated_at = action.performed_at;
        tx.update_company(company)?;
        tx.update_application(application.clone())?;
        if application.status == ApplicationStatus::Approved {
            self.refresh_open_ledgers(tx, &application)?;
        }

        self.write_audit(
            tx,
            &application,
            &actor.user_id,
            (action.action_key.as_str(), action.action_label.as_str()),
            comment,
            payload,
        )?;

        info!(
            application = %application.id,
            action = %action.action_key,
            from = %action.from_state,
            to = %action.to_state,
            actor = %actor.user_id,
            "workflow action performed"
        );
        Ok(ActionOutcome {
            application,
            action,
            next_state,
        })
    }

    /// Re-plans the ledgers of the company's other open applications after a
    /// change lands, so new holders get a row and verdicts follow the new
    /// cap table.
    fn refresh_open_ledgers(
        &self,
        tx: &mut dyn RegistryTx,
        approved: &ApplicationRecord,
    ) -> Result<(), RegistryError> {
        let company = load_company(tx, &approved.company_id)?;
        for kind in ChangeKind::ordered() {
            for open in tx.open_applications(kind)? {
                if open.company_id != company.id || open.id == approved.id {
                    continue;
                }
                let requirements = plan_requirements(tx, &open.intent, &company)?;
                let seeded = ConsentLedger::seed(tx, &open.id, requirements)?;
                let verdict = ConsentLedger::recompute_progress(tx, &open.id, kind.rule())?;
                if verdict != open.consent_status || !seeded.is_empty() {
                    info!(
                        application = %open.id,
                        after = %approved.id,
                        seeded = seeded.len(),
                        verdict = verdict.label(),
                        "consent ledger refreshed"
                    );
                }
                if verdict == ConsentStatus::Rejected && kind.rule().terminates_on_rejection() {
                    let open = load_application(tx, &open.id)?;
                    self.terminate(tx, open)?;
                }
            }
        }
        Ok(())
    }

    /// Lets the system actor route a fully consented application to review.
    fn auto_route(
        &self,
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
    ) -> Result<(), RegistryError> {
        if !self.auto_route {
            return Ok(());
        }
        let application = load_application(tx, application_id)?;
        let instance = tx.instance(&application.workflow_instance_id)?;
        let ready = instance.is_some_and(|instance| {
            instance.is_active() && instance.current_state == blueprint::SUBMITTED
        });
        if !ready {
            return Ok(());
        }
        self.fire(
            tx,
            application,
            &self.system,
            blueprint::ROUTE_TO_REVIEW,
            Some("consent complete"),
            Value::Null,
        )?;
        Ok(())
    }

    /// Closes an application whose consent can no longer succeed.
    fn terminate(
        &self,
        tx: &mut dyn RegistryTx,
        mut application: ApplicationRecord,
    ) -> Result<(), RegistryError> {
        self.engine.cancel_instance(
            tx,
            &application.workflow_instance_id,
            &self.system.user_id.0,
            Some("consent rejected"),
        )?;

        let mut company = load_company(tx, &application.company_id)?;
        restore_binding(&application, &mut company);
        tx.update_company(company)?;

        let now = Utc::now();
        application.status = ApplicationStatus::Rejected;
        application.stage = "Rejected".to_string();
        application.updated_at = now;
        application.resolved_at = Some(now);
        tx.update_application(application.clone())?;

        self.write_audit(
            tx,
            &application,
            &self.system.user_id,
            ("auto_terminate", "Terminated after consent rejection"),
            None,
            Value::Null,
        )?;
        warn!(
            application = %application.id,
            kind = ?application.kind,
            "application terminated: consent can no longer be reached"
        );
        Ok(())
    }

    /// Appends an audit line, labelled with the actor's directory name.
    fn write_audit(
        &self,
        tx: &mut dyn RegistryTx,
        application: &ApplicationRecord,
        actor_id: &UserId,
        (action_key, action_label): (&str, &str),
        comment: Option<&str>,
        payload: Value,
    ) -> Result<(), RegistryError> {
        let record = AuditRecord {
            id: tx.allocate_id("aud"),
            company_id: application.company_id.clone(),
            application_id: Some(application.id.clone()),
            actor_id: actor_id.clone(),
            actor_name: self.collaborators.users.display_name(actor_id),
            action_key: action_key.to_string(),
            action_label: action_label.to_string(),
            state: application.status.key().to_string(),
            comment: comment.map(str::to_string),
            payload,
            recorded_at: Utc::now(),
        };
        tx.append_audit(record)?;
        Ok(())
    }

    fn after_commit(&self, outcome: &ActionOutcome) {
        let application = &outcome.application;
        if application.status != ApplicationStatus::Approved {
            return;
        }
        let name = match &application.intent {
            ChangeIntent::Registration(formation) => &formation.name,
            ChangeIntent::Rename(rename) => &rename.new_name,
            _ => return,
        };
        self.collaborators
            .names
            .claim(name, &application.company_id);
    }
}

fn load_application(
    tx: &dyn RegistryTx,
    application_id: &ApplicationId,
) -> Result<ApplicationRecord, RegistryError> {
    tx.application(application_id)?
        .ok_or_else(|| RegistryError::NotFound(format!("application {application_id}")))
}

fn load_company(tx: &dyn RegistryTx, company_id: &CompanyId) -> Result<Company, RegistryError> {
    tx.company(company_id)?
        .ok_or_else(|| RegistryError::NotFound(format!("company {company_id}")))
}

fn draft_company(tx: &mut dyn RegistryTx, intent: &ChangeIntent) -> Company {
    let now = Utc::now();
    let (name, category) = match intent {
        ChangeIntent::Registration(formation) => {
            (formation.name.clone(), formation.category.clone())
        }
        _ => (String::new(), None),
    };
    Company {
        id: CompanyId(tx.allocate_id("co")),
        name,
        status: CompanyStatus::Draft,
        visibility: Visibility::Private,
        category,
        legal_representative_id: None,
        registration: None,
        workflow_instance_id: None,
        created_at: now,
        updated_at: now,
    }
}

/// Checks that depend on the company as it stands.
fn check_against_company(intent: &ChangeIntent, company: &Company) -> Result<(), RegistryError> {
    match intent {
        ChangeIntent::Rename(rename) if rename.new_name.eq_ignore_ascii_case(&company.name) => {
            Err(ValidationError::UnchangedName.into())
        }
        ChangeIntent::CapitalChange(capital) => {
            let registered = company
                .registration
                .as_ref()
                .map(|registration| registration.registered_capital)
                .unwrap_or_default();
            if u64::try_from(capital.old_registered_capital).ok() != Some(registered) {
                return Err(ValidationError::StaleCapital {
                    declared: capital.old_registered_capital,
                    registered,
                }
                .into());
            }
            Ok(())
        }
        ChangeIntent::EquityTransfer(transfer) => {
            let holding = company
                .registration
                .as_ref()
                .and_then(|registration| registration.shareholder(&transfer.transferor));
            match holding {
                None => Err(ValidationError::InvalidPayload(format!(
                    "transferor {} is not a shareholder of {}",
                    transfer.transferor, company.id
                ))
                .into()),
                Some(row) if row.ratio < transfer.ratio || row.voting_ratio < transfer.voting_ratio => {
                    Err(ValidationError::InvalidPayload(format!(
                        "transferor {} holds {} ({} voting), less than the {} ({} voting) offered",
                        transfer.transferor,
                        row.ratio,
                        row.voting_ratio,
                        transfer.ratio,
                        transfer.voting_ratio
                    ))
                    .into())
                }
                Some(_) => Ok(()),
            }
        }
        ChangeIntent::OfficerChange(officers) => {
            let management = roster(
                company,
                &[
                    OfficerRole::Manager,
                    OfficerRole::DeputyManager,
                    OfficerRole::FinancialOfficer,
                ],
            );
            match officers
                .supervisor_ids
                .iter()
                .find(|supervisor| management.contains(supervisor))
            {
                Some(overlap) => Err(ValidationError::SupervisorOverlap(overlap.clone()).into()),
                None => Ok(()),
            }
        }
        ChangeIntent::ManagementChange(management) => {
            let supervisors = roster(
                company,
                &[OfficerRole::Supervisor, OfficerRole::SupervisorChairperson],
            );
            let nominees = [
                &management.manager_id,
                &management.deputy_manager_id,
                &management.financial_officer_id,
            ];
            match nominees
                .into_iter()
                .flatten()
                .find(|nominee| supervisors.contains(nominee))
            {
                Some(overlap) => Err(ValidationError::SupervisorOverlap(overlap.clone()).into()),
                None => Ok(()),
            }
        }
        _ => Ok(()),
    }
}

/// Current holders of any of `roles`.
fn roster(company: &Company, roles: &[OfficerRole]) -> Vec<UserId> {
    roles
        .iter()
        .flat_map(|role| company.officers_with(*role))
        .collect()
}

/// The actor's verified roles plus `applicant` when they filed the application.
fn roles_for(actor: &Actor, application: &ApplicationRecord) -> Vec<String> {
    let mut roles = actor.role_keys();
    if actor.user_id == application.applicant_id && !actor.has(ActorRole::Applicant) {
        roles.push(ActorRole::Applicant.key().to_string());
    }
    roles
}

fn apply_business(application: &mut ApplicationRecord, company: &mut Company, next: &NextState) {
    application.stage = next.label.clone();
    if let Some(status) = next
        .business
        .application_status
        .as_deref()
        .and_then(ApplicationStatus::from_key)
    {
        application.status = status;
    }
    if let Some(status) = next
        .business
        .company_status
        .as_deref()
        .and_then(CompanyStatus::from_key)
    {
        company.status = status;
    }
}

/// Gives a company back the workflow binding a deregistration displaced.
fn restore_binding(application: &ApplicationRecord, company: &mut Company) {
    if application.kind == ChangeKind::Deregistration
        && company.workflow_instance_id.as_ref() == Some(&application.workflow_instance_id)
    {
        company.workflow_instance_id = application.previous_company_workflow.clone();
    }
}

/// Error raised by the registry service.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    Consistency(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("consent for application {0} is not complete")]
    ConsentIncomplete(ApplicationId),
    #[error(transparent)]
    Workflow(WorkflowError),
    #[error(transparent)]
    Consent(ConsentError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<WorkflowError> for RegistryError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::Repository(inner) => Self::Repository(inner),
            other => Self::Workflow(other),
        }
    }
}

impl From<ConsentError> for RegistryError {
    fn from(error: ConsentError) -> Self {
        match error {
            ConsentError::UnknownCompany(_) | ConsentError::MissingLegalRepresentative(_) => {
                Self::Consistency(error.to_string())
            }
            ConsentError::Repository(inner) => Self::Repository(inner),
            other => Self::Consent(other),
        }
    }
}

impl From<ApplierError> for RegistryError {
    fn from(error: ApplierError) -> Self {
        match error {
            ApplierError::ConsentNotApproved(id) => Self::ConsentIncomplete(ApplicationId(id)),
            ApplierError::Consistency(message) => Self::Consistency(message),
            ApplierError::Validation(inner) => Self::Validation(inner),
        }
    }
}
