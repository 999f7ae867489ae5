//! One applier per change kind. Each mutates only the columns its kind owns,
//! and only once the application's consent is approved.

use super::domain::{
    Company, ConsentStatus, LlcRegistration, Officer, OfficerRole, Shareholder, UserId,
};
use super::formation;
use super::intent::{
    BusinessScopeIntent, CapitalIntent, ChangeIntent, DomicileIntent, EquityTransferIntent,
    LlcFormation, ManagementIntent, OfficerIntent, RenameIntent, ValidationError,
};
use super::repository::ApplicationRecord;

#[derive(Debug, thiserror::Error)]
pub enum ApplierError {
    #[error("application {0} does not have approved consent")]
    ConsentNotApproved(String),
    #[error("{0}")]
    Consistency(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Applies an approved application to its company in place.
pub fn apply(application: &ApplicationRecord, company: &mut Company) -> Result<(), ApplierError> {
    if application.consent_status != ConsentStatus::Approved {
        return Err(ApplierError::ConsentNotApproved(application.id.0.clone()));
    }

    match &application.intent {
        ChangeIntent::Registration(formation) => apply_registration(company, formation)?,
        ChangeIntent::Rename(rename) => apply_rename(company, rename)?,
        // Deregistration is carried entirely by the workflow's company status mapping.
        ChangeIntent::Deregistration(_) => {}
        ChangeIntent::DomicileChange(domicile) => {
            apply_domicile(registration_mut(company)?, domicile)
        }
        ChangeIntent::BusinessScopeChange(scope) => {
            apply_business_scope(registration_mut(company)?, scope)
        }
        ChangeIntent::CapitalChange(capital) => apply_capital(registration_mut(company)?, capital)?,
        ChangeIntent::OfficerChange(officers) => {
            apply_officers(registration_mut(company)?, officers)
        }
        ChangeIntent::ManagementChange(management) => {
            apply_management(registration_mut(company)?, management)
        }
        ChangeIntent::EquityTransfer(transfer) => {
            apply_equity_transfer(registration_mut(company)?, transfer)?
        }
    }

    if let Some(registration) = &company.registration {
        registration
            .check_invariants()
            .map_err(ApplierError::Consistency)?;
    }
    Ok(())
}

fn registration_mut(company: &mut Company) -> Result<&mut LlcRegistration, ApplierError> {
    let id = company.id.clone();
    company
        .registration
        .as_mut()
        .ok_or_else(|| ApplierError::Consistency(format!("company {id} has no registration record")))
}

fn apply_registration(company: &mut Company, intent: &LlcFormation) -> Result<(), ApplierError> {
    formation::check(intent)?;
    company.name = intent.name.clone();
    company.category = intent.category.clone();
    company.legal_representative_id = Some(intent.legal_representative_id.clone());
    company.registration = Some(formation::registration_from(intent));
    Ok(())
}

fn apply_rename(company: &mut Company, intent: &RenameIntent) -> Result<(), ApplierError> {
    let name = intent.new_name.trim();
    if name.is_empty() {
        return Err(ValidationError::BlankField("new_name").into());
    }
    company.name = name.to_string();
    Ok(())
}

fn apply_domicile(registration: &mut LlcRegistration, intent: &DomicileIntent) {
    registration.domicile_address = intent.domicile_address.trim().to_string();
    if let Some(division) = &intent.domicile_division_id {
        registration.domicile_division_id = Some(division.clone());
    }
    if let Some(path) = &intent.domicile_division_path {
        registration.domicile_division_path = Some(path.clone());
    }
    if let Some(authority) = &intent.registration_authority_name {
        registration.registration_authority_name = Some(authority.clone());
    }
    if let Some(authority) = &intent.registration_authority_company_id {
        registration.registration_authority_company_id = Some(authority.clone());
    }
}

fn apply_business_scope(registration: &mut LlcRegistration, intent: &BusinessScopeIntent) {
    registration.business_scope = intent.business_scope.trim().to_string();
}

fn apply_capital(registration: &mut LlcRegistration, intent: &CapitalIntent) -> Result<(), ApplierError> {
    let capital = u64::try_from(intent.new_registered_capital)
        .map_err(|_| ValidationError::NegativeCapital(intent.new_registered_capital))?;
    registration.registered_capital = capital;

    if !intent.shareholders.is_empty() {
        registration.voting_rights_mode = intent.voting_rights_mode;
        registration.shareholders = intent
            .shareholders
            .iter()
            .map(|proposed| Shareholder {
                holder: proposed.holder.clone(),
                ratio: proposed.ratio,
                voting_ratio: proposed.effective_voting_ratio(intent.voting_rights_mode),
            })
            .collect();
    }
    Ok(())
}

fn apply_officers(registration: &mut LlcRegistration, intent: &OfficerIntent) {
    let incoming = officers_from(&intent.director_ids, OfficerRole::Director)
        .chain(officers_from(&intent.supervisor_ids, OfficerRole::Supervisor))
        .collect();
    registration.replace_officers(&[OfficerRole::Director, OfficerRole::Supervisor], incoming);
}

fn officers_from(ids: &[UserId], role: OfficerRole) -> impl Iterator<Item = Officer> + '_ {
    ids.iter().map(move |id| Officer {
        user_id: id.clone(),
        role,
    })
}

fn apply_management(registration: &mut LlcRegistration, intent: &ManagementIntent) {
    let incoming = [
        (&intent.manager_id, OfficerRole::Manager),
        (&intent.deputy_manager_id, OfficerRole::DeputyManager),
        (&intent.financial_officer_id, OfficerRole::FinancialOfficer),
    ]
    .into_iter()
    .filter_map(|(id, role)| {
        id.as_ref().map(|id| Officer {
            user_id: id.clone(),
            role,
        })
    })
    .collect();
    registration.replace_officers(
        &[
            OfficerRole::Manager,
            OfficerRole::DeputyManager,
            OfficerRole::FinancialOfficer,
        ],
        incoming,
    );
}

/// Moves a slice of the cap table from transferor to transferee, re-checking
/// the transferor's holding against the table as it stands now.
fn apply_equity_transfer(
    registration: &mut LlcRegistration,
    intent: &EquityTransferIntent,
) -> Result<(), ApplierError> {
    let position = registration
        .shareholders
        .iter()
        .position(|row| row.holder == intent.transferor)
        .ok_or_else(|| {
            ApplierError::Consistency(format!(
                "transferor {} is no longer a shareholder",
                intent.transferor
            ))
        })?;

    let current = &registration.shareholders[position];
    let remaining_ratio = current.ratio.checked_sub(intent.ratio).ok_or_else(|| {
        ApplierError::Consistency(format!(
            "transferor {} holds {} but the transfer needs {}",
            intent.transferor, current.ratio, intent.ratio
        ))
    })?;
    let remaining_voting = current
        .voting_ratio
        .checked_sub(intent.voting_ratio)
        .ok_or_else(|| {
            ApplierError::Consistency(format!(
                "transferor {} holds {} voting weight but the transfer needs {}",
                intent.transferor, current.voting_ratio, intent.voting_ratio
            ))
        })?;

    if remaining_ratio.is_zero() && remaining_voting.is_zero() {
        registration.shareholders.remove(position);
    } else {
        let row = &mut registration.shareholders[position];
        row.ratio = remaining_ratio;
        row.voting_ratio = remaining_voting;
    }

    match registration
        .shareholders
        .iter_mut()
        .find(|row| row.holder == intent.transferee)
    {
        Some(row) => {
            row.ratio = row.ratio + intent.ratio;
            row.voting_ratio = row.voting_ratio + intent.voting_ratio;
        }
        None => registration.shareholders.push(Shareholder {
            holder: intent.transferee.clone(),
            ratio: intent.ratio,
            voting_ratio: intent.voting_ratio,
        }),
    }

    Ok(())
}
