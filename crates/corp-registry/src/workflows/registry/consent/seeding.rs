use super::{ConsentError, ConsentRequirement, ConsentRole};
use crate::workflows::registry::domain::{
    Company, CompanyId, HolderKind, HolderRef, OfficerRole, Shareholder, UserId,
};
use crate::workflows::registry::intent::{ChangeIntent, LlcFormation, ShareholderIntent};
use crate::workflows::registry::repository::RegistryTx;

/// Derives who must consent to `intent` on `company`.
///
/// Shareholder companies consent through their legal representative, which
/// is looked up inside the same unit of work.
pub fn plan_requirements(
    tx: &dyn RegistryTx,
    intent: &ChangeIntent,
    company: &Company,
) -> Result<Vec<ConsentRequirement>, ConsentError> {
    let mut plan = Vec::new();
    match intent {
        ChangeIntent::Registration(formation) => registration(tx, formation, &mut plan)?,
        ChangeIntent::Rename(_)
        | ChangeIntent::Deregistration(_)
        | ChangeIntent::DomicileChange(_)
        | ChangeIntent::BusinessScopeChange(_) => {
            current_shareholders(tx, company.shareholders(), &mut plan)?;
        }
        ChangeIntent::CapitalChange(capital) => {
            current_shareholders(tx, company.shareholders(), &mut plan)?;
            let incoming = capital
                .shareholders
                .iter()
                .filter(|proposed| {
                    !company
                        .shareholders()
                        .iter()
                        .any(|current| current.holder == proposed.holder)
                })
                .map(|proposed| &proposed.holder);
            for holder in incoming {
                plan.push(shareholder_requirement(tx, holder)?);
            }
        }
        ChangeIntent::OfficerChange(officers) => {
            current_shareholders(tx, company.shareholders(), &mut plan)?;
            let directors = company.officers_with(OfficerRole::Director);
            let supervisors = company.officers_with(OfficerRole::Supervisor);
            plan.extend(
                officers
                    .director_ids
                    .iter()
                    .filter(|id| !directors.contains(id))
                    .map(|id| ConsentRequirement::new(id.clone(), ConsentRole::Director)),
            );
            plan.extend(
                officers
                    .supervisor_ids
                    .iter()
                    .filter(|id| !supervisors.contains(id))
                    .map(|id| ConsentRequirement::new(id.clone(), ConsentRole::Supervisor)),
            );
        }
        ChangeIntent::ManagementChange(management) => {
            plan.extend(
                company
                    .officers_with(OfficerRole::Director)
                    .into_iter()
                    .map(|id| ConsentRequirement::new(id, ConsentRole::Director)),
            );
            for (nominee, officer_role, consent_role) in [
                (
                    &management.manager_id,
                    OfficerRole::Manager,
                    ConsentRole::Manager,
                ),
                (
                    &management.deputy_manager_id,
                    OfficerRole::DeputyManager,
                    ConsentRole::DeputyManager,
                ),
                (
                    &management.financial_officer_id,
                    OfficerRole::FinancialOfficer,
                    ConsentRole::FinancialOfficer,
                ),
            ] {
                let Some(nominee) = nominee else { continue };
                if !company.officers_with(officer_role).contains(nominee) {
                    plan.push(ConsentRequirement::new(nominee.clone(), consent_role));
                }
            }
        }
        ChangeIntent::EquityTransfer(transfer) => {
            let transferor_role = match transfer.transferor.kind {
                HolderKind::User => ConsentRole::TransferorUser,
                HolderKind::Company => ConsentRole::TransferorCompanyLegal,
            };
            let transferee_role = match transfer.transferee.kind {
                HolderKind::User => ConsentRole::TransfereeUser,
                HolderKind::Company => ConsentRole::TransfereeCompanyLegal,
            };
            for (holder, role) in [
                (&transfer.transferor, transferor_role),
                (&transfer.transferee, transferee_role),
            ] {
                let signer = signer_for(tx, holder)?;
                plan.push(ConsentRequirement::new(signer, role).for_holder(holder));
            }
        }
    }

    plan.sort();
    plan.dedup();
    Ok(plan)
}

fn registration(
    tx: &dyn RegistryTx,
    formation: &LlcFormation,
    plan: &mut Vec<ConsentRequirement>,
) -> Result<(), ConsentError> {
    plan.push(ConsentRequirement::new(
        formation.legal_representative_id.clone(),
        ConsentRole::LegalRepresentative,
    ));
    for ShareholderIntent { holder, .. } in &formation.shareholders {
        plan.push(shareholder_requirement(tx, holder)?);
    }

    let listed = formation
        .director_ids
        .iter()
        .map(|id| (id, ConsentRole::Director))
        .chain(
            formation
                .supervisor_ids
                .iter()
                .map(|id| (id, ConsentRole::Supervisor)),
        )
        .chain(
            formation
                .chairperson_id
                .iter()
                .map(|id| (id, ConsentRole::Chairperson)),
        )
        .chain(formation.manager_id.iter().map(|id| (id, ConsentRole::Manager)));
    plan.extend(listed.map(|(id, role)| ConsentRequirement::new(id.clone(), role)));
    Ok(())
}

fn current_shareholders(
    tx: &dyn RegistryTx,
    shareholders: &[Shareholder],
    plan: &mut Vec<ConsentRequirement>,
) -> Result<(), ConsentError> {
    for shareholder in shareholders {
        plan.push(shareholder_requirement(tx, &shareholder.holder)?);
    }
    Ok(())
}

fn shareholder_requirement(
    tx: &dyn RegistryTx,
    holder: &HolderRef,
) -> Result<ConsentRequirement, ConsentError> {
    let role = match holder.kind {
        HolderKind::User => ConsentRole::ShareholderUser,
        HolderKind::Company => ConsentRole::ShareholderCompanyLegal,
    };
    Ok(ConsentRequirement::new(signer_for(tx, holder)?, role).for_holder(holder))
}

/// The person who decides for a holder: the user, or a company's legal representative.
fn signer_for(tx: &dyn RegistryTx, holder: &HolderRef) -> Result<UserId, ConsentError> {
    match holder.kind {
        HolderKind::User => Ok(UserId(holder.id.clone())),
        HolderKind::Company => {
            let company_id = CompanyId(holder.id.clone());
            let company = tx
                .company(&company_id)?
                .ok_or_else(|| ConsentError::UnknownCompany(company_id.clone()))?;
            company
                .legal_representative_id
                .ok_or(ConsentError::MissingLegalRepresentative(company_id))
        }
    }
}
