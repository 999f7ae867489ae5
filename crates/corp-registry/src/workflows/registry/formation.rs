//! Structural rules for a first-time LLC formation.

use super::domain::{LlcRegistration, Officer, OfficerRole, Shareholder, UserId};
use super::intent::{check_director_count, validate_cap_table, LlcFormation, ValidationError};

/// Rejects a formation payload that could never become a valid registration.
pub fn check(formation: &LlcFormation) -> Result<(), ValidationError> {
    for (field, value) in [
        ("name", formation.name.as_str()),
        ("domicile_address", formation.domicile_address.as_str()),
        ("business_scope", formation.business_scope.as_str()),
        (
            "legal_representative_id",
            formation.legal_representative_id.0.as_str(),
        ),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::BlankField(field));
        }
    }
    if formation.registered_capital < 0 {
        return Err(ValidationError::NegativeCapital(formation.registered_capital));
    }

    validate_cap_table(&formation.shareholders, formation.voting_rights_mode)?;

    let directors = &formation.director_ids;
    check_director_count(directors.len())?;
    if directors.len() > 1 {
        match &formation.chairperson_id {
            None => return Err(ValidationError::ChairpersonRequired),
            Some(chair) if !directors.contains(chair) => {
                return Err(ValidationError::ChairpersonNotDirector(chair.clone()))
            }
            Some(_) => {}
        }
    } else if let Some(chair) = &formation.chairperson_id {
        if !directors.contains(chair) {
            return Err(ValidationError::ChairpersonNotDirector(chair.clone()));
        }
    }

    let legal = &formation.legal_representative_id;
    let legal_is_manager = formation.manager_id.as_ref() == Some(legal);
    if !directors.contains(legal) && !legal_is_manager {
        return Err(ValidationError::LegalRepresentativeIneligible(legal.clone()));
    }

    let executives: Vec<&UserId> = directors
        .iter()
        .chain(formation.manager_id.iter())
        .chain(formation.deputy_manager_id.iter())
        .chain(formation.financial_officer_id.iter())
        .collect();
    if let Some(overlap) = formation
        .supervisor_ids
        .iter()
        .chain(formation.supervisor_chairperson_id.iter())
        .find(|supervisor| executives.contains(supervisor))
    {
        return Err(ValidationError::SupervisorOverlap(overlap.clone()));
    }

    if let (Some(manager), Some(deputy)) = (&formation.manager_id, &formation.deputy_manager_id) {
        if manager == deputy {
            return Err(ValidationError::DuplicateOfficer(manager.clone()));
        }
    }

    Ok(())
}

/// Materializes the registration sub-record from a checked formation.
pub fn registration_from(formation: &LlcFormation) -> LlcRegistration {
    let mode = formation.voting_rights_mode;
    let shareholders = formation
        .shareholders
        .iter()
        .map(|intent| Shareholder {
            holder: intent.holder.clone(),
            ratio: intent.ratio,
            voting_ratio: intent.effective_voting_ratio(mode),
        })
        .collect();

    let mut officers = vec![Officer {
        user_id: formation.legal_representative_id.clone(),
        role: OfficerRole::LegalRepresentative,
    }];
    let listed = formation
        .director_ids
        .iter()
        .map(|id| (id, OfficerRole::Director))
        .chain(
            formation
                .supervisor_ids
                .iter()
                .map(|id| (id, OfficerRole::Supervisor)),
        );
    let single = [
        (&formation.chairperson_id, OfficerRole::Chairperson),
        (&formation.vice_chairperson_id, OfficerRole::ViceChairperson),
        (&formation.manager_id, OfficerRole::Manager),
        (&formation.deputy_manager_id, OfficerRole::DeputyManager),
        (&formation.financial_officer_id, OfficerRole::FinancialOfficer),
        (
            &formation.supervisor_chairperson_id,
            OfficerRole::SupervisorChairperson,
        ),
    ]
    .into_iter()
    .filter_map(|(id, role)| id.as_ref().map(|id| (id, role)));

    officers.extend(listed.chain(single).map(|(id, role)| Officer {
        user_id: id.clone(),
        role,
    }));

    LlcRegistration {
        registered_capital: formation.registered_capital.max(0) as u64,
        domicile_address: formation.domicile_address.trim().to_string(),
        domicile_division_id: formation.domicile_division_id.clone(),
        domicile_division_path: formation.domicile_division_path.clone(),
        registration_authority_name: formation.registration_authority_name.clone(),
        registration_authority_company_id: formation.registration_authority_company_id.clone(),
        business_scope: formation.business_scope.trim().to_string(),
        operating_term_years: formation.operating_term_years,
        voting_rights_mode: mode,
        shareholders,
        officers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registry::domain::{HolderRef, VotingRightsMode};
    use crate::workflows::registry::intent::ShareholderIntent;
    use crate::workflows::registry::ratio::Ratio;

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    fn formation() -> LlcFormation {
        LlcFormation {
            name: "Harbor Lights LLC".to_string(),
            category: None,
            registered_capital: 1_000_000,
            domicile_address: "1 Quay Street".to_string(),
            domicile_division_id: None,
            domicile_division_path: None,
            registration_authority_name: None,
            registration_authority_company_id: None,
            business_scope: "Marine supplies".to_string(),
            operating_term_years: Some(20),
            voting_rights_mode: VotingRightsMode::ByCapital,
            shareholders: vec![
                ShareholderIntent {
                    holder: HolderRef::user(&user("u-1")),
                    ratio: Ratio::from_basis_points(6000),
                    voting_ratio: None,
                },
                ShareholderIntent {
                    holder: HolderRef::user(&user("u-2")),
                    ratio: Ratio::from_basis_points(4000),
                    voting_ratio: None,
                },
            ],
            director_ids: vec![user("d-1")],
            chairperson_id: None,
            vice_chairperson_id: None,
            manager_id: Some(user("m-1")),
            deputy_manager_id: None,
            financial_officer_id: None,
            supervisor_ids: vec![user("s-1")],
            supervisor_chairperson_id: None,
            legal_representative_id: user("d-1"),
        }
    }

    #[test]
    fn accepts_single_director_board() {
        assert_eq!(check(&formation()), Ok(()));
    }

    #[test]
    fn board_of_three_needs_a_director_chairperson() {
        let mut candidate = formation();
        candidate.director_ids = vec![user("d-1"), user("d-2"), user("d-3")];
        assert_eq!(check(&candidate), Err(ValidationError::ChairpersonRequired));

        candidate.chairperson_id = Some(user("m-1"));
        assert_eq!(
            check(&candidate),
            Err(ValidationError::ChairpersonNotDirector(user("m-1")))
        );

        candidate.chairperson_id = Some(user("d-2"));
        assert_eq!(check(&candidate), Ok(()));
    }

    #[test]
    fn legal_representative_may_be_the_manager() {
        let mut candidate = formation();
        candidate.legal_representative_id = user("m-1");
        assert_eq!(check(&candidate), Ok(()));

        candidate.legal_representative_id = user("s-1");
        assert_eq!(
            check(&candidate),
            Err(ValidationError::LegalRepresentativeIneligible(user("s-1")))
        );
    }

    #[test]
    fn supervisors_stay_out_of_management() {
        let mut candidate = formation();
        candidate.supervisor_ids.push(user("m-1"));
        assert_eq!(
            check(&candidate),
            Err(ValidationError::SupervisorOverlap(user("m-1")))
        );
    }

    #[test]
    fn custom_voting_must_sum_to_whole() {
        let mut candidate = formation();
        candidate.voting_rights_mode = VotingRightsMode::Custom;
        candidate.shareholders[0].voting_ratio = Some(Ratio::from_basis_points(5000));
        candidate.shareholders[1].voting_ratio = Some(Ratio::from_basis_points(4000));
        assert!(matches!(
            check(&candidate),
            Err(ValidationError::RatioSum {
                field: "voting_ratio",
                ..
            })
        ));
    }

    #[test]
    fn registration_mirrors_capital_into_voting_weight() {
        let registration = registration_from(&formation());
        assert_eq!(
            registration.shareholders[0].voting_ratio,
            Ratio::from_basis_points(6000)
        );
        assert_eq!(
            registration.holder_of(OfficerRole::LegalRepresentative),
            Some(user("d-1"))
        );
        assert_eq!(registration.holders_of(OfficerRole::Supervisor), vec![user("s-1")]);
        assert_eq!(registration.check_invariants(), Ok(()));
    }
}
