use super::common::*;
use crate::workflows::registry::consent::{aggregate, AggregationRule, ConsentRole};
use crate::workflows::registry::domain::{ConsentStatus, HolderRef};

#[test]
fn minority_rejection_blocks_two_thirds() {
    let company = company_with(&[60, 40]);
    let items = vec![
        shareholder_item("u1", ConsentStatus::Approved),
        shareholder_item("u2", ConsentStatus::Rejected),
    ];
    assert_eq!(
        aggregate(
            AggregationRule::VotingSupermajority,
            &items,
            company.shareholders()
        ),
        ConsentStatus::Rejected
    );
}

#[test]
fn majority_holder_alone_keeps_two_thirds_pending() {
    let company = company_with(&[60, 40]);
    let items = vec![
        shareholder_item("u1", ConsentStatus::Approved),
        shareholder_item("u2", ConsentStatus::Pending),
    ];
    assert_eq!(
        aggregate(
            AggregationRule::VotingSupermajority,
            &items,
            company.shareholders()
        ),
        ConsentStatus::Pending
    );
}

#[test]
fn weight_comes_from_current_cap_table() {
    let items = vec![
        shareholder_item("u1", ConsentStatus::Approved),
        shareholder_item("u2", ConsentStatus::Pending),
    ];
    let before = company_with(&[60, 40]);
    let after = company_with(&[70, 30]);

    assert_eq!(
        aggregate(AggregationRule::VotingSupermajority, &items, before.shareholders()),
        ConsentStatus::Pending
    );
    assert_eq!(
        aggregate(AggregationRule::VotingSupermajority, &items, after.shareholders()),
        ConsentStatus::Approved
    );
}

#[test]
fn nominated_director_must_approve_alongside_majority() {
    let company = company_with(&[50, 50]);
    let mut items = vec![
        shareholder_item("u1", ConsentStatus::Approved),
        shareholder_item("u2", ConsentStatus::Pending),
        item("d2", ConsentRole::Director, None, ConsentStatus::Pending),
    ];
    let rule = AggregationRule::VotingMajorityWithOfficers;

    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Pending
    );

    items[2].status = ConsentStatus::Approved;
    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Approved
    );

    items[2].status = ConsentStatus::Rejected;
    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Rejected
    );
}

#[test]
fn director_headcount_rounds_half_up() {
    let company = company_with(&[100]);
    let mut items = vec![
        item("d1", ConsentRole::Director, None, ConsentStatus::Approved),
        item("d2", ConsentRole::Director, None, ConsentStatus::Pending),
        item("d3", ConsentRole::Director, None, ConsentStatus::Pending),
        item("m2", ConsentRole::Manager, None, ConsentStatus::Approved),
    ];
    let rule = AggregationRule::DirectorHeadcountWithManagers;
    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Pending
    );

    items[1].status = ConsentStatus::Approved;
    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Approved
    );

    items[1].status = ConsentStatus::Rejected;
    items[2].status = ConsentStatus::Rejected;
    assert_eq!(
        aggregate(rule, &items, company.shareholders()),
        ConsentStatus::Rejected
    );
}

#[test]
fn company_holder_weight_is_carried_by_its_representative() {
    let parent = HolderRef::company(&crate::workflows::registry::domain::CompanyId(
        PARENT.to_string(),
    ));
    let company = company(
        COMPANY,
        vec![
            holding(HolderRef::user(&user("u1")), 30),
            holding(parent.clone(), 70),
        ],
    );
    let items = vec![
        shareholder_item("u1", ConsentStatus::Pending),
        item(
            "parent-legal",
            ConsentRole::ShareholderCompanyLegal,
            Some(parent),
            ConsentStatus::Approved,
        ),
    ];
    assert_eq!(
        aggregate(
            AggregationRule::VotingSupermajority,
            &items,
            company.shareholders()
        ),
        ConsentStatus::Approved
    );
}

#[test]
fn empty_cap_table_falls_back_to_every_row() {
    let items = vec![
        item("d1", ConsentRole::LegalRepresentative, None, ConsentStatus::Approved),
        item("s1", ConsentRole::Supervisor, None, ConsentStatus::Pending),
    ];
    assert_eq!(
        aggregate(AggregationRule::VotingSupermajority, &items, &[]),
        ConsentStatus::Pending
    );
}

#[test]
fn zero_weight_holder_carries_no_vote() {
    let company = company_with(&[100, 0]);
    let rejecting_bystander = vec![
        shareholder_item("u1", ConsentStatus::Approved),
        shareholder_item("u2", ConsentStatus::Rejected),
    ];
    assert_eq!(
        aggregate(
            AggregationRule::VotingSupermajority,
            &rejecting_bystander,
            company.shareholders()
        ),
        ConsentStatus::Approved
    );
    assert_eq!(
        aggregate(
            AggregationRule::VotingMajorityWithOfficers,
            &rejecting_bystander,
            company.shareholders()
        ),
        ConsentStatus::Approved
    );

    let undecided_owner = vec![
        shareholder_item("u1", ConsentStatus::Pending),
        shareholder_item("u2", ConsentStatus::Rejected),
    ];
    assert_eq!(
        aggregate(
            AggregationRule::VotingSupermajority,
            &undecided_owner,
            company.shareholders()
        ),
        ConsentStatus::Pending
    );
}
