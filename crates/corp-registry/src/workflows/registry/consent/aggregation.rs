use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{ConsentItem, ConsentRole};
use crate::workflows::registry::domain::{ConsentStatus, HolderRef, Shareholder, UserId};

/// Quorum rule a change kind is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationRule {
    /// Every row must approve.
    Unanimous,
    /// Two thirds of current voting weight.
    VotingSupermajority,
    /// Half of current voting weight, plus every nominated director and supervisor.
    VotingMajorityWithOfficers,
    /// Half of the directors by head count, plus every nominated manager-tier officer.
    DirectorHeadcountWithManagers,
}

impl AggregationRule {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Unanimous => "unanimous",
            Self::VotingSupermajority => "voting_supermajority",
            Self::VotingMajorityWithOfficers => "voting_majority_with_officers",
            Self::DirectorHeadcountWithManagers => "director_headcount_with_managers",
        }
    }

    /// Rules whose rejection closes the application without a reviewer.
    pub const fn terminates_on_rejection(self) -> bool {
        !matches!(self, Self::Unanimous)
    }
}

#[derive(Debug, Clone, Copy)]
enum Threshold {
    TwoThirds,
    Half,
}

impl Threshold {
    fn reached(self, part: u64, total: u64) -> bool {
        match self {
            Self::TwoThirds => part * 3 >= total * 2,
            Self::Half => part * 2 >= total,
        }
    }
}

/// Computes the aggregate verdict of a ledger.
///
/// `shareholders` is the company's current cap table; weighted rules read
/// voting weight from it, never from the ledger.
pub fn aggregate(
    rule: AggregationRule,
    items: &[ConsentItem],
    shareholders: &[Shareholder],
) -> ConsentStatus {
    match rule {
        AggregationRule::Unanimous => unanimous(items.iter()),
        AggregationRule::VotingSupermajority => {
            weighted(items, shareholders, Threshold::TwoThirds)
        }
        AggregationRule::VotingMajorityWithOfficers => {
            let weighted = weighted(items, shareholders, Threshold::Half);
            let officers = unanimous(items.iter().filter(|item| {
                matches!(
                    item.requirement.role,
                    ConsentRole::Director | ConsentRole::Supervisor
                )
            }));
            combine(weighted, officers)
        }
        AggregationRule::DirectorHeadcountWithManagers => {
            let directors = headcount(items);
            let managers = unanimous(items.iter().filter(|item| {
                matches!(
                    item.requirement.role,
                    ConsentRole::Manager | ConsentRole::DeputyManager | ConsentRole::FinancialOfficer
                )
            }));
            combine(directors, managers)
        }
    }
}

/// Rejected outranks pending, which outranks approved.
fn dominant(current: ConsentStatus, next: ConsentStatus) -> ConsentStatus {
    fn rank(status: ConsentStatus) -> u8 {
        match status {
            ConsentStatus::Approved => 0,
            ConsentStatus::Pending => 1,
            ConsentStatus::Rejected => 2,
        }
    }
    if rank(next) > rank(current) {
        next
    } else {
        current
    }
}

fn combine(left: ConsentStatus, right: ConsentStatus) -> ConsentStatus {
    dominant(left, right)
}

fn unanimous<'a>(items: impl Iterator<Item = &'a ConsentItem>) -> ConsentStatus {
    items.fold(ConsentStatus::Approved, |verdict, item| {
        dominant(verdict, item.status)
    })
}

fn weighted(items: &[ConsentItem], shareholders: &[Shareholder], threshold: Threshold) -> ConsentStatus {
    let weights: BTreeMap<&HolderRef, u64> = shareholders
        .iter()
        .filter(|shareholder| !shareholder.voting_ratio.is_zero())
        .map(|shareholder| {
            (
                &shareholder.holder,
                u64::from(shareholder.voting_ratio.basis_points()),
            )
        })
        .collect();
    let total: u64 = weights.values().sum();
    if total == 0 {
        return unanimous(items.iter());
    }

    let cap_table: BTreeSet<&HolderRef> = shareholders.iter().map(|holder| &holder.holder).collect();

    let mut observed: BTreeMap<HolderRef, ConsentStatus> = BTreeMap::new();
    let mut outsiders = ConsentStatus::Approved;
    for item in items {
        match item.holder() {
            Some(holder) if cap_table.contains(&holder) => {
                observed
                    .entry(holder)
                    .and_modify(|status| *status = dominant(*status, item.status))
                    .or_insert(item.status);
            }
            _ => outsiders = dominant(outsiders, item.status),
        }
    }

    let mut approved = 0u64;
    let mut pending = 0u64;
    for (holder, weight) in &weights {
        match observed
            .get(*holder)
            .copied()
            .unwrap_or(ConsentStatus::Pending)
        {
            ConsentStatus::Approved => approved += weight,
            ConsentStatus::Pending => pending += weight,
            ConsentStatus::Rejected => {}
        }
    }

    if outsiders == ConsentStatus::Rejected || !threshold.reached(approved + pending, total) {
        ConsentStatus::Rejected
    } else if threshold.reached(approved, total) && outsiders == ConsentStatus::Approved {
        ConsentStatus::Approved
    } else {
        ConsentStatus::Pending
    }
}

fn headcount(items: &[ConsentItem]) -> ConsentStatus {
    let mut directors: BTreeMap<&UserId, ConsentStatus> = BTreeMap::new();
    for item in items
        .iter()
        .filter(|item| item.requirement.role == ConsentRole::Director)
    {
        directors
            .entry(&item.requirement.required_user_id)
            .and_modify(|status| *status = dominant(*status, item.status))
            .or_insert(item.status);
    }
    if directors.is_empty() {
        return ConsentStatus::Approved;
    }

    let total = directors.len();
    let threshold = total.div_ceil(2);
    let approved = directors
        .values()
        .filter(|status| **status == ConsentStatus::Approved)
        .count();
    let pending = directors
        .values()
        .filter(|status| **status == ConsentStatus::Pending)
        .count();

    if approved + pending < threshold {
        ConsentStatus::Rejected
    } else if approved >= threshold {
        ConsentStatus::Approved
    } else {
        ConsentStatus::Pending
    }
}
