use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::{aggregate, AggregationRule, ConsentError, ConsentItem, ConsentRequirement};
use crate::workflows::engine::RepositoryError;
use crate::workflows::registry::domain::{ApplicationId, ConsentStatus, UserId};
use crate::workflows::registry::repository::RegistryTx;

/// Per-status counts plus the stored verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsentSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub verdict: ConsentStatus,
}

impl ConsentSummary {
    pub fn from_items(items: &[ConsentItem], verdict: ConsentStatus) -> Self {
        let count = |status: ConsentStatus| items.iter().filter(|item| item.status == status).count();
        Self {
            total: items.len(),
            pending: count(ConsentStatus::Pending),
            approved: count(ConsentStatus::Approved),
            rejected: count(ConsentStatus::Rejected),
            verdict,
        }
    }
}

/// Ledger operations over an open unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsentLedger;

impl ConsentLedger {
    /// Inserts each requirement whose natural key is not already present.
    /// Returns the rows that were created.
    pub fn seed(
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
        requirements: Vec<ConsentRequirement>,
    ) -> Result<Vec<ConsentItem>, ConsentError> {
        let mut existing: Vec<ConsentRequirement> = tx
            .consent_items(application_id)?
            .into_iter()
            .map(|item| item.requirement)
            .collect();

        let now = Utc::now();
        let mut created = Vec::new();
        for requirement in requirements {
            if existing.contains(&requirement) {
                continue;
            }
            let item = ConsentItem {
                id: tx.allocate_id("ci"),
                application_id: application_id.clone(),
                requirement: requirement.clone(),
                status: ConsentStatus::Pending,
                decided_at: None,
                comment: None,
                created_at: now,
            };
            tx.insert_consent_item(item.clone())?;
            existing.push(requirement);
            created.push(item);
        }

        debug!(application = %application_id, seeded = created.len(), "consent ledger seeded");
        Ok(created)
    }

    /// Settles every pending row held by `user_id` with the same decision.
    pub fn decide(
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
        user_id: &UserId,
        approve: bool,
        comment: Option<&str>,
    ) -> Result<Vec<ConsentItem>, ConsentError> {
        let status = if approve {
            ConsentStatus::Approved
        } else {
            ConsentStatus::Rejected
        };
        let now = Utc::now();

        let mut decided = Vec::new();
        for mut item in tx.consent_items(application_id)? {
            if !item.is_pending() || &item.requirement.required_user_id != user_id {
                continue;
            }
            item.status = status;
            item.decided_at = Some(now);
            item.comment = comment.map(str::to_string);
            tx.update_consent_item(item.clone())?;
            decided.push(item);
        }

        if decided.is_empty() {
            return Err(ConsentError::NoPendingItems {
                application: application_id.clone(),
                user: user_id.clone(),
            });
        }
        Ok(decided)
    }

    /// Recomputes the verdict against the company's current cap table and
    /// stores it on the application.
    pub fn recompute_progress(
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
        rule: AggregationRule,
    ) -> Result<ConsentStatus, ConsentError> {
        let mut application = tx
            .application(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        let shareholders = tx
            .company(&application.company_id)?
            .map(|company| company.shareholders().to_vec())
            .unwrap_or_default();
        let items = tx.consent_items(application_id)?;

        let verdict = aggregate(rule, &items, &shareholders);
        debug!(
            application = %application_id,
            rule = rule.key(),
            verdict = verdict.label(),
            "consent progress recomputed"
        );

        if application.consent_status != verdict {
            let now = Utc::now();
            application.consent_status = verdict;
            application.consent_completed_at = verdict.is_terminal().then_some(now);
            application.updated_at = now;
            tx.update_application(application)?;
        }
        Ok(verdict)
    }

    /// Soft reset used by withdrawal: every still-pending row becomes rejected.
    pub fn reject_pending(
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
        comment: Option<&str>,
    ) -> Result<usize, ConsentError> {
        let now = Utc::now();
        let mut touched = 0;
        for mut item in tx.consent_items(application_id)? {
            if !item.is_pending() {
                continue;
            }
            item.status = ConsentStatus::Rejected;
            item.decided_at = Some(now);
            item.comment = comment.map(str::to_string);
            tx.update_consent_item(item)?;
            touched += 1;
        }
        Ok(touched)
    }

    /// Hard reset used by resubmission.
    pub fn clear(
        tx: &mut dyn RegistryTx,
        application_id: &ApplicationId,
    ) -> Result<usize, ConsentError> {
        Ok(tx.delete_consent_items(application_id)?)
    }
}
