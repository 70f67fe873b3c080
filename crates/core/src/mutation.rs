//! Mutation request shapes sent to the record store.
//!
//! Each variant is one request/acknowledgement pair. Bulk variants are never chunked; the
//! store applies them in one call and reports how many rows it touched.

use crate::model::{Referral, Regression};
use crate::stages::StageOrder;
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracker_types::{DocumentStatus, NonEmptyText};
use uuid::Uuid;

/// Partial document-status update. `None` removes the key.
pub type DocumentStatusPatch = BTreeMap<String, Option<DocumentStatus>>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    UpdateStage {
        order_id: Uuid,
        stage: String,
        note: Option<String>,
    },
    BulkUpdateStage {
        order_ids: Vec<Uuid>,
        stage: String,
        note: Option<String>,
    },
    InsertRegression(Regression),
    SetArchived {
        order_id: Uuid,
        archived: bool,
    },
    BulkSetArchived {
        order_ids: Vec<Uuid>,
        archived: bool,
    },
    UpsertDocumentStatus {
        order_id: Uuid,
        document_status: DocumentStatusPatch,
    },
    /// Irreversible; the store also removes the referral's dependents.
    DeleteReferral {
        order_id: Uuid,
    },
    BulkDocumentStatus {
        order_ids: Vec<Uuid>,
        document_keys: Vec<String>,
        status: DocumentStatus,
    },
}

impl Mutation {
    /// Short human label used in notifications and logs.
    pub fn describe(&self) -> String {
        match self {
            Mutation::UpdateStage { stage, .. } => format!("Moved referral to {stage}"),
            Mutation::BulkUpdateStage {
                order_ids, stage, ..
            } => format!("Moved {} referrals to {stage}", order_ids.len()),
            Mutation::InsertRegression(r) => {
                format!("Recorded regression {} -> {}", r.previous_stage, r.new_stage)
            }
            Mutation::SetArchived { archived: true, .. } => "Archived referral".into(),
            Mutation::SetArchived { archived: false, .. } => "Restored referral".into(),
            Mutation::BulkSetArchived {
                order_ids,
                archived,
            } => format!(
                "{} {} referrals",
                if *archived { "Archived" } else { "Restored" },
                order_ids.len()
            ),
            Mutation::UpsertDocumentStatus { .. } => "Updated documents".into(),
            Mutation::DeleteReferral { .. } => "Deleted referral".into(),
            Mutation::BulkDocumentStatus {
                order_ids,
                document_keys,
                status,
            } => format!(
                "Marked {} documents {status} on {} referrals",
                document_keys.len(),
                order_ids.len()
            ),
        }
    }

    /// Shape checks that do not need the current records.
    pub fn validate(&self, stages: &StageOrder) -> TrackerResult<()> {
        match self {
            Mutation::UpdateStage { stage, .. } => stages.validate(stage),
            Mutation::BulkUpdateStage {
                order_ids, stage, ..
            } => {
                require_ids(order_ids)?;
                stages.validate(stage)
            }
            Mutation::InsertRegression(r) => {
                if !stages.is_regression(&r.previous_stage, &r.new_stage)? {
                    return Err(TrackerError::InvalidInput(format!(
                        "{} -> {} is not a backward move",
                        r.previous_stage, r.new_stage
                    )));
                }
                NonEmptyText::new(&r.reason)?;
                Ok(())
            }
            Mutation::BulkSetArchived { order_ids, .. } => require_ids(order_ids),
            Mutation::UpsertDocumentStatus {
                document_status, ..
            } => {
                if document_status.is_empty() {
                    return Err(TrackerError::InvalidInput(
                        "document status patch is empty".into(),
                    ));
                }
                Ok(())
            }
            Mutation::BulkDocumentStatus {
                order_ids,
                document_keys,
                ..
            } => {
                require_ids(order_ids)?;
                if document_keys.is_empty() {
                    return Err(TrackerError::InvalidInput(
                        "bulk document update needs at least one document key".into(),
                    ));
                }
                Ok(())
            }
            Mutation::SetArchived { .. } | Mutation::DeleteReferral { .. } => Ok(()),
        }
    }
}

fn require_ids(order_ids: &[Uuid]) -> TrackerResult<()> {
    if order_ids.is_empty() {
        return Err(TrackerError::InvalidInput(
            "bulk operation needs at least one referral id".into(),
        ));
    }
    Ok(())
}

/// Store acknowledgement for one request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MutationAck {
    pub affected: usize,
}

/// A requested stage move for one referral.
#[derive(Clone, Debug)]
pub struct StageChange<'a> {
    pub new_stage: &'a str,
    pub note: Option<String>,
    /// Mandatory when the move is a regression.
    pub reason: Option<String>,
    pub actor: &'a str,
}

/// Mutations needed to move `referral` to a new stage.
///
/// A forward move is a single `UpdateStage`. A backward move must carry a non-empty reason and
/// writes its `Regression` record first; the store refuses a backward `UpdateStage` without one.
///
/// # Errors
///
/// - [`TrackerError::InvalidStage`] if either stage is not configured
/// - [`TrackerError::InvalidInput`] if the referral is already at that stage
/// - [`TrackerError::RegressionReasonRequired`] for a backward move without a reason
pub fn plan_stage_change(
    stages: &StageOrder,
    referral: &Referral,
    change: StageChange<'_>,
    now: DateTime<Utc>,
) -> TrackerResult<Vec<Mutation>> {
    let current = referral.stage.as_str();
    if current == change.new_stage {
        return Err(TrackerError::InvalidInput(format!("referral is already at {current}")));
    }

    let reason = non_empty_reason(change.reason.as_deref());
    let mut plan = Vec::with_capacity(2);
    if stages.is_regression(current, change.new_stage)? {
        plan.push(regression_record(
            referral,
            change.new_stage,
            reason.as_ref(),
            change.actor,
            now,
        )?);
    }

    plan.push(Mutation::UpdateStage {
        order_id: referral.id,
        stage: change.new_stage.to_owned(),
        note: change.note,
    });
    Ok(plan)
}

/// A requested stage move for several referrals at once.
#[derive(Clone, Debug)]
pub struct BulkStageChange<'a> {
    pub order_ids: &'a [Uuid],
    pub new_stage: &'a str,
    pub note: Option<String>,
    /// Shared by every referral the move takes backwards.
    pub reason: Option<String>,
    pub actor: &'a str,
}

/// Mutations for a bulk stage move over referrals in `snapshot`.
///
/// One `InsertRegression` per referral that moves backwards, then a single `BulkUpdateStage`.
/// Referrals already at the target stage are left in the request; the store only touches
/// their note.
///
/// # Errors
///
/// - [`TrackerError::InvalidInput`] for an empty id list
/// - [`TrackerError::InvalidStage`] if the target stage is not configured
/// - [`TrackerError::NotFound`] if an id is not in `snapshot`
/// - [`TrackerError::RegressionReasonRequired`] if any move is backward and no reason is given
pub fn plan_bulk_stage_change(
    stages: &StageOrder,
    snapshot: &[Referral],
    change: BulkStageChange<'_>,
    now: DateTime<Utc>,
) -> TrackerResult<Vec<Mutation>> {
    require_ids(change.order_ids)?;
    stages.validate(change.new_stage)?;

    let reason = non_empty_reason(change.reason.as_deref());
    let mut plan = Vec::new();
    for id in change.order_ids {
        let referral = snapshot
            .iter()
            .find(|r| r.id == *id)
            .ok_or(TrackerError::NotFound(*id))?;
        if stages.is_regression(&referral.stage, change.new_stage)? {
            plan.push(regression_record(
                referral,
                change.new_stage,
                reason.as_ref(),
                change.actor,
                now,
            )?);
        }
    }

    plan.push(Mutation::BulkUpdateStage {
        order_ids: change.order_ids.to_vec(),
        stage: change.new_stage.to_owned(),
        note: change.note,
    });
    Ok(plan)
}

fn non_empty_reason(reason: Option<&str>) -> Option<NonEmptyText> {
    reason.and_then(|r| NonEmptyText::new(r).ok())
}

fn regression_record(
    referral: &Referral,
    new_stage: &str,
    reason: Option<&NonEmptyText>,
    actor: &str,
    now: DateTime<Utc>,
) -> TrackerResult<Mutation> {
    let reason = reason.ok_or_else(|| TrackerError::RegressionReasonRequired {
        from: referral.stage.clone(),
        to: new_stage.to_owned(),
    })?;

    Ok(Mutation::InsertRegression(Regression {
        id: Uuid::new_v4(),
        order_id: referral.id,
        previous_stage: referral.stage.clone(),
        new_stage: new_stage.to_owned(),
        reason: reason.as_str().to_owned(),
        user: actor.to_owned(),
        created_at: now,
    }))
}
