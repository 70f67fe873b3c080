//! Row selection for bulk actions.
//!
//! An explicit container owned by whoever drives the view, rather than shared global state.

use crate::model::Referral;
use crate::mutation::{plan_bulk_stage_change, BulkStageChange, Mutation, StageChange};
use crate::stages::StageOrder;
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracker_types::DocumentStatus;
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<Uuid>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip one row; returns whether it is now selected.
    pub fn toggle(&mut self, id: Uuid) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    pub fn select_visible(&mut self, visible: &[&Referral]) {
        self.ids.extend(visible.iter().map(|r| r.id));
    }

    /// Drop selected ids that are no longer in the visible set.
    pub fn retain_visible(&mut self, visible: &[&Referral]) {
        let shown: BTreeSet<Uuid> = visible.iter().map(|r| r.id).collect();
        self.ids.retain(|id| shown.contains(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.ids.iter().copied().collect()
    }

    pub fn bulk_archive(&self, archived: bool) -> TrackerResult<Mutation> {
        Ok(Mutation::BulkSetArchived {
            order_ids: self.non_empty_ids()?,
            archived,
        })
    }

    /// Plan a stage move for every selected referral, recording regressions for backward moves.
    pub fn bulk_stage(
        &self,
        stages: &StageOrder,
        snapshot: &[Referral],
        change: StageChange<'_>,
        now: DateTime<Utc>,
    ) -> TrackerResult<Vec<Mutation>> {
        let order_ids = self.non_empty_ids()?;
        let bulk = BulkStageChange {
            order_ids: &order_ids,
            new_stage: change.new_stage,
            note: change.note,
            reason: change.reason,
            actor: change.actor,
        };
        plan_bulk_stage_change(stages, snapshot, bulk, now)
    }

    pub fn bulk_documents(
        &self,
        document_keys: Vec<String>,
        status: DocumentStatus,
    ) -> TrackerResult<Mutation> {
        Ok(Mutation::BulkDocumentStatus {
            order_ids: self.non_empty_ids()?,
            document_keys,
            status,
        })
    }

    fn non_empty_ids(&self) -> TrackerResult<Vec<Uuid>> {
        if self.ids.is_empty() {
            return Err(TrackerError::InvalidInput("no referrals selected".into()));
        }
        Ok(self.ids())
    }
}
