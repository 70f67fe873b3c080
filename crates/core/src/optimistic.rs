//! Optimistic document toggle with undo.
//!
//! Flipping a document's status updates the local row immediately and emits the forward
//! mutation. The toggle then settles as committed (the store acknowledged) or reverted (the
//! store failed, or the user undid it), in which case the local row is restored and the
//! inverse mutation is emitted.

use crate::model::Referral;
use crate::mutation::{DocumentStatusPatch, Mutation};
use crate::{TrackerError, TrackerResult};
use tracker_types::DocumentStatus;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleState {
    Pending,
    Committed,
    Reverted,
}

#[derive(Clone, Debug)]
pub struct OptimisticToggle {
    order_id: Uuid,
    document_key: String,
    previous: Option<DocumentStatus>,
    next: DocumentStatus,
    state: ToggleState,
}

impl OptimisticToggle {
    /// `Complete` flips to `Pending`; anything else flips to `Complete`.
    pub fn flipped(current: Option<&DocumentStatus>) -> DocumentStatus {
        match current {
            Some(status) if status.is_complete() => DocumentStatus::Pending,
            _ => DocumentStatus::Complete,
        }
    }

    /// Apply the flip to `referral` locally and return the toggle plus its forward mutation.
    pub fn begin(referral: &mut Referral, document_key: &str) -> (Self, Mutation) {
        let previous = referral.document_status.get(document_key).cloned();
        let next = Self::flipped(previous.as_ref());
        referral.document_status.insert(document_key.to_owned(), next.clone());

        let toggle = Self {
            order_id: referral.id,
            document_key: document_key.to_owned(),
            previous,
            next: next.clone(),
            state: ToggleState::Pending,
        };
        let forward = toggle.patch(Some(next));
        (toggle, forward)
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    pub fn commit(&mut self) -> TrackerResult<()> {
        self.settle(ToggleState::Committed)
    }

    /// Restore the previous status on `referral` and return the inverse mutation.
    ///
    /// The inverse is only sent to the store when the forward mutation was committed; a
    /// pending toggle whose forward request failed just restores the local row.
    pub fn revert(&mut self, referral: &mut Referral) -> TrackerResult<Option<Mutation>> {
        if referral.id != self.order_id {
            return Err(TrackerError::InvalidInput(
                "toggle belongs to a different referral".into(),
            ));
        }
        let was = self.state;
        self.settle_from(was, ToggleState::Reverted)?;

        match &self.previous {
            Some(status) => {
                referral.document_status.insert(self.document_key.clone(), status.clone());
            }
            None => {
                referral.document_status.remove(&self.document_key);
            }
        }

        Ok((was == ToggleState::Committed).then(|| self.patch(self.previous.clone())))
    }

    fn settle(&mut self, to: ToggleState) -> TrackerResult<()> {
        self.settle_from(self.state, to)
    }

    fn settle_from(&mut self, from: ToggleState, to: ToggleState) -> TrackerResult<()> {
        let allowed = matches!(
            (from, to),
            (ToggleState::Pending, ToggleState::Committed)
                | (ToggleState::Pending, ToggleState::Reverted)
                | (ToggleState::Committed, ToggleState::Reverted)
        );
        if !allowed {
            return Err(TrackerError::InvalidTransition(format!(
                "{:?} -> {:?} for document {}",
                from, to, self.document_key
            )));
        }
        self.state = to;
        Ok(())
    }

    fn patch(&self, status: Option<DocumentStatus>) -> Mutation {
        let mut document_status = DocumentStatusPatch::new();
        document_status.insert(self.document_key.clone(), status);
        Mutation::UpsertDocumentStatus {
            order_id: self.order_id,
            document_status,
        }
    }

    pub fn next(&self) -> &DocumentStatus {
        &self.next
    }
}
