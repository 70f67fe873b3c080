//! Mutation dispatch.
//!
//! A user action maps to one or more [`Mutation`] requests sent in order. No retries, chunking
//! or rollback: a failure stops the action and is reported once. Any applied request
//! invalidates the snapshot cache so the next read sees fresh data.

use crate::cache::SnapshotCache;
use crate::mutation::{Mutation, MutationAck};
use crate::store::RecordStore;
use crate::{TrackerError, TrackerResult};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// The single transient message shown for one action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn failure(action: &str, err: &TrackerError) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: format!("{action} failed: {err}"),
        }
    }

    pub fn for_result(action: &str, result: &TrackerResult<MutationAck>) -> Self {
        match result {
            Ok(_) => Self::success(action),
            Err(err) => Self::failure(action, err),
        }
    }
}

#[derive(Clone)]
pub struct MutationDispatcher {
    store: Arc<dyn RecordStore>,
    cache: Arc<SnapshotCache>,
}

impl MutationDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<SnapshotCache>) -> Self {
        Self { store, cache }
    }

    /// Send `mutations` for one action, in order.
    ///
    /// Returns the summed acknowledgement. Stops at the first failure; requests already
    /// applied stay applied.
    pub fn dispatch(&self, mutations: &[Mutation]) -> TrackerResult<MutationAck> {
        let Some(action) = action_label(mutations) else {
            return Err(TrackerError::InvalidInput("nothing to dispatch".into()));
        };

        let mut total = MutationAck::default();
        let mut applied_any = false;
        let mut outcome = Ok(());

        for mutation in mutations {
            match self.store.apply(mutation) {
                Ok(ack) => {
                    total.affected += ack.affected;
                    applied_any = true;
                }
                Err(err) => {
                    tracing::error!(action = %action, error = %err, "mutation failed");
                    outcome = Err(err);
                    break;
                }
            }
        }

        if applied_any {
            self.cache.invalidate();
        }

        outcome?;
        tracing::info!(action = %action, affected = total.affected, "mutation applied");
        Ok(total)
    }

    /// [`dispatch`](Self::dispatch) plus the notification for the action.
    pub fn dispatch_notify(
        &self,
        mutations: &[Mutation],
    ) -> (Notification, TrackerResult<MutationAck>) {
        let action = action_label(mutations).unwrap_or_else(|| "Update".to_string());
        let result = self.dispatch(mutations);
        (Notification::for_result(&action, &result), result)
    }
}

/// Names the action after the request the user asked for; regression records only accompany it.
fn action_label(mutations: &[Mutation]) -> Option<String> {
    mutations
        .iter()
        .find(|m| !matches!(m, Mutation::InsertRegression(_)))
        .or_else(|| mutations.first())
        .map(Mutation::describe)
}
