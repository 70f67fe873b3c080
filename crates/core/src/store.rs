//! Record store boundary.
//!
//! The hosted backend is external; [`RecordStore`] is the seam the rest of the workspace talks
//! to. [`InMemoryStore`] implements it over a JSON seed so the REST server, CLI and tests run
//! without a backend.
//!
//! Seed format:
//!
//! ```json
//! { "referrals": [ { "id": "...", "patient": { ... }, "stage": "Intake", ... } ],
//!   "regressions": [] }
//! ```

use crate::model::{Referral, Regression, StageTransition};
use crate::mutation::{Mutation, MutationAck};
use crate::stages::StageOrder;
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Read and write access to referral records.
pub trait RecordStore: Send + Sync {
    /// One unfiltered read of every referral with its joined patient.
    fn fetch_referrals(&self) -> TrackerResult<Vec<Referral>>;

    fn fetch_regressions(&self, order_id: Uuid) -> TrackerResult<Vec<Regression>>;

    /// Apply one request. Bulk requests are applied in a single call.
    fn apply(&self, mutation: &Mutation) -> TrackerResult<MutationAck>;
}

/// On-disk seed for [`InMemoryStore`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub referrals: Vec<Referral>,
    #[serde(default)]
    pub regressions: Vec<Regression>,
}

#[derive(Debug, Default)]
struct Tables {
    referrals: Vec<Referral>,
    regressions: Vec<Regression>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    stages: StageOrder,
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Builds a store from seed data, rejecting referrals at unconfigured stages.
    pub fn new(stages: StageOrder, seed: SeedData) -> TrackerResult<Self> {
        for referral in &seed.referrals {
            stages.validate(&referral.stage)?;
        }

        tracing::info!(
            referrals = seed.referrals.len(),
            regressions = seed.regressions.len(),
            "loaded record store seed"
        );

        Ok(Self {
            stages,
            tables: RwLock::new(Tables {
                referrals: seed.referrals,
                regressions: seed.regressions,
            }),
        })
    }

    pub fn from_json_file(stages: StageOrder, path: &Path) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(TrackerError::FileRead)?;
        let seed: SeedData = serde_json::from_str(&text).map_err(TrackerError::Deserialization)?;
        Self::new(stages, seed)
    }

    pub fn stages(&self) -> &StageOrder {
        &self.stages
    }

    fn read(&self) -> TrackerResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| TrackerError::StoreUnavailable("record tables lock poisoned".into()))
    }

    fn write(&self) -> TrackerResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| TrackerError::StoreUnavailable("record tables lock poisoned".into()))
    }
}

impl RecordStore for InMemoryStore {
    fn fetch_referrals(&self) -> TrackerResult<Vec<Referral>> {
        Ok(self.read()?.referrals.clone())
    }

    fn fetch_regressions(&self, order_id: Uuid) -> TrackerResult<Vec<Regression>> {
        Ok(self
            .read()?
            .regressions
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    fn apply(&self, mutation: &Mutation) -> TrackerResult<MutationAck> {
        mutation.validate(&self.stages)?;

        let mut tables = self.write()?;
        let now = Utc::now();

        let affected = match mutation {
            Mutation::UpdateStage {
                order_id,
                stage,
                note,
            } => {
                tables.require_recorded_regression(&self.stages, tables.find(*order_id)?, stage)?;
                let referral = tables.find_mut(*order_id)?;
                move_stage(referral, stage, note.as_deref(), now);
                1
            }
            Mutation::BulkUpdateStage {
                order_ids,
                stage,
                note,
            } => {
                for referral in tables.referrals.iter().filter(|r| order_ids.contains(&r.id)) {
                    tables.require_recorded_regression(&self.stages, referral, stage)?;
                }
                let mut affected = 0;
                for referral in tables.selected_mut(order_ids) {
                    move_stage(referral, stage, note.as_deref(), now);
                    affected += 1;
                }
                affected
            }
            Mutation::InsertRegression(regression) => {
                tables.find_mut(regression.order_id)?;
                tables.regressions.push(regression.clone());
                1
            }
            Mutation::SetArchived { order_id, archived } => {
                let referral = tables.find_mut(*order_id)?;
                referral.archived = *archived;
                referral.updated_at = now;
                1
            }
            Mutation::BulkSetArchived {
                order_ids,
                archived,
            } => {
                let mut affected = 0;
                for referral in tables.selected_mut(order_ids) {
                    referral.archived = *archived;
                    referral.updated_at = now;
                    affected += 1;
                }
                affected
            }
            Mutation::UpsertDocumentStatus {
                order_id,
                document_status,
            } => {
                let referral = tables.find_mut(*order_id)?;
                for (key, status) in document_status {
                    match status {
                        Some(status) => {
                            referral.document_status.insert(key.clone(), status.clone());
                        }
                        None => {
                            referral.document_status.remove(key);
                        }
                    }
                }
                referral.updated_at = now;
                1
            }
            Mutation::DeleteReferral { order_id } => {
                let before = tables.referrals.len();
                tables.referrals.retain(|r| r.id != *order_id);
                if tables.referrals.len() == before {
                    return Err(TrackerError::NotFound(*order_id));
                }
                tables.regressions.retain(|r| r.order_id != *order_id);
                1
            }
            Mutation::BulkDocumentStatus {
                order_ids,
                document_keys,
                status,
            } => {
                let mut affected = 0;
                for referral in tables.selected_mut(order_ids) {
                    for key in document_keys {
                        referral.document_status.insert(key.clone(), status.clone());
                    }
                    referral.updated_at = now;
                    affected += 1;
                }
                affected
            }
        };

        tracing::debug!(mutation = %mutation.describe(), affected, "applied mutation");
        Ok(MutationAck { affected })
    }
}

impl Tables {
    fn find(&self, order_id: Uuid) -> TrackerResult<&Referral> {
        self.referrals
            .iter()
            .find(|r| r.id == order_id)
            .ok_or(TrackerError::NotFound(order_id))
    }

    /// A backward move needs a matching regression recorded since the referral last changed.
    fn require_recorded_regression(
        &self,
        stages: &StageOrder,
        referral: &Referral,
        to: &str,
    ) -> TrackerResult<()> {
        if referral.stage == to || !stages.is_regression(&referral.stage, to)? {
            return Ok(());
        }

        let recorded = self.regressions.iter().any(|r| {
            r.order_id == referral.id
                && r.previous_stage == referral.stage
                && r.new_stage == to
                && r.created_at >= referral.updated_at
        });
        if recorded {
            Ok(())
        } else {
            Err(TrackerError::RegressionReasonRequired {
                from: referral.stage.clone(),
                to: to.to_owned(),
            })
        }
    }

    fn find_mut(&mut self, order_id: Uuid) -> TrackerResult<&mut Referral> {
        self.referrals
            .iter_mut()
            .find(|r| r.id == order_id)
            .ok_or(TrackerError::NotFound(order_id))
    }

    fn selected_mut<'a>(
        &'a mut self,
        order_ids: &'a [Uuid],
    ) -> impl Iterator<Item = &'a mut Referral> + 'a {
        self.referrals
            .iter_mut()
            .filter(move |r| order_ids.contains(&r.id))
    }
}

fn move_stage(referral: &mut Referral, stage: &str, note: Option<&str>, now: DateTime<Utc>) {
    if referral.stage != stage {
        referral
            .stage_history
            .push(StageTransition::new(referral.stage.clone(), stage, now));
        referral.stage = stage.to_owned();
    }
    referral.last_stage_note = note.map(str::to_owned);
    referral.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patient;
    use tracker_types::DocumentStatus;

    fn stages() -> StageOrder {
        StageOrder::new(["Intake", "Docs", "PAR"]).unwrap()
    }

    fn seeded() -> (InMemoryStore, Uuid, Uuid) {
        let a = Referral::new(Patient::new("Ada", "Lovelace"), "Intake", Utc::now());
        let b = Referral::new(Patient::new("Alan", "Turing"), "Docs", Utc::now());
        let (a_id, b_id) = (a.id, b.id);
        let store = InMemoryStore::new(
            stages(),
            SeedData {
                referrals: vec![a, b],
                regressions: vec![],
            },
        )
        .unwrap();
        (store, a_id, b_id)
    }

    fn get(store: &InMemoryStore, id: Uuid) -> Referral {
        store
            .fetch_referrals()
            .unwrap()
            .into_iter()
            .find(|r| r.id == id)
            .unwrap()
    }

    #[test]
    fn rejects_seed_with_unknown_stage() {
        let r = Referral::new(Patient::new("Ada", "Lovelace"), "Shipped", Utc::now());
        let err = InMemoryStore::new(
            stages(),
            SeedData {
                referrals: vec![r],
                regressions: vec![],
            },
        )
        .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidStage(_)));
    }

    #[test]
    fn update_stage_records_history_and_note() {
        let (store, a, _) = seeded();
        store
            .apply(&Mutation::UpdateStage {
                order_id: a,
                stage: "PAR".into(),
                note: Some("sent to payer".into()),
            })
            .unwrap();

        let referral = get(&store, a);
        assert_eq!(referral.stage, "PAR");
        assert_eq!(referral.last_stage_note.as_deref(), Some("sent to payer"));
        assert_eq!(referral.stage_history.len(), 1);
        assert_eq!(referral.stage_history[0].from, "Intake");
    }

    fn regression(order_id: Uuid, from: &str, to: &str) -> Mutation {
        Mutation::InsertRegression(Regression {
            id: Uuid::new_v4(),
            order_id,
            previous_stage: from.into(),
            new_stage: to.into(),
            reason: "wrong payer".into(),
            user: "rae".into(),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn backward_bulk_move_without_regression_record_changes_nothing() {
        let (store, a, b) = seeded();
        let back = Mutation::BulkUpdateStage {
            order_ids: vec![a, b],
            stage: "Intake".into(),
            note: None,
        };

        let err = store.apply(&back).unwrap_err();
        assert!(matches!(err, TrackerError::RegressionReasonRequired { .. }));
        let untouched = get(&store, b);
        assert_eq!(untouched.stage, "Docs");
        assert!(untouched.stage_history.is_empty());

        store.apply(&regression(b, "Docs", "Intake")).unwrap();
        assert_eq!(store.apply(&back).unwrap().affected, 2);

        let moved = get(&store, b);
        assert_eq!(moved.stage, "Intake");
        assert!(stages().has_regression(&moved.stage_history));
        assert_eq!(store.fetch_regressions(b).unwrap().len(), 1);
    }

    #[test]
    fn backward_single_move_needs_a_fresh_regression_record() {
        let (store, _, b) = seeded();
        let back = Mutation::UpdateStage {
            order_id: b,
            stage: "Intake".into(),
            note: None,
        };
        assert!(matches!(
            store.apply(&back),
            Err(TrackerError::RegressionReasonRequired { .. })
        ));

        store.apply(&regression(b, "Docs", "Intake")).unwrap();
        store.apply(&back).unwrap();
        assert_eq!(get(&store, b).stage, "Intake");
    }

    #[test]
    fn bulk_archive_reports_affected_rows() {
        let (store, a, b) = seeded();
        let ack = store
            .apply(&Mutation::BulkSetArchived {
                order_ids: vec![a, b, Uuid::new_v4()],
                archived: true,
            })
            .unwrap();
        assert_eq!(ack.affected, 2);
        assert!(get(&store, a).archived && get(&store, b).archived);
    }

    #[test]
    fn document_patch_merges_and_removes() {
        let (store, a, _) = seeded();
        let patch = |entries: Vec<(&str, Option<DocumentStatus>)>| Mutation::UpsertDocumentStatus {
            order_id: a,
            document_status: entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };

        store
            .apply(&patch(vec![
                ("FACE", Some(DocumentStatus::Complete)),
                ("CMN", Some(DocumentStatus::Pending)),
            ]))
            .unwrap();
        store.apply(&patch(vec![("CMN", None)])).unwrap();

        let referral = get(&store, a);
        assert!(referral.is_document_complete("FACE"));
        assert!(!referral.document_status.contains_key("CMN"));
    }

    #[test]
    fn bulk_document_status_sets_every_key() {
        let (store, a, b) = seeded();
        store
            .apply(&Mutation::BulkDocumentStatus {
                order_ids: vec![a, b],
                document_keys: vec!["FACE".into(), "CMN".into()],
                status: DocumentStatus::Complete,
            })
            .unwrap();
        for id in [a, b] {
            let referral = get(&store, id);
            assert!(referral.is_document_complete("FACE"));
            assert!(referral.is_document_complete("CMN"));
        }
    }

    #[test]
    fn delete_removes_referral_and_regressions() {
        let (store, a, b) = seeded();
        store.apply(&regression(b, "Docs", "Intake")).unwrap();
        assert_eq!(store.fetch_regressions(b).unwrap().len(), 1);

        store.apply(&Mutation::DeleteReferral { order_id: b }).unwrap();
        assert_eq!(store.fetch_referrals().unwrap().len(), 1);
        assert!(store.fetch_regressions(b).unwrap().is_empty());

        let err = store.apply(&Mutation::DeleteReferral { order_id: b }).unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(id) if id == b));
        assert_eq!(get(&store, a).stage, "Intake");
    }

    #[test]
    fn loads_seed_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        let seed = SeedData {
            referrals: vec![Referral::new(
                Patient::new("Ada", "Lovelace"),
                "Docs",
                Utc::now(),
            )],
            regressions: vec![],
        };
        std::fs::write(&path, serde_json::to_string(&seed).unwrap()).unwrap();

        let store = InMemoryStore::from_json_file(stages(), &path).unwrap();
        assert_eq!(store.fetch_referrals().unwrap().len(), 1);
    }
}
