//! Request and response bodies shared by the API surfaces.
//!
//! Core types stay free of HTTP concerns; these structs translate between them and JSON /
//! query-string payloads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracker_core::aggregation::{TrendSeries, WeeklyBucket};
use tracker_core::filter::{DocumentFilter, FilterCriteria};
use tracker_core::mutation::DocumentStatusPatch;
use tracker_core::url_state::{split_list, UrlState};
use tracker_core::{
    DocumentStatus, Mutation, MutationAck, Notification, Referral, TrackerError, TrackerResult,
};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// One row of the referral list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReferralRow {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub primary_insurance: Option<String>,
    pub payer_region: Option<String>,
    pub stage: String,
    pub archived: bool,
    pub stoplight_status: Option<String>,
    /// `complete/required`, e.g. `1/2`.
    pub readiness: String,
    pub ready: bool,
    pub document_status: BTreeMap<String, String>,
    pub last_stage_note: Option<String>,
    pub rep_name: Option<String>,
    pub denial_count: u32,
    pub equipment_count: u32,
    pub created_at: DateTime<Utc>,
    pub referral_date: DateTime<Utc>,
}

impl From<&Referral> for ReferralRow {
    fn from(r: &Referral) -> Self {
        let readiness = r.readiness();
        Self {
            id: r.id,
            patient_id: r.patient.id,
            patient_name: r.patient.display_name(),
            date_of_birth: r.patient.date_of_birth,
            primary_insurance: r.patient.primary_insurance.clone(),
            payer_region: r.patient.payer_region.clone(),
            stage: r.stage.clone(),
            archived: r.archived,
            stoplight_status: r.stoplight_status.map(|s| s.to_string()),
            readiness: readiness.to_string(),
            ready: readiness.is_ready(),
            document_status: r
                .document_status
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            last_stage_note: r.last_stage_note.clone(),
            rep_name: r.rep_name.clone(),
            denial_count: r.denial_count,
            equipment_count: r.equipment_count,
            created_at: r.created_at,
            referral_date: r.reference_date(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListReferralsRes {
    pub referrals: Vec<ReferralRow>,
    /// Size of the unfiltered snapshot.
    pub total: usize,
}

/// Query parameters of the referral list.
///
/// The URL-state parameters keep their persisted names (`dateStart`, `openPatientId`, ...);
/// the rest are view-local filters.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferralListQuery {
    pub account: Option<String>,
    pub archive_status: Option<String>,
    /// Comma-separated insurance names.
    pub insurance: Option<String>,
    #[serde(rename = "dateStart")]
    pub date_start: Option<String>,
    #[serde(rename = "dateEnd")]
    pub date_end: Option<String>,
    pub region: Option<String>,
    pub rep: Option<String>,
    pub stoplight_status: Option<String>,
    #[serde(rename = "openPatientId")]
    pub open_patient_id: Option<String>,
    /// Free-text search.
    pub q: Option<String>,
    /// Comma-separated stage names.
    pub stages: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Exact date of birth, `YYYY-MM-DD`.
    pub dob: Option<String>,
    /// Exact stage.
    pub stage: Option<String>,
    pub doc_key: Option<String>,
    /// `Complete`, `Missing` or `Not Required`.
    pub doc_status: Option<String>,
}

impl ReferralListQuery {
    pub fn url_state(&self) -> UrlState {
        UrlState {
            account: self.account.clone(),
            archive_status: self.archive_status.clone(),
            insurance: self.insurance.clone(),
            date_start: self.date_start.clone(),
            date_end: self.date_end.clone(),
            region: self.region.clone(),
            rep: self.rep.clone(),
            stoplight_status: self.stoplight_status.clone(),
            open_patient_id: self.open_patient_id.clone(),
        }
    }

    /// Typed criteria for the filter engine.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] for unparseable values, or when only one of
    /// `doc_key`/`doc_status` is given.
    pub fn to_criteria(&self) -> TrackerResult<FilterCriteria> {
        let mut criteria = self.url_state().to_criteria()?;

        criteria.search = self.q.clone().unwrap_or_default();
        if let Some(stages) = present(&self.stages) {
            criteria.stages = split_list(stages).into_iter().collect();
        }

        let adv = &mut criteria.advanced;
        adv.first_name = present(&self.first_name).map(str::to_owned);
        adv.last_name = present(&self.last_name).map(str::to_owned);
        adv.stage = present(&self.stage).map(str::to_owned);
        if let Some(dob) = present(&self.dob) {
            let dob = NaiveDate::parse_from_str(dob, "%Y-%m-%d")
                .map_err(|e| TrackerError::InvalidInput(format!("dob must be YYYY-MM-DD: {e}")))?;
            adv.date_of_birth = Some(dob);
        }

        adv.document = match (present(&self.doc_key), present(&self.doc_status)) {
            (Some(key), Some(status)) => Some(DocumentFilter {
                key: key.to_owned(),
                requirement: status.parse()?,
            }),
            (None, None) => None,
            _ => {
                return Err(TrackerError::InvalidInput(
                    "doc_key and doc_status must be given together".into(),
                ))
            }
        };

        criteria.validate()?;
        Ok(criteria)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Window for `/metrics`: explicit `from`/`to`, or the trailing `days` ending now.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MetricsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Trailing window length in days when `from` is omitted (default 7).
    pub days: Option<i64>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TrendsRes {
    pub buckets: Vec<WeeklyBucket>,
    /// False for fewer than two weeks of data.
    pub renderable: bool,
}

impl From<TrendSeries> for TrendsRes {
    fn from(series: TrendSeries) -> Self {
        let renderable = series.is_renderable();
        Self {
            buckets: series.buckets,
            renderable,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StageChangeReq {
    pub stage: String,
    pub note: Option<String>,
    /// Required when moving backwards.
    pub reason: Option<String>,
    pub actor: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkStageReq {
    pub order_ids: Vec<Uuid>,
    pub stage: String,
    pub note: Option<String>,
    /// Required when any selected referral moves backwards.
    pub reason: Option<String>,
    pub actor: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ArchiveReq {
    pub archived: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkArchiveReq {
    pub order_ids: Vec<Uuid>,
    pub archived: bool,
}

/// Document status patch; a `null` value clears the key.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DocumentsReq {
    pub document_status: BTreeMap<String, Option<String>>,
}

impl DocumentsReq {
    pub fn into_mutation(self, order_id: Uuid) -> Mutation {
        let document_status: DocumentStatusPatch = self
            .document_status
            .into_iter()
            .map(|(key, status)| (key, status.map(DocumentStatus::from)))
            .collect();
        Mutation::UpsertDocumentStatus {
            order_id,
            document_status,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkDocumentsReq {
    pub order_ids: Vec<Uuid>,
    pub document_keys: Vec<String>,
    pub status: String,
}

impl From<BulkDocumentsReq> for Mutation {
    fn from(req: BulkDocumentsReq) -> Self {
        Mutation::BulkDocumentStatus {
            order_ids: req.order_ids,
            document_keys: req.document_keys,
            status: DocumentStatus::from(req.status),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationRes {
    /// `success` or `error`.
    pub level: String,
    pub message: String,
}

impl From<&Notification> for NotificationRes {
    fn from(n: &Notification) -> Self {
        Self {
            level: match n.level {
                tracker_core::NotificationLevel::Success => "success".into(),
                tracker_core::NotificationLevel::Error => "error".into(),
            },
            message: n.message.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MutationRes {
    pub affected: usize,
    pub notification: NotificationRes,
}

impl MutationRes {
    pub fn new(ack: MutationAck, notification: &Notification) -> Self {
        Self {
            affected: ack.affected,
            notification: notification.into(),
        }
    }
}
