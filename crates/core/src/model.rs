//! Referral and patient records as fetched from the record store.
//!
//! Rows are fully denormalized: every [`Referral`] carries its joined [`Patient`], so the
//! filter and aggregation engines never need a second lookup.

use crate::TrackerError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracker_types::{DocumentStatus, Stoplight};
use uuid::Uuid;

/// Document key → completion status, scoped to one referral.
pub type DocumentStatusMap = BTreeMap<String, DocumentStatus>;

/// Demographic and contact entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub primary_insurance: Option<String>,
    #[serde(default)]
    pub payer_region: Option<String>,
    /// Document keys this patient must supply before a referral is ready.
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Patient {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            date_of_birth: None,
            phone: None,
            email: None,
            primary_insurance: None,
            payer_region: None,
            required_documents: Vec::new(),
            archived: false,
        }
    }

    /// `"First Last"`, trimmed. Empty when both parts are missing.
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn requires(&self, document_key: &str) -> bool {
        self.required_documents.iter().any(|k| k == document_key)
    }
}

/// One entry of a referral's stage history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
}

impl StageTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            at,
        }
    }
}

/// A care-coordination case tied to a patient.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: Uuid,
    pub patient: Patient,
    pub stage: String,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Date the referral was received. Falls back to `created_at` when absent.
    #[serde(default)]
    pub referral_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub document_status: DocumentStatusMap,
    #[serde(default)]
    pub last_stage_note: Option<String>,
    #[serde(default)]
    pub stoplight_status: Option<Stoplight>,
    #[serde(default)]
    pub denial_count: u32,
    #[serde(default)]
    pub equipment_count: u32,
    #[serde(default)]
    pub rep_name: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub stage_history: Vec<StageTransition>,
}

impl Referral {
    pub fn new(patient: Patient, stage: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient,
            stage: stage.into(),
            archived: false,
            created_at,
            updated_at: created_at,
            referral_date: None,
            document_status: DocumentStatusMap::new(),
            last_stage_note: None,
            stoplight_status: None,
            denial_count: 0,
            equipment_count: 0,
            rep_name: None,
            account: None,
            stage_history: Vec::new(),
        }
    }

    /// Timestamp the date-range filter compares against.
    pub fn reference_date(&self) -> DateTime<Utc> {
        self.referral_date.unwrap_or(self.created_at)
    }

    pub fn is_document_complete(&self, document_key: &str) -> bool {
        self.document_status
            .get(document_key)
            .is_some_and(DocumentStatus::is_complete)
    }

    /// Completed vs required document counts for this referral's patient.
    pub fn readiness(&self) -> Readiness {
        let required = self.patient.required_documents.len();
        let complete = self
            .patient
            .required_documents
            .iter()
            .filter(|key| self.is_document_complete(key))
            .count();
        Readiness { complete, required }
    }
}

/// Required-document progress, shown as `complete/required`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub complete: usize,
    pub required: usize,
}

impl Readiness {
    /// Ready means at least one required document, all of them complete.
    pub fn is_ready(&self) -> bool {
        self.required > 0 && self.complete == self.required
    }
}

impl std::fmt::Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.complete, self.required)
    }
}

/// Record of a backward workflow-stage transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Regression {
    pub id: Uuid,
    pub order_id: Uuid,
    pub previous_stage: String,
    pub new_stage: String,
    pub reason: String,
    pub user: String,
    pub created_at: DateTime<Utc>,
}

/// Which side of the archival flag a view shows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    #[default]
    Active,
    Archived,
    All,
}

impl ArchiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveMode::Active => "active",
            ArchiveMode::Archived => "archived",
            ArchiveMode::All => "all",
        }
    }

    pub fn admits(&self, archived: bool) -> bool {
        match self {
            ArchiveMode::Active => !archived,
            ArchiveMode::Archived => archived,
            ArchiveMode::All => true,
        }
    }
}

impl FromStr for ArchiveMode {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ArchiveMode::Active),
            "archived" => Ok(ArchiveMode::Archived),
            "all" => Ok(ArchiveMode::All),
            other => Err(TrackerError::InvalidInput(format!(
                "archive_status must be active, archived or all (got {other:?})"
            ))),
        }
    }
}

impl std::fmt::Display for ArchiveMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
