//! Query-string persistence of filter and navigation state.
//!
//! Each parameter reflects one concern and round-trips with [`FilterCriteria`]:
//! `account`, `archive_status`, `insurance` (comma-separated), `dateStart`, `dateEnd`,
//! `region`, `rep`, `stoplight_status` and `openPatientId`.

use crate::constants::LIST_SEPARATOR;
use crate::filter::{FilterCriteria, StoplightFilter};
use crate::model::ArchiveMode;
use crate::{TrackerError, TrackerResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw URL parameters. Values stay as strings until applied to criteria.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    #[serde(rename = "dateStart", default, skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,
    #[serde(rename = "dateEnd", default, skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rep: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stoplight_status: Option<String>,
    #[serde(rename = "openPatientId", default, skip_serializing_if = "Option::is_none")]
    pub open_patient_id: Option<String>,
}

impl UrlState {
    /// Parse a query string (without the leading `?`).
    pub fn parse(query: &str) -> TrackerResult<Self> {
        serde_urlencoded::from_str(query.trim_start_matches('?')).map_err(TrackerError::QueryDecode)
    }

    pub fn to_query_string(&self) -> TrackerResult<String> {
        serde_urlencoded::to_string(self).map_err(TrackerError::QueryEncode)
    }

    /// Overlay the parameters present here onto `criteria`.
    ///
    /// Absent or blank parameters leave the existing criterion untouched.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] for unparseable archive modes, stoplight values
    /// or dates.
    pub fn apply_to(&self, criteria: &mut FilterCriteria) -> TrackerResult<()> {
        if let Some(mode) = present(&self.archive_status) {
            criteria.archive_mode = mode.parse::<ArchiveMode>()?;
        }
        if let Some(status) = present(&self.stoplight_status) {
            criteria.stoplight = status.parse::<StoplightFilter>().map_err(|e| {
                TrackerError::InvalidInput(format!("stoplight_status: {e}"))
            })?;
        }
        if let Some(list) = present(&self.insurance) {
            criteria.advanced.insurance = split_list(list);
        }
        if let Some(date) = present(&self.date_start) {
            criteria.advanced.date_start = Some(parse_date("dateStart", date)?);
        }
        if let Some(date) = present(&self.date_end) {
            criteria.advanced.date_end = Some(parse_date("dateEnd", date)?);
        }
        if let Some(region) = present(&self.region) {
            criteria.advanced.region = Some(region.to_owned());
        }
        if let Some(rep) = present(&self.rep) {
            criteria.advanced.rep = Some(rep.to_owned());
        }
        if let Some(account) = present(&self.account) {
            criteria.advanced.account = Some(account.to_owned());
        }
        Ok(())
    }

    /// Fresh criteria built from these parameters alone.
    pub fn to_criteria(&self) -> TrackerResult<FilterCriteria> {
        let mut criteria = FilterCriteria::default();
        self.apply_to(&mut criteria)?;
        Ok(criteria)
    }

    /// The reverse mapping: URL parameters reflecting `criteria`.
    ///
    /// Defaults (`active`, `all`, empty lists) are omitted to keep URLs short.
    pub fn from_criteria(criteria: &FilterCriteria, open_patient_id: Option<Uuid>) -> Self {
        let adv = &criteria.advanced;
        Self {
            account: adv.account.clone(),
            archive_status: (criteria.archive_mode != ArchiveMode::default())
                .then(|| criteria.archive_mode.to_string()),
            insurance: (!adv.insurance.is_empty())
                .then(|| adv.insurance.join(&LIST_SEPARATOR.to_string())),
            date_start: adv.date_start.map(|d| d.format(DATE_FORMAT).to_string()),
            date_end: adv.date_end.map(|d| d.format(DATE_FORMAT).to_string()),
            region: adv.region.clone(),
            rep: adv.rep.clone(),
            stoplight_status: (criteria.stoplight != StoplightFilter::All)
                .then(|| criteria.stoplight.to_string()),
            open_patient_id: open_patient_id.map(|id| id.to_string()),
        }
    }

    /// The patient drawer to reopen, if any.
    pub fn open_patient(&self) -> TrackerResult<Option<Uuid>> {
        present(&self.open_patient_id)
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|e| TrackerError::InvalidInput(format!("openPatientId: {e}")))
            })
            .transpose()
    }
}

/// Splits a comma-separated parameter, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(name: &str, value: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| TrackerError::InvalidInput(format!("{name} must be YYYY-MM-DD: {e}")))
}
