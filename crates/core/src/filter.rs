//! Filter predicate engine.
//!
//! Derives the visible, sorted subset of a referral snapshot from the active filter criteria.
//! Every criterion category is ANDed; inactive criteria (empty search, no selected stages,
//! `all` stoplight, unset advanced fields) always pass.
//!
//! The engine is a pure function of its inputs. It borrows the snapshot and returns references
//! into it, so it is safe to re-run on every input change.

use crate::constants::NOT_REQUIRED_LABEL;
use crate::model::{ArchiveMode, Referral};
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracker_types::Stoplight;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Stoplight selector: everything, or one status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoplightFilter {
    #[default]
    All,
    Only(Stoplight),
}

impl StoplightFilter {
    pub fn admits(&self, status: Option<Stoplight>) -> bool {
        match self {
            StoplightFilter::All => true,
            StoplightFilter::Only(wanted) => status == Some(*wanted),
        }
    }
}

impl FromStr for StoplightFilter {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(StoplightFilter::All);
        }
        Ok(StoplightFilter::Only(s.parse()?))
    }
}

impl std::fmt::Display for StoplightFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoplightFilter::All => f.write_str("all"),
            StoplightFilter::Only(status) => write!(f, "{status}"),
        }
    }
}

/// Required state of a single document key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentRequirement {
    Complete,
    Missing,
    #[serde(rename = "Not Required")]
    NotRequired,
}

impl DocumentRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentRequirement::Complete => "Complete",
            DocumentRequirement::Missing => "Missing",
            DocumentRequirement::NotRequired => NOT_REQUIRED_LABEL,
        }
    }

    fn admits(&self, referral: &Referral, key: &str) -> bool {
        let required = referral.patient.requires(key);
        let complete = referral.is_document_complete(key);
        match self {
            DocumentRequirement::Complete => required && complete,
            DocumentRequirement::Missing => required && !complete,
            DocumentRequirement::NotRequired => !required,
        }
    }
}

impl FromStr for DocumentRequirement {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        match normalised.as_str() {
            "complete" => Ok(DocumentRequirement::Complete),
            "missing" => Ok(DocumentRequirement::Missing),
            "not required" => Ok(DocumentRequirement::NotRequired),
            _ => Err(TrackerError::InvalidInput(format!(
                "document status filter must be Complete, Missing or Not Required (got {s:?})"
            ))),
        }
    }
}

/// One document-key/status requirement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentFilter {
    pub key: String,
    pub requirement: DocumentRequirement,
}

/// Structured advanced filters. `None`/empty fields are inactive.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdvancedFilter {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub insurance: Vec<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub stage: Option<String>,
    pub document: Option<DocumentFilter>,
    pub region: Option<String>,
    pub rep: Option<String>,
    pub account: Option<String>,
}

/// Every input the filter engine takes besides the snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub archive_mode: ArchiveMode,
    pub search: String,
    pub stages: BTreeSet<String>,
    pub stoplight: StoplightFilter,
    pub advanced: AdvancedFilter,
}

impl FilterCriteria {
    /// Rejects a referral-date range whose start is after its end.
    pub fn validate(&self) -> TrackerResult<()> {
        if let (Some(start), Some(end)) = (self.advanced.date_start, self.advanced.date_end) {
            if start > end {
                return Err(TrackerError::InvalidInput(format!(
                    "dateStart {start} is after dateEnd {end}"
                )));
            }
        }
        Ok(())
    }

    /// True when `referral` satisfies every active criterion.
    pub fn matches(&self, referral: &Referral) -> bool {
        self.archive_mode.admits(referral.archived)
            && self.matches_search(referral)
            && (self.stages.is_empty() || self.stages.contains(&referral.stage))
            && self.stoplight.admits(referral.stoplight_status)
            && self.matches_advanced(referral)
    }

    fn matches_search(&self, referral: &Referral) -> bool {
        let term = self.search.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }

        let patient = &referral.patient;
        let haystacks = [
            Some(patient.display_name()),
            patient.primary_insurance.clone(),
            Some(referral.stage.clone()),
            referral.rep_name.clone(),
            patient.payer_region.clone(),
            referral.last_stage_note.clone(),
        ];

        haystacks
            .iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term))
    }

    fn matches_advanced(&self, referral: &Referral) -> bool {
        let adv = &self.advanced;
        let patient = &referral.patient;

        if !fragment_matches(adv.first_name.as_deref(), &patient.first_name)
            || !fragment_matches(adv.last_name.as_deref(), &patient.last_name)
        {
            return false;
        }

        if let Some(dob) = adv.date_of_birth {
            if patient.date_of_birth != Some(dob) {
                return false;
            }
        }

        if !adv.insurance.is_empty() {
            let Some(insurance) = patient.primary_insurance.as_deref() else {
                return false;
            };
            if !adv
                .insurance
                .iter()
                .any(|wanted| eq_ignore_case(wanted, insurance))
            {
                return false;
            }
        }

        let reference = referral.reference_date();
        if let Some(start) = adv.date_start.and_then(start_of_day) {
            if reference < start {
                return false;
            }
        }
        if let Some(end) = adv.date_end.and_then(end_of_day) {
            if reference > end {
                return false;
            }
        }

        if let Some(stage) = adv.stage.as_deref() {
            if referral.stage != stage {
                return false;
            }
        }

        if let Some(doc) = &adv.document {
            if !doc.requirement.admits(referral, &doc.key) {
                return false;
            }
        }

        optional_equals(adv.region.as_deref(), patient.payer_region.as_deref())
            && optional_equals(adv.rep.as_deref(), referral.rep_name.as_deref())
            && optional_equals(adv.account.as_deref(), referral.account.as_deref())
    }
}

/// Filters `referrals` and sorts the result by patient display name.
///
/// The sort is stable and ignores case and accents, so `Émile` sorts with `Emile` between
/// `adam` and `zoe`. Empty names sort first and ties keep snapshot order.
pub fn filter_referrals<'a>(
    referrals: &'a [Referral],
    criteria: &FilterCriteria,
) -> Vec<&'a Referral> {
    let mut visible: Vec<&Referral> = referrals.iter().filter(|r| criteria.matches(r)).collect();
    visible.sort_by_cached_key(|r| collation_key(&r.patient.display_name()));
    tracing::debug!(
        total = referrals.len(),
        visible = visible.len(),
        "filtered referral snapshot"
    );
    visible
}

/// Name folded to lowercase base letters: canonical decomposition with combining marks dropped.
fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Midnight at the start of `date`, UTC.
pub fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(0, 0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// 23:59:59.999 on `date`, UTC, so the whole boundary day is included.
pub fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn fragment_matches(fragment: Option<&str>, value: &str) -> bool {
    match fragment.map(str::trim).filter(|f| !f.is_empty()) {
        Some(f) => value.to_lowercase().contains(&f.to_lowercase()),
        None => true,
    }
}

fn optional_equals(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted.map(str::trim).filter(|w| !w.is_empty()) {
        Some(w) => actual.is_some_and(|a| eq_ignore_case(w, a)),
        None => true,
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patient;
    use chrono::Duration;
    use tracker_types::DocumentStatus;

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date).unwrap().with_timezone(&Utc)
    }

    fn referral(first: &str, last: &str, stage: &str) -> Referral {
        Referral::new(Patient::new(first, last), stage, at("2026-03-02T09:00:00Z"))
    }

    fn names(rows: &[&Referral]) -> Vec<String> {
        rows.iter().map(|r| r.patient.display_name()).collect()
    }

    #[test]
    fn stage_selection_returns_only_matching_stage() {
        let snapshot = vec![
            referral("Ann", "A", "Intake"),
            referral("Ben", "B", "Docs"),
            referral("Cal", "C", "PAR"),
        ];
        let criteria = FilterCriteria {
            stages: BTreeSet::from(["Docs".to_string()]),
            ..Default::default()
        };

        let rows = filter_referrals(&snapshot, &criteria);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stage, "Docs");
    }

    #[test]
    fn sort_is_case_insensitive_and_stable() {
        let mut first_bob = referral("bob", "", "Intake");
        first_bob.last_stage_note = Some("first".into());
        let mut second_bob = referral("Bob", "", "Intake");
        second_bob.last_stage_note = Some("second".into());
        let snapshot = vec![
            referral("carol", "", "Intake"),
            first_bob,
            referral("", "", "Intake"),
            referral("Alice", "", "Intake"),
            second_bob,
        ];

        let rows = filter_referrals(&snapshot, &FilterCriteria::default());
        assert_eq!(names(&rows), ["", "Alice", "bob", "Bob", "carol"]);
        assert_eq!(rows[2].last_stage_note.as_deref(), Some("first"));
        assert_eq!(rows[3].last_stage_note.as_deref(), Some("second"));
    }

    #[test]
    fn sort_ignores_accents() {
        let snapshot = vec![
            referral("zoe", "", "Intake"),
            referral("Émile", "", "Intake"),
            referral("adam", "", "Intake"),
            referral("Emile", "", "Intake"),
            referral("Ångström", "", "Intake"),
        ];

        let rows = filter_referrals(&snapshot, &FilterCriteria::default());
        assert_eq!(names(&rows), ["adam", "Ångström", "Émile", "Emile", "zoe"]);
    }

    #[test]
    fn date_end_includes_last_millisecond_of_day() {
        let mut inside = referral("In", "Side", "Intake");
        inside.referral_date = Some(at("2026-03-10T23:59:59.999Z"));
        let mut outside = referral("Out", "Side", "Intake");
        outside.referral_date = Some(at("2026-03-10T23:59:59.999Z") + Duration::milliseconds(1));
        let snapshot = vec![inside, outside];

        let criteria = FilterCriteria {
            advanced: AdvancedFilter {
                date_end: NaiveDate::from_ymd_opt(2026, 3, 10),
                ..Default::default()
            },
            ..Default::default()
        };

        let rows = filter_referrals(&snapshot, &criteria);
        assert_eq!(names(&rows), ["In Side"]);
    }

    #[test]
    fn date_start_includes_midnight() {
        let mut on_day = referral("On", "Day", "Intake");
        on_day.referral_date = Some(at("2026-03-10T00:00:00Z"));
        let mut before = referral("Day", "Before", "Intake");
        before.referral_date = Some(at("2026-03-09T23:59:59.999Z"));
        let snapshot = vec![on_day, before];

        let criteria = FilterCriteria {
            advanced: AdvancedFilter {
                date_start: NaiveDate::from_ymd_opt(2026, 3, 10),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(names(&filter_referrals(&snapshot, &criteria)), ["On Day"]);
    }

    fn doc_criteria(key: &str, requirement: DocumentRequirement) -> FilterCriteria {
        FilterCriteria {
            advanced: AdvancedFilter {
                document: Some(DocumentFilter {
                    key: key.into(),
                    requirement,
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn partially_ready_referral_is_excluded_by_complete_filter() {
        let mut r = referral("Ada", "Lovelace", "Docs");
        r.patient.required_documents = vec!["FACE".into(), "CMN".into()];
        r.document_status.insert("FACE".into(), DocumentStatus::Complete);
        assert_eq!(r.readiness().to_string(), "1/2");

        let snapshot = vec![r];
        let complete_cmn = doc_criteria("CMN", DocumentRequirement::Complete);
        assert!(filter_referrals(&snapshot, &complete_cmn).is_empty());
        assert_eq!(
            filter_referrals(&snapshot, &doc_criteria("CMN", DocumentRequirement::Missing)).len(),
            1
        );
        assert_eq!(
            filter_referrals(&snapshot, &doc_criteria("FACE", DocumentRequirement::Complete))
                .len(),
            1
        );
    }

    #[test]
    fn unrequired_key_only_satisfies_not_required() {
        let mut r = referral("Ada", "Lovelace", "Docs");
        r.patient.required_documents = vec!["FACE".into()];
        r.document_status.insert("RX".into(), DocumentStatus::Complete);
        let snapshot = vec![r];

        for (requirement, expected) in [
            (DocumentRequirement::Complete, 0),
            (DocumentRequirement::Missing, 0),
            (DocumentRequirement::NotRequired, 1),
        ] {
            let rows = filter_referrals(&snapshot, &doc_criteria("RX", requirement));
            assert_eq!(rows.len(), expected, "{requirement:?}");
        }
    }

    #[test]
    fn search_and_insurance_are_case_insensitive() {
        let mut medicare = referral("Grace", "Hopper", "Intake");
        medicare.patient.primary_insurance = Some("Medicare".into());
        let mut aetna = referral("Alan", "Turing", "Intake");
        aetna.patient.primary_insurance = Some("Aetna".into());
        let snapshot = vec![medicare, aetna];

        let search = FilterCriteria {
            search: "HOPP".into(),
            ..Default::default()
        };
        assert_eq!(names(&filter_referrals(&snapshot, &search)), ["Grace Hopper"]);

        let insurance = FilterCriteria {
            advanced: AdvancedFilter {
                insurance: vec!["aetna".into(), "cigna".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(names(&filter_referrals(&snapshot, &insurance)), ["Alan Turing"]);
    }

    #[test]
    fn archive_mode_and_stoplight_combine() {
        let mut archived_red = referral("Ann", "Archived", "Intake");
        archived_red.archived = true;
        archived_red.stoplight_status = Some(Stoplight::Red);
        let mut active_red = referral("Ann", "Active", "Intake");
        active_red.stoplight_status = Some(Stoplight::Red);
        let active_none = referral("Ann", "Plain", "Intake");
        let snapshot = vec![archived_red, active_red, active_none];

        let red_active = FilterCriteria {
            stoplight: StoplightFilter::Only(Stoplight::Red),
            ..Default::default()
        };
        assert_eq!(names(&filter_referrals(&snapshot, &red_active)), ["Ann Active"]);

        let everything = FilterCriteria {
            archive_mode: ArchiveMode::All,
            ..Default::default()
        };
        assert_eq!(filter_referrals(&snapshot, &everything).len(), 3);
    }

    #[test]
    fn every_result_satisfies_every_active_criterion() {
        let mut snapshot = Vec::new();
        for (i, stage) in ["Intake", "Docs", "PAR", "Docs", "Docs"].iter().enumerate() {
            let mut r = referral(&format!("Pat{i}"), "Smith", stage);
            r.rep_name = Some(if i % 2 == 1 { "Rae" } else { "Lou" }.into());
            r.patient.payer_region = Some("North".into());
            r.archived = i == 4;
            snapshot.push(r);
        }

        let criteria = FilterCriteria {
            stages: BTreeSet::from(["Docs".to_string()]),
            advanced: AdvancedFilter {
                rep: Some("rae".into()),
                region: Some("north".into()),
                last_name: Some("smi".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let rows = filter_referrals(&snapshot, &criteria);
        assert!(!rows.is_empty());
        for row in &rows {
            assert_eq!(row.stage, "Docs");
            assert_eq!(row.rep_name.as_deref(), Some("Rae"));
            assert!(!row.archived);
        }
        let expected = snapshot.iter().filter(|r| criteria.matches(r)).count();
        assert_eq!(rows.len(), expected);
    }

    #[test]
    fn reversed_date_range_is_rejected() {
        let criteria = FilterCriteria {
            advanced: AdvancedFilter {
                date_start: NaiveDate::from_ymd_opt(2026, 3, 10),
                date_end: NaiveDate::from_ymd_opt(2026, 3, 1),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(criteria.validate(), Err(TrackerError::InvalidInput(_))));
    }

    #[test]
    fn document_requirement_parses_labels() {
        assert_eq!(
            "Not Required".parse::<DocumentRequirement>().unwrap(),
            DocumentRequirement::NotRequired
        );
        assert_eq!(
            "not_required".parse::<DocumentRequirement>().unwrap(),
            DocumentRequirement::NotRequired
        );
        assert!("Done".parse::<DocumentRequirement>().is_err());
    }
}
