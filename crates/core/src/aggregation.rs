//! Aggregation engine: KPIs over a date window, period-over-period deltas and weekly trends.
//!
//! Count metrics compare periods with a relative delta (percent change); rate metrics
//! (percentages and average age) compare with an absolute delta.

use crate::constants::MILLIS_PER_DAY;
use crate::model::Referral;
use crate::stages::StageOrder;
use crate::{TrackerError, TrackerResult};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive `[from, to]` window over `created_at`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DateWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> TrackerResult<Self> {
        if from > to {
            return Err(TrackerError::InvalidInput(format!(
                "window start {from} is after window end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// Window of `days` days ending at `now`.
    pub fn trailing_days(now: DateTime<Utc>, days: i64) -> TrackerResult<Self> {
        if days <= 0 {
            return Err(TrackerError::InvalidInput(
                "trailing window must span at least one day".into(),
            ));
        }
        let from = Duration::try_days(days)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| {
                TrackerError::InvalidInput(format!("{days} day trailing window is out of range"))
            })?;
        Self::new(from, now)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }

    pub fn duration(&self) -> Duration {
        self.to - self.from
    }

    /// The immediately preceding window of equal duration, ending 1ms before `from`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidInput`] if that window starts before the earliest representable
    /// timestamp.
    pub fn previous(&self) -> TrackerResult<Self> {
        self.from
            .checked_sub_signed(Duration::milliseconds(1))
            .and_then(|to| Some((to.checked_sub_signed(self.duration())?, to)))
            .map(|(from, to)| Self { from, to })
            .ok_or_else(|| {
                TrackerError::InvalidInput(format!("no comparable window before {}", self.from))
            })
    }
}

/// Metric values for one window.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PeriodMetrics {
    pub created: u64,
    pub ready: u64,
    /// Ready referrals as a percentage of referrals with at least one required document.
    pub ready_rate: f64,
    pub denied: u64,
    pub regressed: u64,
    pub completion_pct: f64,
    pub avg_age_days: f64,
}

/// Period-over-period change for every metric.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MetricDeltas {
    pub created: f64,
    pub ready: f64,
    pub ready_rate: f64,
    pub denied: f64,
    pub regressed: f64,
    pub completion_pct: f64,
    pub avg_age_days: f64,
}

impl MetricDeltas {
    pub fn between(current: &PeriodMetrics, previous: &PeriodMetrics) -> Self {
        Self {
            created: relative_delta(current.created as f64, previous.created as f64),
            ready: relative_delta(current.ready as f64, previous.ready as f64),
            ready_rate: absolute_delta(current.ready_rate, previous.ready_rate),
            denied: relative_delta(current.denied as f64, previous.denied as f64),
            regressed: relative_delta(current.regressed as f64, previous.regressed as f64),
            completion_pct: absolute_delta(current.completion_pct, previous.completion_pct),
            avg_age_days: absolute_delta(current.avg_age_days, previous.avg_age_days),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KpiReport {
    pub window: DateWindow,
    pub previous_window: DateWindow,
    pub current: PeriodMetrics,
    pub previous: PeriodMetrics,
    pub deltas: MetricDeltas,
}

/// Percent change from `previous` to `current`.
///
/// `100` when growing from zero, `0` when both are zero.
pub fn relative_delta(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return if current == 0.0 { 0.0 } else { 100.0 };
    }
    ((current - previous) / previous) * 100.0
}

pub fn absolute_delta(current: f64, previous: f64) -> f64 {
    current - previous
}

/// Computes every metric for referrals created inside `window`.
pub fn period_metrics(
    referrals: &[Referral],
    stages: &StageOrder,
    window: &DateWindow,
    now: DateTime<Utc>,
) -> PeriodMetrics {
    let in_window: Vec<&Referral> = referrals
        .iter()
        .filter(|r| window.contains(r.created_at))
        .collect();

    let mut metrics = PeriodMetrics {
        created: in_window.len() as u64,
        ..Default::default()
    };

    let mut with_requirements = 0u64;
    let mut docs_complete = 0usize;
    let mut docs_required = 0usize;
    let mut age_millis = 0i64;

    for referral in &in_window {
        let readiness = referral.readiness();
        docs_complete += readiness.complete;
        docs_required += readiness.required;
        if readiness.required > 0 {
            with_requirements += 1;
        }
        if readiness.is_ready() {
            metrics.ready += 1;
        }
        if referral.denial_count > 0 {
            metrics.denied += 1;
        }
        if stages.has_regression(&referral.stage_history) {
            metrics.regressed += 1;
        }
        age_millis += (now - referral.created_at).num_milliseconds();
    }

    metrics.ready_rate = percentage(metrics.ready as f64, with_requirements as f64);
    metrics.completion_pct = percentage(docs_complete as f64, docs_required as f64);
    if !in_window.is_empty() {
        metrics.avg_age_days = age_millis as f64 / MILLIS_PER_DAY / in_window.len() as f64;
    }

    metrics
}

/// Metrics for `window` and the equal-length window before it.
pub fn kpi_report(
    referrals: &[Referral],
    stages: &StageOrder,
    window: DateWindow,
    now: DateTime<Utc>,
) -> TrackerResult<KpiReport> {
    let previous_window = window.previous()?;
    let current = period_metrics(referrals, stages, &window, now);
    let previous = period_metrics(referrals, stages, &previous_window, now);
    let deltas = MetricDeltas::between(&current, &previous);

    Ok(KpiReport {
        window,
        previous_window,
        current,
        previous,
        deltas,
    })
}

fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Counts for one ISO week of referral creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WeeklyBucket {
    /// ISO week key, e.g. `2026-W09`.
    pub week: String,
    pub new_referrals: u64,
    pub docs_ready: u64,
    pub archived: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrendSeries {
    pub buckets: Vec<WeeklyBucket>,
}

impl TrendSeries {
    /// Minimum number of weeks before a trend line is drawn.
    pub const MIN_POINTS: usize = 2;

    pub fn is_renderable(&self) -> bool {
        self.buckets.len() >= Self::MIN_POINTS
    }

    /// The buckets, or `None` for a single-point (or empty) series.
    pub fn trend_line(&self) -> Option<&[WeeklyBucket]> {
        self.is_renderable().then_some(self.buckets.as_slice())
    }
}

/// Groups referrals by ISO week of `created_at`, ascending.
pub fn weekly_trends(referrals: &[Referral]) -> TrendSeries {
    let mut by_week: BTreeMap<(i32, u32), WeeklyBucket> = BTreeMap::new();

    for referral in referrals {
        let iso = referral.created_at.iso_week();
        let bucket = by_week
            .entry((iso.year(), iso.week()))
            .or_insert_with(|| WeeklyBucket {
                week: format!("{}-W{:02}", iso.year(), iso.week()),
                ..Default::default()
            });
        bucket.new_referrals += 1;
        if referral.readiness().is_ready() {
            bucket.docs_ready += 1;
        }
        if referral.archived {
            bucket.archived += 1;
        }
    }

    TrendSeries {
        buckets: by_week.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Patient, StageTransition};
    use tracker_types::DocumentStatus;

    fn at(date: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(date).unwrap().with_timezone(&Utc)
    }

    fn referral_at(date: &str) -> Referral {
        Referral::new(Patient::new("Pat", "Smith"), "Intake", at(date))
    }

    fn ready_referral(date: &str) -> Referral {
        let mut r = referral_at(date);
        r.patient.required_documents = vec!["FACE".into()];
        r.document_status.insert("FACE".into(), DocumentStatus::Complete);
        r
    }

    #[test]
    fn relative_delta_special_cases() {
        assert_eq!(relative_delta(5.0, 0.0), 100.0);
        assert_eq!(relative_delta(0.0, 0.0), 0.0);
        assert_eq!(relative_delta(5.0, 10.0), -50.0);
    }

    #[test]
    fn rate_metrics_use_absolute_delta() {
        let current = PeriodMetrics {
            completion_pct: 75.0,
            avg_age_days: 3.0,
            created: 4,
            ..Default::default()
        };
        let previous = PeriodMetrics {
            completion_pct: 50.0,
            avg_age_days: 5.0,
            created: 2,
            ..Default::default()
        };
        let deltas = MetricDeltas::between(&current, &previous);
        assert_eq!(deltas.completion_pct, 25.0);
        assert_eq!(deltas.avg_age_days, -2.0);
        assert_eq!(deltas.created, 100.0);
    }

    #[test]
    fn previous_window_is_adjacent_and_equal_length() {
        let window =
            DateWindow::new(at("2026-03-08T00:00:00Z"), at("2026-03-15T00:00:00Z")).unwrap();
        let previous = window.previous().unwrap();
        assert_eq!(previous.to, at("2026-03-07T23:59:59.999Z"));
        assert_eq!(previous.duration(), window.duration());
        assert!(!previous.contains(window.from));
    }

    #[test]
    fn oversized_trailing_window_is_rejected() {
        let now = at("2026-03-15T00:00:00Z");
        for days in [200_000_000, i64::MAX] {
            assert!(matches!(
                DateWindow::trailing_days(now, days),
                Err(TrackerError::InvalidInput(_))
            ));
        }
        assert!(matches!(
            DateWindow::trailing_days(now, 0),
            Err(TrackerError::InvalidInput(_))
        ));
    }

    #[test]
    fn window_reaching_the_earliest_timestamp_has_no_previous() {
        let window = DateWindow::new(DateTime::<Utc>::MIN_UTC, at("2026-03-15T00:00:00Z")).unwrap();
        assert!(matches!(window.previous(), Err(TrackerError::InvalidInput(_))));
        assert!(kpi_report(&[], &StageOrder::default(), window, window.to).is_err());
    }

    #[test]
    fn period_metrics_counts_window_only() {
        let stages = StageOrder::new(["Intake", "Docs", "PAR"]).unwrap();
        let now = at("2026-03-11T00:00:00Z");

        let ready = ready_referral("2026-03-09T00:00:00Z");
        let mut partial = referral_at("2026-03-10T00:00:00Z");
        partial.patient.required_documents = vec!["FACE".into(), "CMN".into()];
        partial.document_status.insert("CMN".into(), DocumentStatus::Complete);
        partial.denial_count = 2;
        partial.stage_history = vec![
            StageTransition::new("Intake", "PAR", now),
            StageTransition::new("PAR", "Docs", now),
        ];
        let no_docs = referral_at("2026-03-10T00:00:00Z");
        let outside = ready_referral("2026-02-01T00:00:00Z");

        let snapshot = vec![ready, partial, no_docs, outside];
        let window =
            DateWindow::new(at("2026-03-08T00:00:00Z"), at("2026-03-10T23:59:59Z")).unwrap();
        let m = period_metrics(&snapshot, &stages, &window, now);

        assert_eq!(m.created, 3);
        assert_eq!(m.ready, 1);
        assert_eq!(m.ready_rate, 50.0);
        assert_eq!(m.denied, 1);
        assert_eq!(m.regressed, 1);
        // 2 of 3 required documents complete
        assert!((m.completion_pct - 200.0 / 3.0).abs() < 1e-9);
        // ages: 2 days, 1 day, 1 day
        assert!((m.avg_age_days - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_yields_zeroes() {
        let stages = StageOrder::default();
        let now = at("2026-03-11T00:00:00Z");
        let window = DateWindow::trailing_days(now, 7).unwrap();
        assert_eq!(
            period_metrics(&[], &stages, &window, now),
            PeriodMetrics::default()
        );
    }

    #[test]
    fn kpi_report_compares_with_previous_window() {
        let stages = StageOrder::default();
        let now = at("2026-03-15T00:00:00Z");
        let snapshot = vec![
            referral_at("2026-03-03T00:00:00Z"),
            referral_at("2026-03-10T00:00:00Z"),
            referral_at("2026-03-11T00:00:00Z"),
        ];
        let window = DateWindow::trailing_days(now, 7).unwrap();
        let report = kpi_report(&snapshot, &stages, window, now).unwrap();
        assert_eq!(report.current.created, 2);
        assert_eq!(report.previous.created, 1);
        assert_eq!(report.deltas.created, 100.0);
    }

    #[test]
    fn weekly_trends_bucket_by_iso_week() {
        let mut archived = referral_at("2026-03-04T00:00:00Z");
        archived.archived = true;
        let snapshot = vec![
            referral_at("2026-03-10T00:00:00Z"),
            ready_referral("2026-03-03T00:00:00Z"),
            archived,
        ];

        let series = weekly_trends(&snapshot);
        assert!(series.is_renderable());
        let weeks: Vec<&str> = series.buckets.iter().map(|b| b.week.as_str()).collect();
        assert_eq!(weeks, ["2026-W10", "2026-W11"]);
        assert_eq!(series.buckets[0].new_referrals, 2);
        assert_eq!(series.buckets[0].docs_ready, 1);
        assert_eq!(series.buckets[0].archived, 1);
        assert_eq!(series.buckets[1].new_referrals, 1);
    }

    #[test]
    fn single_week_is_not_renderable() {
        let series = weekly_trends(&[referral_at("2026-03-10T00:00:00Z")]);
        assert_eq!(series.buckets.len(), 1);
        assert!(series.trend_line().is_none());
    }
}
