//! Workflow stage ordering and regression detection.
//!
//! The stage list is configured externally (YAML) and defines a total order over stage names.
//! A transition is a regression iff the new stage sits strictly earlier in that order than the
//! current one.
//!
//! Example configuration:
//!
//! ```yaml
//! stages:
//!   - Intake
//!   - Docs
//!   - PAR
//! ```

use crate::constants::DEFAULT_STAGES;
use crate::model::StageTransition;
use crate::{TrackerError, TrackerResult};
use serde::Deserialize;
use std::path::Path;
use tracker_types::NonEmptyText;

/// Canonical, ordered list of workflow stage names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOrder {
    stages: Vec<NonEmptyText>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageConfigWire {
    stages: Vec<String>,
}

impl StageOrder {
    /// Build a stage order from names, earliest first.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] for an empty list, [`TrackerError::Types`] for a
    /// blank name and [`TrackerError::DuplicateStage`] if a name repeats.
    pub fn new<I, S>(names: I) -> TrackerResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut stages: Vec<NonEmptyText> = Vec::new();
        for name in names {
            let stage = NonEmptyText::new(name)?;
            if stages.contains(&stage) {
                return Err(TrackerError::DuplicateStage(stage.into_inner()));
            }
            stages.push(stage);
        }

        if stages.is_empty() {
            return Err(TrackerError::InvalidInput(
                "stage order must contain at least one stage".into(),
            ));
        }

        Ok(Self { stages })
    }

    /// Parse a stage order from YAML text.
    ///
    /// Schema mismatches report the failing field path via `serde_path_to_error`.
    pub fn parse_yaml(yaml_text: &str) -> TrackerResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
        let wire: StageConfigWire = serde_path_to_error::deserialize(deserializer).map_err(|err| {
            let path = err.path().to_string();
            let path = if path.is_empty() || path == "." {
                "<root>".to_string()
            } else {
                path
            };
            TrackerError::StageConfig {
                path,
                message: err.into_inner().to_string(),
            }
        })?;

        Self::new(wire.stages)
    }

    pub fn from_yaml_file(path: &Path) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(TrackerError::FileRead)?;
        Self::parse_yaml(&text)
    }

    /// Position of `stage` in the order.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidStage`] if the name is not configured.
    pub fn index_of(&self, stage: &str) -> TrackerResult<usize> {
        self.stages
            .iter()
            .position(|s| s.as_str() == stage)
            .ok_or_else(|| TrackerError::InvalidStage(stage.to_owned()))
    }

    pub fn contains(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s.as_str() == stage)
    }

    /// Checks that `stage` is configured.
    pub fn validate(&self, stage: &str) -> TrackerResult<()> {
        self.index_of(stage).map(|_| ())
    }

    /// True iff moving from `from` to `to` goes strictly backwards.
    pub fn is_regression(&self, from: &str, to: &str) -> TrackerResult<bool> {
        Ok(self.index_of(to)? < self.index_of(from)?)
    }

    /// True if any entry of a stage history moved backwards.
    ///
    /// Entries naming stages that are no longer configured are ignored.
    pub fn has_regression(&self, history: &[StageTransition]) -> bool {
        history
            .iter()
            .any(|t| self.is_regression(&t.from, &t.to).unwrap_or(false))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(NonEmptyText::as_str)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageOrder {
    fn default() -> Self {
        Self {
            stages: DEFAULT_STAGES
                .iter()
                .filter_map(|s| NonEmptyText::new(s).ok())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn four_stages() -> StageOrder {
        StageOrder::new(["Intake", "Verification", "Docs", "PAR"]).unwrap()
    }

    #[test]
    fn backward_move_is_regression() {
        let order = four_stages();
        assert!(order.is_regression("PAR", "Verification").unwrap());
    }

    #[test]
    fn forward_move_is_not_regression() {
        let order = four_stages();
        assert!(!order.is_regression("Verification", "PAR").unwrap());
    }

    #[test]
    fn same_stage_is_not_regression() {
        let order = four_stages();
        assert!(!order.is_regression("Docs", "Docs").unwrap());
    }

    #[test]
    fn unknown_stage_is_an_error() {
        let order = four_stages();
        match order.is_regression("Docs", "Shipped") {
            Err(TrackerError::InvalidStage(name)) => assert_eq!(name, "Shipped"),
            other => panic!("expected InvalidStage, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicates_and_empty_lists() {
        assert!(matches!(
            StageOrder::new(["Intake", "Intake"]),
            Err(TrackerError::DuplicateStage(_))
        ));
        assert!(matches!(
            StageOrder::new(Vec::<String>::new()),
            Err(TrackerError::InvalidInput(_))
        ));
    }

    #[test]
    fn parses_yaml_configuration() {
        let order = StageOrder::parse_yaml("stages:\n  - Intake\n  - Docs\n  - PAR\n").unwrap();
        assert_eq!(order.names().collect::<Vec<_>>(), ["Intake", "Docs", "PAR"]);
        assert_eq!(order.index_of("PAR").unwrap(), 2);
    }

    #[test]
    fn yaml_unknown_keys_report_path() {
        let err = StageOrder::parse_yaml("stages: [Intake]\nextra: true\n").unwrap_err();
        match err {
            TrackerError::StageConfig { message, .. } => assert!(message.contains("extra")),
            other => panic!("expected StageConfig error, got {other:?}"),
        }
    }

    #[test]
    fn history_with_backward_step_is_detected() {
        let order = four_stages();
        let now = Utc::now();
        let forward = vec![
            StageTransition::new("Intake", "Docs", now),
            StageTransition::new("Docs", "PAR", now),
        ];
        assert!(!order.has_regression(&forward));

        let mut with_back = forward.clone();
        with_back.push(StageTransition::new("PAR", "Docs", now));
        assert!(order.has_regression(&with_back));
    }

    #[test]
    fn default_order_is_populated() {
        let order = StageOrder::default();
        assert_eq!(order.len(), DEFAULT_STAGES.len());
        assert!(order.contains("Intake"));
    }
}
