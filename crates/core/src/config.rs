//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into services. Binaries
//! read environment variables and hand the raw values to the helpers here; nothing in this
//! crate reads the environment during request handling.

use crate::constants::DEFAULT_DATA_FILE;
use crate::stages::StageOrder;
use crate::{TrackerError, TrackerResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_file: PathBuf,
    stage_order: StageOrder,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] if `data_file` is not an existing file.
    pub fn new(data_file: PathBuf, stage_order: StageOrder) -> TrackerResult<Self> {
        if !data_file.is_file() {
            return Err(TrackerError::InvalidInput(format!(
                "referral data file does not exist: {}",
                data_file.display()
            )));
        }

        Ok(Self {
            data_file,
            stage_order,
        })
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    pub fn stage_order(&self) -> &StageOrder {
        &self.stage_order
    }
}

/// Resolve the seed file path from an optional environment value.
///
/// `None` or blank falls back to [`DEFAULT_DATA_FILE`] in the working directory.
pub fn data_file_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE))
}

/// Load the stage order from an optional YAML path.
///
/// If `value` is `None` or blank, returns the default stage order.
pub fn stage_order_from_env_value(value: Option<String>) -> TrackerResult<StageOrder> {
    let path = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    match path {
        Some(path) => {
            let order = StageOrder::from_yaml_file(Path::new(&path))?;
            tracing::info!(stages = order.len(), path = %path, "loaded stage configuration");
            Ok(order)
        }
        None => Ok(StageOrder::default()),
    }
}
