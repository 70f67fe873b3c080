//! Constants used throughout the tracker core crate.

/// Stage order used when no stage configuration file is supplied.
pub const DEFAULT_STAGES: &[&str] = &[
    "Intake",
    "Verification",
    "Docs",
    "PAR",
    "Scheduling",
    "Delivered",
    "Billed",
];

/// Default seed file for the in-memory record store.
pub const DEFAULT_DATA_FILE: &str = "referral_data.json";

/// Default address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Environment variable naming the seed JSON file.
pub const DATA_FILE_ENV: &str = "REFERRAL_DATA_FILE";

/// Environment variable naming the YAML stage configuration file.
pub const STAGES_FILE_ENV: &str = "REFERRAL_STAGES_FILE";

/// Environment variable naming the REST bind address.
pub const REST_ADDR_ENV: &str = "TRACKER_REST_ADDR";

/// Separator for list-valued query parameters (`insurance`, `stages`).
pub const LIST_SEPARATOR: char = ',';

/// Document requirement label for keys outside the patient's required list.
pub const NOT_REQUIRED_LABEL: &str = "Not Required";

pub const MILLIS_PER_DAY: f64 = 86_400_000.0;
