use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown workflow stage: {0}")]
    InvalidStage(String),
    #[error("duplicate workflow stage: {0}")]
    DuplicateStage(String),
    #[error("a reason is required when moving a referral back from {from} to {to}")]
    RegressionReasonRequired { from: String, to: String },
    #[error("referral not found: {0}")]
    NotFound(Uuid),

    #[error("failed to read file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to deserialize records: {0}")]
    Deserialization(serde_json::Error),
    #[error("stage configuration schema mismatch at {path}: {message}")]
    StageConfig { path: String, message: String },
    #[error("failed to encode query string: {0}")]
    QueryEncode(serde_urlencoded::ser::Error),
    #[error("failed to decode query string: {0}")]
    QueryDecode(serde_urlencoded::de::Error),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid toggle transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Types(#[from] tracker_types::TypesError),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
