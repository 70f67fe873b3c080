//! Shared value types for the referral tracker.
//!
//! These types carry validation at construction time so that the rest of the workspace can
//! rely on their invariants:
//! - [`NonEmptyText`] for stage names, regression reasons and other required free text
//! - [`Stoplight`] for the traffic-light urgency classification
//! - [`DocumentStatus`] for per-document completion states

use std::str::FromStr;

/// Errors that can occur when creating validated types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypesError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not one of `green`, `yellow` or `red`
    #[error("unknown stoplight status: {0}")]
    UnknownStoplight(String),
}

/// A string type that guarantees non-empty content.
///
/// The input is trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns [`TypesError::Empty`] if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TypesError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TypesError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Traffic-light urgency classification of a referral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stoplight {
    Green,
    Yellow,
    Red,
}

impl Stoplight {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stoplight::Green => "green",
            Stoplight::Yellow => "yellow",
            Stoplight::Red => "red",
        }
    }
}

impl FromStr for Stoplight {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Stoplight::Green),
            "yellow" => Ok(Stoplight::Yellow),
            "red" => Ok(Stoplight::Red),
            _ => Err(TypesError::UnknownStoplight(s.to_owned())),
        }
    }
}

impl std::fmt::Display for Stoplight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion state of a single document on a referral.
///
/// Only [`DocumentStatus::Complete`] counts as complete. Any other value, including strings
/// this crate does not recognise, is treated as missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentStatus {
    Complete,
    Pending,
    Missing,
    Other(String),
}

impl DocumentStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, DocumentStatus::Complete)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DocumentStatus::Complete => "Complete",
            DocumentStatus::Pending => "Pending",
            DocumentStatus::Missing => "Missing",
            DocumentStatus::Other(s) => s,
        }
    }
}

impl From<String> for DocumentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Complete" => DocumentStatus::Complete,
            "Pending" => DocumentStatus::Pending,
            "Missing" => DocumentStatus::Missing,
            _ => DocumentStatus::Other(value),
        }
    }
}

impl From<&str> for DocumentStatus {
    fn from(value: &str) -> Self {
        DocumentStatus::from(value.to_owned())
    }
}

impl From<DocumentStatus> for String {
    fn from(value: DocumentStatus) -> Self {
        match value {
            DocumentStatus::Other(s) => s,
            other => other.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
