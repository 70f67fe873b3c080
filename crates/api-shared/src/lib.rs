//! # API Shared
//!
//! Shared utilities and definitions for the referral tracker APIs.
//!
//! Contains:
//! - Request/response wire types with OpenAPI schemas (`wire` module)
//! - Shared services like `HealthService`
//!
//! Used by `api-rest` for common functionality.

pub mod health;
pub mod wire;

pub use health::{HealthRes, HealthService};
pub use wire::*;
