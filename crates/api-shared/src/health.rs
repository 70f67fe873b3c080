use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
    /// Number of referrals in the current snapshot, when one has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrals: Option<usize>,
}

/// Simple health service shared by every API surface.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static health check without a snapshot count.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Referral tracker is alive".into(),
            referrals: None,
        }
    }

    /// Health check that reports the size of the current snapshot.
    pub fn check_health_with_snapshot(referrals: Option<usize>) -> HealthRes {
        HealthRes {
            referrals,
            ..Self::check_health()
        }
    }
}
