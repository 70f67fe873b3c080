//! # Tracker Core
//!
//! Core business logic for the referral tracker.
//!
//! This crate contains the pure data operations over a fetched referral snapshot:
//! - Filtering and sorting the visible referral list ([`filter`])
//! - KPI, delta and weekly trend aggregation ([`aggregation`])
//! - Workflow stage ordering and regression detection ([`stages`])
//! - Mutation request shapes, stage-change planning and dispatch ([`mutation`], [`dispatch`])
//! - The record store seam and snapshot cache ([`store`], [`cache`])
//! - URL query-string state and explicit UI state containers ([`url_state`], [`selection`],
//!   [`optimistic`])
//!
//! **No API concerns**: HTTP servers and request/response wire types belong in `api-rest` and
//! `api-shared`.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod model;
pub mod mutation;
pub mod optimistic;
pub mod selection;
pub mod stages;
pub mod store;
pub mod url_state;

pub use aggregation::{kpi_report, weekly_trends, DateWindow, KpiReport, TrendSeries};
pub use cache::{Snapshot, SnapshotCache};
pub use config::CoreConfig;
pub use constants::*;
pub use dispatch::{MutationDispatcher, Notification, NotificationLevel};
pub use error::{TrackerError, TrackerResult};
pub use filter::{filter_referrals, AdvancedFilter, FilterCriteria};
pub use model::{ArchiveMode, Patient, Readiness, Referral, Regression};
pub use mutation::{
    plan_bulk_stage_change, plan_stage_change, BulkStageChange, Mutation, MutationAck, StageChange,
};
pub use stages::StageOrder;
pub use store::{InMemoryStore, RecordStore, SeedData};
pub use url_state::UrlState;

pub use tracker_types::{DocumentStatus, NonEmptyText, Stoplight};
