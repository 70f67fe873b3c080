//! # API REST
//!
//! REST API implementation for the referral tracker.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status-code mapping)
//!
//! Uses `api-shared` for wire types and `tracker-core` for all referral logic.

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use api_shared::{
    ArchiveReq, BulkArchiveReq, BulkDocumentsReq, BulkStageReq, DocumentsReq, HealthRes,
    HealthService, ListReferralsRes, MetricsQuery, MutationRes, NotificationRes, ReferralListQuery,
    ReferralRow, StageChangeReq, TrendsRes,
};
use tracker_core::aggregation::{MetricDeltas, PeriodMetrics, WeeklyBucket};
use tracker_core::{
    filter_referrals, kpi_report, plan_bulk_stage_change, plan_stage_change, weekly_trends,
    BulkStageChange, CoreConfig, DateWindow, InMemoryStore, KpiReport, Mutation,
    MutationDispatcher, RecordStore, Regression, Snapshot, SnapshotCache, StageChange, StageOrder,
    TrackerError, TrackerResult,
};

/// Trailing window used by `/metrics` when no bounds are given.
const DEFAULT_METRICS_DAYS: i64 = 7;

/// Application state for the REST API server
///
/// Shared by every handler: the record store, the snapshot cache in front of it and the
/// dispatcher that writes through the store and invalidates the cache.
#[derive(Clone)]
pub struct AppState {
    stages: Arc<StageOrder>,
    store: Arc<dyn RecordStore>,
    cache: Arc<SnapshotCache>,
    dispatcher: MutationDispatcher,
}

impl AppState {
    pub fn new(stages: StageOrder, store: Arc<dyn RecordStore>) -> Self {
        let cache = Arc::new(SnapshotCache::new());
        Self {
            stages: Arc::new(stages),
            dispatcher: MutationDispatcher::new(store.clone(), cache.clone()),
            store,
            cache,
        }
    }

    /// State backed by an [`InMemoryStore`] seeded from the configured data file.
    pub fn from_config(cfg: &CoreConfig) -> TrackerResult<Self> {
        let stages = cfg.stage_order().clone();
        let store = InMemoryStore::from_json_file(stages.clone(), cfg.data_file())?;
        Ok(Self::new(stages, Arc::new(store)))
    }

    fn snapshot(&self) -> TrackerResult<Arc<Snapshot>> {
        self.cache.read(self.store.as_ref())
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_stages,
        list_referrals,
        metrics,
        trends,
        update_stage,
        bulk_update_stage,
        set_archived,
        bulk_set_archived,
        update_documents,
        bulk_update_documents,
        delete_referral,
        list_regressions,
    ),
    components(schemas(
        HealthRes,
        ListReferralsRes,
        ReferralRow,
        KpiReport,
        DateWindow,
        PeriodMetrics,
        MetricDeltas,
        TrendsRes,
        WeeklyBucket,
        StageChangeReq,
        BulkStageReq,
        ArchiveReq,
        BulkArchiveReq,
        DocumentsReq,
        BulkDocumentsReq,
        MutationRes,
        NotificationRes,
        Regression,
    ))
)]
struct ApiDoc;

/// Build the REST router with Swagger UI mounted at `/swagger-ui`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stages", get(list_stages))
        .route("/referrals", get(list_referrals))
        .route("/referrals/bulk/stage", post(bulk_update_stage))
        .route("/referrals/bulk/archive", post(bulk_set_archived))
        .route("/referrals/bulk/documents", post(bulk_update_documents))
        .route("/referrals/:id", delete(delete_referral))
        .route("/referrals/:id/stage", put(update_stage))
        .route("/referrals/:id/archive", put(set_archived))
        .route("/referrals/:id/documents", put(update_documents))
        .route("/referrals/:id/regressions", get(list_regressions))
        .route("/metrics", get(metrics))
        .route("/trends", get(trends))
        .merge(
            SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn status_for(err: &TrackerError) -> StatusCode {
    match err {
        TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackerError::InvalidInput(_)
        | TrackerError::InvalidStage(_)
        | TrackerError::RegressionReasonRequired { .. }
        | TrackerError::QueryDecode(_)
        | TrackerError::Types(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a core error to a response, using `message` as the client-facing text for 4xx.
fn api_error(err: TrackerError, message: Option<String>) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Request failed: {:?}", err);
        (status, "Internal error".into())
    } else {
        tracing::warn!(error = %err, "rejected request");
        (status, message.unwrap_or_else(|| err.to_string()))
    }
}

fn dispatch(state: &AppState, mutations: &[Mutation]) -> Result<Json<MutationRes>, ApiError> {
    let (notification, result) = state.dispatcher.dispatch_notify(mutations);
    match result {
        Ok(ack) => Ok(Json(MutationRes::new(ack, &notification))),
        Err(e) => Err(api_error(e, Some(notification.message))),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Reports the size of the cached snapshot once one has been fetched.
#[axum::debug_handler]
async fn health(State(state): State<AppState>) -> Json<HealthRes> {
    let referrals = state.cache.current().map(|s| s.referrals.len());
    Json(HealthService::check_health_with_snapshot(referrals))
}

#[utoipa::path(
    get,
    path = "/stages",
    responses(
        (status = 200, description = "Configured workflow stages in order", body = [String])
    )
)]
#[axum::debug_handler]
async fn list_stages(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.stages.names().map(str::to_owned).collect())
}

#[utoipa::path(
    get,
    path = "/referrals",
    params(ReferralListQuery),
    responses(
        (status = 200, description = "Filtered referrals sorted by name", body = ListReferralsRes),
        (status = 400, description = "Invalid filter parameters"),
        (status = 500, description = "Internal server error")
    )
)]
/// List referrals matching the given filters
///
/// Accepts the persisted URL-state parameters plus the view-local filters. Rows are sorted
/// by patient display name.
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - a date, stoplight, archive status or document filter cannot be parsed,
/// - `dateStart` is after `dateEnd`.
#[axum::debug_handler]
async fn list_referrals(
    State(state): State<AppState>,
    Query(query): Query<ReferralListQuery>,
) -> Result<Json<ListReferralsRes>, ApiError> {
    let criteria = query.to_criteria().map_err(|e| api_error(e, None))?;
    query
        .url_state()
        .open_patient()
        .map_err(|e| api_error(e, None))?;

    let snapshot = state.snapshot().map_err(|e| api_error(e, None))?;
    let referrals = filter_referrals(&snapshot.referrals, &criteria)
        .into_iter()
        .map(ReferralRow::from)
        .collect();

    Ok(Json(ListReferralsRes {
        referrals,
        total: snapshot.referrals.len(),
    }))
}

#[utoipa::path(
    get,
    path = "/metrics",
    params(MetricsQuery),
    responses(
        (status = 200, description = "KPIs for the window and the one before it", body = KpiReport),
        (status = 400, description = "Invalid window")
    )
)]
#[axum::debug_handler]
async fn metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<KpiReport>, ApiError> {
    let now = Utc::now();
    let window = match query.from {
        Some(from) => DateWindow::new(from, query.to.unwrap_or(now)),
        None => DateWindow::trailing_days(now, query.days.unwrap_or(DEFAULT_METRICS_DAYS)),
    }
    .map_err(|e| api_error(e, None))?;

    let snapshot = state.snapshot().map_err(|e| api_error(e, None))?;
    kpi_report(&snapshot.referrals, &state.stages, window, now)
        .map(Json)
        .map_err(|e| api_error(e, None))
}

#[utoipa::path(
    get,
    path = "/trends",
    responses(
        (status = 200, description = "Weekly trend buckets", body = TrendsRes)
    )
)]
#[axum::debug_handler]
async fn trends(State(state): State<AppState>) -> Result<Json<TrendsRes>, ApiError> {
    let snapshot = state.snapshot().map_err(|e| api_error(e, None))?;
    Ok(Json(weekly_trends(&snapshot.referrals).into()))
}

#[utoipa::path(
    put,
    path = "/referrals/{id}/stage",
    params(("id" = Uuid, Path, description = "Referral id")),
    request_body = StageChangeReq,
    responses(
        (status = 200, description = "Stage changed", body = MutationRes),
        (status = 400, description = "Unknown stage, unchanged stage or missing regression reason"),
        (status = 404, description = "Referral not found")
    )
)]
/// Move one referral to a new stage
///
/// A move to an earlier stage also records a regression and requires `reason`.
#[axum::debug_handler]
async fn update_stage(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<StageChangeReq>,
) -> Result<Json<MutationRes>, ApiError> {
    let snapshot = state.snapshot().map_err(|e| api_error(e, None))?;
    let referral = snapshot
        .referrals
        .iter()
        .find(|r| r.id == id)
        .ok_or_else(|| api_error(TrackerError::NotFound(id), None))?;

    let change = StageChange {
        new_stage: &req.stage,
        note: req.note.clone(),
        reason: req.reason.clone(),
        actor: &req.actor,
    };
    let mutations = plan_stage_change(&state.stages, referral, change, Utc::now())
        .map_err(|e| api_error(e, None))?;

    dispatch(&state, &mutations)
}

#[utoipa::path(
    post,
    path = "/referrals/bulk/stage",
    request_body = BulkStageReq,
    responses(
        (status = 200, description = "Stages changed", body = MutationRes),
        (status = 400, description = "Unknown stage, empty selection or missing regression reason"),
        (status = 404, description = "Referral not found")
    )
)]
#[axum::debug_handler]
async fn bulk_update_stage(
    State(state): State<AppState>,
    Json(req): Json<BulkStageReq>,
) -> Result<Json<MutationRes>, ApiError> {
    let snapshot = state.snapshot().map_err(|e| api_error(e, None))?;
    let change = BulkStageChange {
        order_ids: &req.order_ids,
        new_stage: &req.stage,
        note: req.note.clone(),
        reason: req.reason.clone(),
        actor: &req.actor,
    };
    let mutations = plan_bulk_stage_change(&state.stages, &snapshot.referrals, change, Utc::now())
        .map_err(|e| api_error(e, None))?;

    dispatch(&state, &mutations)
}

#[utoipa::path(
    put,
    path = "/referrals/{id}/archive",
    params(("id" = Uuid, Path, description = "Referral id")),
    request_body = ArchiveReq,
    responses(
        (status = 200, description = "Archive flag set", body = MutationRes),
        (status = 404, description = "Referral not found")
    )
)]
#[axum::debug_handler]
async fn set_archived(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<ArchiveReq>,
) -> Result<Json<MutationRes>, ApiError> {
    dispatch(
        &state,
        &[Mutation::SetArchived {
            order_id: id,
            archived: req.archived,
        }],
    )
}

#[utoipa::path(
    post,
    path = "/referrals/bulk/archive",
    request_body = BulkArchiveReq,
    responses(
        (status = 200, description = "Archive flag set", body = MutationRes),
        (status = 400, description = "Empty selection")
    )
)]
#[axum::debug_handler]
async fn bulk_set_archived(
    State(state): State<AppState>,
    Json(req): Json<BulkArchiveReq>,
) -> Result<Json<MutationRes>, ApiError> {
    dispatch(
        &state,
        &[Mutation::BulkSetArchived {
            order_ids: req.order_ids,
            archived: req.archived,
        }],
    )
}

#[utoipa::path(
    put,
    path = "/referrals/{id}/documents",
    params(("id" = Uuid, Path, description = "Referral id")),
    request_body = DocumentsReq,
    responses(
        (status = 200, description = "Document statuses merged", body = MutationRes),
        (status = 400, description = "Empty patch"),
        (status = 404, description = "Referral not found")
    )
)]
#[axum::debug_handler]
async fn update_documents(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
    Json(req): Json<DocumentsReq>,
) -> Result<Json<MutationRes>, ApiError> {
    dispatch(&state, &[req.into_mutation(id)])
}

#[utoipa::path(
    post,
    path = "/referrals/bulk/documents",
    request_body = BulkDocumentsReq,
    responses(
        (status = 200, description = "Document statuses set", body = MutationRes),
        (status = 400, description = "Empty selection or no document keys")
    )
)]
#[axum::debug_handler]
async fn bulk_update_documents(
    State(state): State<AppState>,
    Json(req): Json<BulkDocumentsReq>,
) -> Result<Json<MutationRes>, ApiError> {
    dispatch(&state, &[req.into()])
}

#[utoipa::path(
    delete,
    path = "/referrals/{id}",
    params(("id" = Uuid, Path, description = "Referral id")),
    responses(
        (status = 200, description = "Referral and its regressions deleted", body = MutationRes),
        (status = 404, description = "Referral not found")
    )
)]
#[axum::debug_handler]
async fn delete_referral(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<MutationRes>, ApiError> {
    dispatch(&state, &[Mutation::DeleteReferral { order_id: id }])
}

#[utoipa::path(
    get,
    path = "/referrals/{id}/regressions",
    params(("id" = Uuid, Path, description = "Referral id")),
    responses(
        (status = 200, description = "Recorded regressions, oldest first", body = [Regression])
    )
)]
#[axum::debug_handler]
async fn list_regressions(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<Uuid>,
) -> Result<Json<Vec<Regression>>, ApiError> {
    state
        .store
        .fetch_regressions(id)
        .map(Json)
        .map_err(|e| api_error(e, None))
}
