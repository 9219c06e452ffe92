//! HTTP API handlers for Waypost.
//!
//! Handlers are thin: they validate the request, call the pipeline or the
//! storage layer, and log the outcome. All geofence logic lives in the
//! pipeline.
//!
//! Request bodies that are not valid JSON for their type are rejected by
//! axum before reaching a handler. Handlers themselves answer `400` for
//! missing or unusable fields.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::catalog::CachedZoneCatalog;
use crate::error::{WaypostError, status_for};
use crate::model::{
    AlertsQuery, AlertsResponse, CreateZoneRequest, IngestResponse, LocationRecord,
    LocationRequest, NotificationsQuery, NotificationsResponse, SetZoneActiveRequest, Zone,
};
use crate::notify::WebhookNotifier;
use crate::pipeline::GeofencePipeline;
use crate::storage::Storage;

/// The pipeline as wired in production: SQLite behind a cached catalog,
/// SQLite persistence and the webhook notifier.
pub type Pipeline = GeofencePipeline<CachedZoneCatalog<Storage>, Storage, WebhookNotifier>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wire the pipeline around one storage handle.
    pub fn new(storage: Storage, notifier: WebhookNotifier, zone_cache_ttl: Duration) -> Self {
        let catalog = CachedZoneCatalog::new(storage.clone(), zone_cache_ttl);
        let pipeline = GeofencePipeline::new(catalog, storage.clone(), notifier);

        Self {
            storage,
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/locations", post(post_location))
        .route("/emergency", post(post_emergency))
        .route("/zones", get(list_zones).post(create_zone))
        .route("/zones/:id", get(get_zone))
        .route("/zones/:id/active", put(set_zone_active))
        .route("/alerts/recent", get(get_alerts))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/notifications/recent", get(get_notifications))
        .route("/subjects/:id/location", get(get_subject_location))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

async fn ingest(state: &AppState, request: LocationRequest) -> Result<IngestResponse, StatusCode> {
    let sample = request.into_sample(Utc::now()).map_err(|e| {
        warn!(error = %e, "Rejected location sample");
        e.status_code()
    })?;

    let subject_id = sample.subject_id.clone();

    state.pipeline.ingest(sample).await.map_err(|e| {
        warn!(subject_id = %subject_id, error = %e, "Failed to ingest location");
        status_for(&e)
    })
}

/// POST /locations - Ingest a location sample.
///
/// # Request Body
///
/// ```json
/// {
///     "subject_id": "tourist-42",
///     "latitude": 26.578,
///     "longitude": 93.172,
///     "accuracy_meters": 8.0,
///     "battery_level": 64,
///     "is_emergency": false
/// }
/// ```
///
/// `subject_id`, `latitude` and `longitude` are required. `timestamp`
/// defaults to the time of the request.
///
/// # Response
///
/// The violations found and the alerts and notifications emitted for them.
#[instrument(skip(state, request))]
pub async fn post_location(
    State(state): State<AppState>,
    Json(request): Json<LocationRequest>,
) -> Result<Json<IngestResponse>, StatusCode> {
    let response = ingest(&state, request).await?;

    info!(
        subject_id = %response.subject_id,
        violation_count = response.violations.len(),
        alert_count = response.alerts.len(),
        "Location processed"
    );

    Ok(Json(response))
}

/// POST /emergency - Panic button.
///
/// Same body as `POST /locations`; the sample is always treated as an
/// emergency and geofence evaluation still runs.
#[instrument(skip(state, request))]
pub async fn post_emergency(
    State(state): State<AppState>,
    Json(request): Json<LocationRequest>,
) -> Result<Json<IngestResponse>, StatusCode> {
    let request = LocationRequest {
        is_emergency: true,
        ..request
    };
    let response = ingest(&state, request).await?;

    warn!(
        subject_id = %response.subject_id,
        persisted_alerts = response.persisted_alerts,
        "Emergency raised"
    );

    Ok(Json(response))
}

/// GET /zones - All zones, including inactive ones.
#[instrument(skip(state))]
pub async fn list_zones(State(state): State<AppState>) -> Result<Json<Vec<Zone>>, StatusCode> {
    state.storage.list_zones().await.map(Json).map_err(|e| {
        warn!(error = %e, "Failed to list zones");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// POST /zones - Create a zone.
///
/// Answers `201 Created` with the stored zone.
#[instrument(skip(state, request))]
pub async fn create_zone(
    State(state): State<AppState>,
    Json(request): Json<CreateZoneRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    request.validate().map_err(|e| {
        warn!(error = %e, "Rejected zone definition");
        e.status_code()
    })?;

    let zone = state.storage.create_zone(&request).await.map_err(|e| {
        warn!(error = %e, "Failed to create zone");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state.pipeline.catalog().invalidate().await;

    info!(zone_id = zone.id, zone_type = %zone.zone_type, "Zone created");
    Ok((StatusCode::CREATED, Json(zone)))
}

/// GET /zones/:id - A single zone.
#[instrument(skip(state))]
pub async fn get_zone(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Zone>, StatusCode> {
    match state.storage.get_zone(id).await {
        Ok(Some(zone)) => Ok(Json(zone)),
        Ok(None) => Err(WaypostError::NotFound(format!("zone {id}")).status_code()),
        Err(e) => {
            warn!(zone_id = id, error = %e, "Failed to fetch zone");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /zones/:id/active - Activate or deactivate a zone.
///
/// # Request Body
///
/// ```json
/// { "is_active": false }
/// ```
#[instrument(skip(state, request))]
pub async fn set_zone_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<SetZoneActiveRequest>,
) -> Result<Json<Zone>, StatusCode> {
    let updated = state
        .storage
        .set_zone_active(id, request.is_active)
        .await
        .map_err(|e| {
            warn!(zone_id = id, error = %e, "Failed to update zone");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !updated {
        return Err(StatusCode::NOT_FOUND);
    }

    state.pipeline.catalog().invalidate().await;

    let zone = state
        .storage
        .get_zone(id)
        .await
        .map_err(|e| {
            warn!(zone_id = id, error = %e, "Failed to fetch zone");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    info!(zone_id = id, is_active = zone.is_active, "Zone activation changed");
    Ok(Json(zone))
}

/// GET /alerts/recent - Alerts raised within the lookback window.
///
/// # Query Parameters
///
/// - `minutes` (optional): Lookback window in minutes (default: 60)
/// - `subject_id` (optional): Only alerts for this subject
#[instrument(skip(state))]
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Result<Json<AlertsResponse>, StatusCode> {
    let now = Utc::now();

    match state
        .storage
        .recent_alerts(query.minutes, query.subject_id.as_deref(), now)
        .await
    {
        Ok(alerts) => {
            info!(
                alert_count = alerts.len(),
                lookback_minutes = query.minutes,
                "Alerts queried"
            );
            Ok(Json(AlertsResponse {
                alerts,
                lookback_minutes: query.minutes,
            }))
        }
        Err(e) => {
            warn!(
                lookback_minutes = query.minutes,
                error = %e,
                "Failed to fetch alerts"
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /alerts/:id/resolve - Mark an alert as handled.
#[instrument(skip(state))]
pub async fn resolve_alert(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    match state.storage.resolve_alert(id).await {
        Ok(true) => {
            info!(alert_id = id, "Alert resolved");
            StatusCode::NO_CONTENT
        }
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            warn!(alert_id = id, error = %e, "Failed to resolve alert");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// GET /notifications/recent - Notifications created within the lookback window.
#[instrument(skip(state))]
pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<NotificationsResponse>, StatusCode> {
    let now = Utc::now();

    match state.storage.recent_notifications(query.minutes, now).await {
        Ok(notifications) => Ok(Json(NotificationsResponse {
            notifications,
            lookback_minutes: query.minutes,
        })),
        Err(e) => {
            warn!(error = %e, "Failed to fetch notifications");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /subjects/:id/location - The latest stored sample for a subject.
#[instrument(skip(state))]
pub async fn get_subject_location(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<LocationRecord>, StatusCode> {
    match state.storage.latest_location(&subject_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!(subject_id = %subject_id, error = %e, "Failed to fetch location");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
