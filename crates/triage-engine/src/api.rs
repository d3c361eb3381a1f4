//! HTTP adapter over the [`QueueCoordinator`]
//!
//! | Method | Path                              | Operation                  |
//! |--------|-----------------------------------|----------------------------|
//! | POST   | `/api/queue/check-in`             | check in a patient         |
//! | GET    | `/api/queue?status=`              | ordered, joined queue      |
//! | GET    | `/api/queue/stats`                | active queue aggregates    |
//! | PUT    | `/api/queue/:id`                  | partial update             |
//! | POST   | `/api/queue/:id/complete`         | complete treatment         |
//! | GET    | `/api/queue/patient/:patient_id`  | patient's active entry     |
//! | GET    | `/api/queue/events`               | change stream (SSE)        |
//! | GET    | `/api/staff`                      | roster with current patient|
//! | GET    | `/api/staff/available`            | available staff            |
//! | POST   | `/api/staff`                      | add staff member           |
//! | PUT    | `/api/staff/:id/availability`     | availability toggle        |
//! | GET    | `/health`                         | liveness and database check|
//!
//! Errors are returned as `{"error": "..."}` with 400, 404, 409 or 500.

use std::convert::Infallible;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::coordinator::QueueCoordinator;
use crate::database::TriageDatabase;
use crate::error::TriageError;
use crate::types::{
    CheckInRequest, CreateStaffRequest, JoinedQueueEntry, PatientId, QueueEntry, QueueEntryId,
    QueueEntryUpdate, QueueStats, QueueStatus, StaffId, StaffListing, StaffMember,
};

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: QueueCoordinator,
    /// Checked by `/health` when present
    pub database: Option<TriageDatabase>,
}

impl ApiState {
    pub fn new(coordinator: QueueCoordinator) -> Self {
        Self {
            coordinator,
            database: None,
        }
    }

    pub fn with_database(mut self, database: TriageDatabase) -> Self {
        self.database = Some(database);
        self
    }
}

/// Error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        let status = match &err {
            TriageError::Validation(_) => StatusCode::BAD_REQUEST,
            TriageError::NotFound(_) => StatusCode::NOT_FOUND,
            TriageError::InvalidTransition { .. } | TriageError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if err.is_user_actionable() {
            debug!("Request rejected: {}", err);
            err.to_string()
        } else {
            error!("❌ Request failed: {}", err);
            "internal server error".to_string()
        };

        Self { status, message }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ListQueueParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub is_available: Option<bool>,
}

/// Build the router with tracing and CORS layers
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/queue", get(list_queue))
        .route("/api/queue/check-in", post(check_in))
        .route("/api/queue/stats", get(queue_stats))
        .route("/api/queue/events", get(queue_events))
        .route("/api/queue/patient/:patient_id", get(patient_status))
        .route("/api/queue/:id", put(update_entry))
        .route("/api/queue/:id/complete", post(complete_entry))
        .route("/api/staff", get(list_staff).post(create_staff))
        .route("/api/staff/available", get(available_staff))
        .route("/api/staff/:id/availability", put(set_availability))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let database_ok = match &state.database {
        Some(database) => database.health_check().await,
        None => true,
    };
    let status = if database_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if database_ok { "ok" } else { "degraded" },
            "observers": state.coordinator.notifier().observer_count(),
        })),
    )
}

async fn check_in(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<CheckInRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<QueueEntry>)> {
    let Json(request) = payload?;
    let entry = state.coordinator.check_in(request).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_queue(
    State(state): State<ApiState>,
    params: std::result::Result<Query<ListQueueParams>, QueryRejection>,
) -> ApiResult<Json<Vec<JoinedQueueEntry>>> {
    let Query(params) = params?;
    let status = params
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<QueueStatus>())
        .transpose()?;

    Ok(Json(state.coordinator.list_queue(status).await?))
}

async fn queue_stats(State(state): State<ApiState>) -> ApiResult<Json<QueueStats>> {
    Ok(Json(state.coordinator.get_stats().await?))
}

async fn update_entry(
    State(state): State<ApiState>,
    Path(id): Path<QueueEntryId>,
    payload: std::result::Result<Json<QueueEntryUpdate>, JsonRejection>,
) -> ApiResult<Json<JoinedQueueEntry>> {
    let Json(update) = payload?;
    Ok(Json(state.coordinator.update_entry(id, update).await?))
}

async fn complete_entry(
    State(state): State<ApiState>,
    Path(id): Path<QueueEntryId>,
) -> ApiResult<Json<QueueEntry>> {
    Ok(Json(state.coordinator.complete_entry(id).await?))
}

async fn patient_status(
    State(state): State<ApiState>,
    Path(patient_id): Path<PatientId>,
) -> ApiResult<Json<JoinedQueueEntry>> {
    Ok(Json(state.coordinator.get_patient_status(patient_id).await?))
}

async fn queue_events(State(state): State<ApiState>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let events = state.coordinator.notifier().stream();
    debug!("📡 SSE client attached as observer {}", events.id());

    let stream = events.map(|event| {
        let sse = Event::default()
            .event(event.kind.as_str())
            .json_data(&event)
            .unwrap_or_else(|_| Event::default().comment("unserializable event"));
        Ok(sse)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn list_staff(State(state): State<ApiState>) -> ApiResult<Json<Vec<StaffListing>>> {
    Ok(Json(state.coordinator.list_staff().await?))
}

async fn available_staff(State(state): State<ApiState>) -> ApiResult<Json<Vec<StaffMember>>> {
    Ok(Json(state.coordinator.list_available_staff().await?))
}

async fn create_staff(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<CreateStaffRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<StaffMember>)> {
    let Json(request) = payload?;
    let staff = state.coordinator.create_staff(request).await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

async fn set_availability(
    State(state): State<ApiState>,
    Path(id): Path<StaffId>,
    payload: std::result::Result<Json<AvailabilityRequest>, JsonRejection>,
) -> ApiResult<Json<StaffMember>> {
    let Json(request) = payload?;
    let is_available = request
        .is_available
        .ok_or_else(|| ApiError::bad_request("is_available is required"))?;

    Ok(Json(state.coordinator.set_staff_availability(id, is_available).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ApiError::from(TriageError::validation("x")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(TriageError::not_found("x")).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(TriageError::conflict("x")).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(TriageError::InvalidTransition {
                from: QueueStatus::Completed,
                to: QueueStatus::InProgress,
            })
            .status(),
            StatusCode::CONFLICT
        );

        let internal = ApiError::from(TriageError::internal("disk on fire"));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.message, "internal server error");
    }
}
