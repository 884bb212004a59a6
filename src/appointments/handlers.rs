use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::{AppointmentQuery, AppointmentRequest, CancelRequest};
use super::repo_types::{Appointment, AppointmentListItem};
use super::services;
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery, OptionalJson};
use crate::state::AppState;

pub fn appointment_routes() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/:id", get(get_appointment).put(update_appointment))
        .route("/appointments/:id/cancel", post(cancel_appointment))
        .route("/appointments/:id/complete", post(complete_appointment))
}

#[instrument(skip(state))]
pub async fn list_appointments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AppointmentQuery>,
) -> Result<Json<Vec<AppointmentListItem>>, AppError> {
    let filter = query.into_filter()?;
    Ok(Json(services::list(&state, filter).await?))
}

#[instrument(skip(state))]
pub async fn get_appointment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(services::get(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_appointment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AppointmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let appointment = services::create(&state, payload).await?;
    let location = format!("/api/v1/appointments/{}", appointment.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(appointment)))
}

#[instrument(skip(state, payload))]
pub async fn update_appointment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<AppointmentRequest>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(services::update(&state, id, payload).await?))
}

/// POST /appointments/:id/cancel, body `{ "reason": "..." }` is optional.
#[instrument(skip(state, body))]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    OptionalJson(body): OptionalJson<CancelRequest>,
) -> Result<Json<Appointment>, AppError> {
    let reason = body.and_then(|b| b.reason);
    Ok(Json(services::cancel(&state, id, reason).await?))
}

#[instrument(skip(state))]
pub async fn complete_appointment(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(services::complete(&state, id).await?))
}
