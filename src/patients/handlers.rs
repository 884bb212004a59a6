use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::PatientRequest;
use super::repo_types::{Patient, PatientFilter};
use super::services;
use crate::dto::{MessageResponse, SearchQuery};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(list_patients).post(create_patient))
        .route(
            "/patients/:id",
            get(get_patient).put(update_patient).delete(delete_patient),
        )
}

#[instrument(skip(state))]
pub async fn list_patients(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<Patient>>, AppError> {
    let filter = PatientFilter {
        search: query.search(),
    };
    Ok(Json(services::list(&state, filter).await?))
}

#[instrument(skip(state))]
pub async fn get_patient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Patient>, AppError> {
    Ok(Json(services::get(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_patient(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<PatientRequest>,
) -> Result<impl IntoResponse, AppError> {
    let patient = services::create(&state, payload).await?;
    let location = format!("/api/v1/patients/{}", patient.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(patient)))
}

#[instrument(skip(state, payload))]
pub async fn update_patient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<PatientRequest>,
) -> Result<Json<Patient>, AppError> {
    Ok(Json(services::update(&state, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_patient(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    services::delete(&state, id).await?;
    Ok(Json(MessageResponse::new("patient deleted")))
}
