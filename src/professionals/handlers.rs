use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::dto::ProfessionalRequest;
use super::repo_types::{Professional, ProfessionalFilter};
use super::services;
use crate::dto::{MessageResponse, SearchQuery};
use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn professional_routes() -> Router<AppState> {
    Router::new()
        .route("/professionals", get(list_professionals).post(create_professional))
        .route(
            "/professionals/:id",
            get(get_professional)
                .put(update_professional)
                .delete(delete_professional),
        )
}

#[instrument(skip(state))]
pub async fn list_professionals(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<Professional>>, AppError> {
    let filter = ProfessionalFilter {
        search: query.search(),
    };
    Ok(Json(services::list(&state, filter).await?))
}

#[instrument(skip(state))]
pub async fn get_professional(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Professional>, AppError> {
    Ok(Json(services::get(&state, id).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_professional(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ProfessionalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let professional = services::create(&state, payload).await?;
    let location = format!("/api/v1/professionals/{}", professional.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(professional)))
}

#[instrument(skip(state, payload))]
pub async fn update_professional(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ProfessionalRequest>,
) -> Result<Json<Professional>, AppError> {
    Ok(Json(services::update(&state, id, payload).await?))
}

#[instrument(skip(state))]
pub async fn delete_professional(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    services::delete(&state, id).await?;
    Ok(Json(MessageResponse::new("professional deleted")))
}
