// src/handlers/stores.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{auth::Session, store::CreateStorePayload},
};

// POST /api/stores
pub async fn create_store(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Json(payload): Json<CreateStorePayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let store = app_state
        .admin_service
        .create_store(&session, payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(store)))
}

// GET /api/stores
pub async fn list_stores(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let stores = app_state
        .admin_service
        .list_stores(&session)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(stores)))
}
