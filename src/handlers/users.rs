// src/handlers/users.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        auth::Session,
        store::{AssignStorePayload, ChangePasswordPayload, CreateUserPayload, UpdateRolePayload},
    },
};

// GET /api/users
pub async fn list_users(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    let users = app_state
        .admin_service
        .list_users(&session)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(users)))
}

// POST /api/users
pub async fn create_user(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Json(payload): Json<CreateUserPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let user = app_state
        .admin_service
        .create_user(&session, payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(user)))
}

// PATCH /api/users/{id}/role
pub async fn update_role(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateRolePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = app_state
        .admin_service
        .update_role(&session, user_id, payload.role)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(user)))
}

// GET /api/users/{id}/role-options
pub async fn role_options(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let roles = app_state
        .admin_service
        .role_options(&session, user_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(roles)))
}

// PUT /api/users/{id}/store
pub async fn assign_store(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignStorePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = app_state
        .admin_service
        .assign_store(&session, user_id, payload.store_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(user)))
}

// PUT /api/users/{id}/password
pub async fn change_password(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ChangePasswordPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    app_state
        .admin_service
        .force_set_password(&session, user_id, &payload.new_password)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/users/{id}
pub async fn delete_user(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = app_state
        .admin_service
        .delete_user(&session, user_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(deleted)))
}
