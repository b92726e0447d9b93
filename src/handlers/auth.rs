// src/handlers/auth.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::auth::{AuthResponse, LoginPayload, Session},
};

// POST /api/auth/login
pub async fn login(
    State(app_state): State<AppState>,
    locale: Locale,
    Json(payload): Json<LoginPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let (token, session) = app_state
        .auth_service
        .sign_in(&payload.username, &payload.password)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            token,
            profile: session.actor,
        }),
    ))
}

// POST /api/auth/logout
pub async fn logout(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .auth_service
        .sign_out(&session)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}

// GET /api/users/me
pub async fn get_me(session: Session) -> impl IntoResponse {
    Json(session.actor)
}
