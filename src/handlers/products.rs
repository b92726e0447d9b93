// src/handlers/products.rs

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        auth::Session,
        product::{CatalogUploadResponse, ProductSearchQuery},
    },
};

// GET /api/products?search=
pub async fn list_products(
    State(app_state): State<AppState>,
    locale: Locale,
    _session: Session,
    Query(query): Query<ProductSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let products = app_state
        .product_service
        .list(query.search.as_deref())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(products)))
}

// POST /api/products/upload (multipart, campo "file")
pub async fn upload_catalog(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("multipart inválido: {e}")).to_api_error(&locale))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::validation(format!("falha ao ler o arquivo: {e}")).to_api_error(&locale))?;
        upload = Some((file_name, bytes));
        break;
    }

    let Some((file_name, bytes)) = upload else {
        return Err(AppError::validation("o campo 'file' é obrigatório").to_api_error(&locale));
    };

    let products = app_state
        .product_service
        .upload_catalog(&session, &file_name, &bytes)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((
        StatusCode::OK,
        Json(CatalogUploadResponse { file_name, products }),
    ))
}
