// src/handlers/interactions.rs

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures_util::{stream, Stream};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::i18n::Locale,
    models::{
        auth::Session,
        interaction::{CreateInteractionPayload, InteractionFilter},
    },
    services::live::InteractionFeed,
};

// POST /api/interactions
pub async fn create_interaction(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Json(payload): Json<CreateInteractionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::from(e).to_api_error(&locale))?;

    let interaction = app_state
        .interaction_service
        .create(&session, payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(interaction)))
}

// GET /api/interactions?status=&startDate=&endDate=&storeId=&userId=&reason=
pub async fn list_interactions(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Query(filter): Query<InteractionFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let interactions = app_state
        .interaction_service
        .list(&session, filter)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(interactions)))
}

// GET /api/interactions/stats
pub async fn interaction_stats(
    State(app_state): State<AppState>,
    locale: Locale,
    session: Session,
    Query(filter): Query<InteractionFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = app_state
        .interaction_service
        .stats(&session, filter)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(stats)))
}

// GET /api/interactions/live (Server-Sent Events)
pub async fn live_interactions(
    State(app_state): State<AppState>,
    session: Session,
    Query(filter): Query<InteractionFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let feed = InteractionFeed::start(app_state.interaction_service.clone(), session, filter);

    // O feed vive dentro do stream: cliente desconectou -> stream dropado -> task abortada
    let events = stream::unfold(feed, |mut feed| async move {
        let views = feed.next().await?;
        let event = Event::default()
            .event("interactions")
            .json_data(&views)
            .unwrap_or_else(|e| {
                tracing::error!("Falha ao serializar o feed: {}", e);
                Event::default().event("error").data("serialization")
            });
        Some((Ok(event), feed))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
