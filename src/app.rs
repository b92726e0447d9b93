// src/app.rs

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde_json::json;

use crate::{config::AppState, handlers, middleware::auth::auth_guard};

// Planilhas de catálogo podem passar do limite padrão de 2 MB
const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn build_router(app_state: AppState) -> Router {
    // Rotas públicas
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/login", post(handlers::auth::login));

    // Rotas protegidas pelo auth_guard
    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/users/me", get(handlers::auth::get_me))
        // Interações
        .route(
            "/api/interactions",
            post(handlers::interactions::create_interaction)
                .get(handlers::interactions::list_interactions),
        )
        .route("/api/interactions/stats", get(handlers::interactions::interaction_stats))
        .route("/api/interactions/live", get(handlers::interactions::live_interactions))
        // Catálogo
        .route("/api/products", get(handlers::products::list_products))
        .route(
            "/api/products/upload",
            post(handlers::products::upload_catalog).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        // Lojas
        .route(
            "/api/stores",
            post(handlers::stores::create_store).get(handlers::stores::list_stores),
        )
        // Usuários
        .route(
            "/api/users",
            post(handlers::users::create_user).get(handlers::users::list_users),
        )
        .route("/api/users/{id}", delete(handlers::users::delete_user))
        .route("/api/users/{id}/role", patch(handlers::users::update_role))
        .route("/api/users/{id}/role-options", get(handlers::users::role_options))
        .route("/api/users/{id}/store", put(handlers::users::assign_store))
        .route("/api/users/{id}/password", put(handlers::users::change_password))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}

async fn health(State(app_state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "OK", "store": app_state.store.backend_name() }))
}
