use crate::{application::AccountService, web::handlers::*};
use axum::{
    routing::{get, patch},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(service: Arc<AccountService>) -> Router {
    Router::new()
        .route("/api/accounts", get(list_accounts).post(create_account))
        .route(
            "/api/accounts/{id}",
            get(get_account).put(update_account).delete(remove_account),
        )
        .route("/api/accounts/{id}/activate", patch(activate_account))
        .route("/api/accounts/{id}/deactivate", patch(deactivate_account))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
