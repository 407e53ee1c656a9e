use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::ServerState;

use super::handlers::transactions;

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/", get(|| async { "Upiledger server" }))
            .route("/transactions", get(transactions::get_transactions))
            .route(
                "/full-refresh-transactions",
                post(transactions::full_refresh_transactions),
            )
            .route("/new-transactions", post(transactions::new_transactions))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
            .fallback(handler_404)
    }
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
