//! HTTP route handlers.

pub mod admin;
pub mod banner;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppContext;

/// Build the main Axum router with all routes.
pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/banner", get(banner::banner_page))
        .nest("/api", api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn api_routes() -> Router<Arc<AppContext>> {
    Router::new()
        .merge(crate::ajax::routes())
        .merge(banner::routes())
        .merge(admin::routes())
}
