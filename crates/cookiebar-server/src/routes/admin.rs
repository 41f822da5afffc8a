//! Admin API: settings, detected cookies and the consent log.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use cookiebar_store::LogFilter;
use tracing::error;

use crate::scan::LastScan;
use crate::state::AppContext;
use crate::visitor::RequireAdmin;
use cookiebar_store::schema::LAST_SCAN_OPTION;

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/settings", get(get_settings))
        .route("/cookies", get(list_cookies))
        .route("/consent/logs", get(consent_logs))
        .route("/consent/export", get(export_consent_logs))
        .route("/health", get(health))
}

async fn get_settings(
    _admin: RequireAdmin,
    State(ctx): State<Arc<AppContext>>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "settings": ctx.settings() }))
}

async fn list_cookies(
    _admin: RequireAdmin,
    State(ctx): State<Arc<AppContext>>,
) -> Json<serde_json::Value> {
    let cookies = ctx.detected_cookies();
    let uncategorized = cookies.iter().filter(|c| c.category.is_none()).count();
    let last_scan = ctx
        .store
        .get_option::<LastScan>(LAST_SCAN_OPTION)
        .ok()
        .flatten();
    Json(serde_json::json!({
        "cookies": cookies,
        "total": cookies.len(),
        "uncategorized": uncategorized,
        "lastScan": last_scan,
        "scanRunning": ctx.is_scan_running(),
    }))
}

async fn consent_logs(
    _admin: RequireAdmin,
    State(ctx): State<Arc<AppContext>>,
    Query(filter): Query<LogFilter>,
) -> impl IntoResponse {
    match ctx.store.get_logs(&filter) {
        Ok(logs) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "count": logs.len(),
                "logs": logs,
            })),
        ),
        Err(e) => {
            error!("Failed to read consent logs: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Could not read consent logs" })),
            )
        }
    }
}

async fn export_consent_logs(
    _admin: RequireAdmin,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    let mut buf = Vec::new();
    match ctx.store.export_logs_csv(&mut buf) {
        Ok(()) => {
            let filename = format!(
                "consent-logs-{}.csv",
                chrono::Utc::now().format("%Y-%m-%d")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                buf,
            )
                .into_response()
        }
        Err(e) => {
            error!("Consent log export failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Export failed" })),
            )
                .into_response()
        }
    }
}

async fn health(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "consentTable": ctx.store.table_exists(),
        "ocdEntries": ctx.ocd.read().len(),
    }))
}
