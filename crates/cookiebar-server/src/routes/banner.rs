//! Visitor-facing routes: the banner, the category list and shortcodes.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::warn;

use cookiebar_banner::{generate_banner_html, render_head_scripts, render_shortcodes, ShortcodeContext};

use crate::state::AppContext;
use crate::visitor::{anonymize_ip, Visitor};

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/shortcode", post(expand_shortcodes))
}

/// Head scripts followed by the banner markup, ready to inject into a page.
pub async fn banner_page(State(ctx): State<Arc<AppContext>>) -> Html<String> {
    let settings = ctx.settings();
    let categories = cookiebar_core::get_categories(&settings);
    let mut html = render_head_scripts(&settings);
    html.push_str(&generate_banner_html(&settings, &categories));
    Html(html)
}

async fn list_categories(State(ctx): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    let categories: Vec<_> = ctx.categories().into_values().collect();
    Json(serde_json::json!({ "categories": categories }))
}

#[derive(serde::Deserialize)]
struct ShortcodeBody {
    content: String,
}

async fn expand_shortcodes(
    State(ctx): State<Arc<AppContext>>,
    visitor: Visitor,
    Json(body): Json<ShortcodeBody>,
) -> Json<serde_json::Value> {
    let settings = ctx.settings();
    let categories = cookiebar_core::get_categories(&settings);

    // Records are keyed by the address as it was stored.
    let ip = if settings.anonymize_ip {
        anonymize_ip(&visitor.ip)
    } else {
        visitor.ip.clone()
    };
    let record = match ctx.store.latest_for_visitor(visitor.user_id, &ip) {
        Ok(record) => record,
        Err(e) => {
            warn!("Could not read consent record for shortcode: {}", e);
            None
        }
    };

    let shortcode_ctx = ShortcodeContext {
        categories: &categories,
        visitor_record: record.as_ref(),
    };
    Json(serde_json::json!({
        "html": render_shortcodes(&body.content, &shortcode_ctx),
    }))
}
