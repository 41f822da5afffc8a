//! `POST /api/ajax`: the action endpoint used by the banner script and the
//! admin screens.
//!
//! Every action is reachable under two names, the bare one and the
//! `custom_cookie_` prefixed one. Replies use the envelope
//! `{ "success": bool, "data": ... }`; failure data is either a plain
//! string or `{ "message": ... }`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use cookiebar_core::settings::{
    CookieSettingsForm, IntegrationSettingsForm, ScannerSettingsForm, SettingsForm,
};
use cookiebar_core::CategoryKey;
use cookiebar_scanner::{bulk_categorize, categorize, CookieObservation};

use crate::scan::{force_ocd_update, run_scan};
use crate::state::AppContext;
use crate::visitor::{anonymize_ip, is_admin, Visitor};

/// Request fields that carry no payload.
const IGNORED_FIELDS: [&str; 4] = ["action", "nonce", "_ajax_nonce", "security"];

#[derive(Debug, Clone, Serialize)]
pub struct AjaxResponse {
    pub success: bool,
    pub data: Value,
}

impl AjaxResponse {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    /// Failure carrying `{ "message": .. }`.
    pub fn fail_message(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: json!({ "message": message.into() }),
        }
    }

    /// Failure carrying a bare string.
    pub fn fail_text(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::String(message.into()),
        }
    }
}

type AjaxReply = (StatusCode, Json<AjaxResponse>);

fn reply(status: StatusCode, response: AjaxResponse) -> AjaxReply {
    (status, Json(response))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AjaxAction {
    ScanNow,
    CategorizeCookie,
    BulkCategorizeCookies,
    SaveCookieSettings,
    SaveIntegrationSettings,
    SaveScannerSettings,
    LogConsent,
    ForceOcdUpdate,
}

/// Registered action names. Both naming schemes are listed explicitly.
const ACTIONS: &[(&str, AjaxAction)] = &[
    ("scan_now", AjaxAction::ScanNow),
    ("custom_cookie_scan_now", AjaxAction::ScanNow),
    ("categorize_cookie", AjaxAction::CategorizeCookie),
    ("custom_cookie_categorize_cookie", AjaxAction::CategorizeCookie),
    ("bulk_categorize_cookies", AjaxAction::BulkCategorizeCookies),
    ("custom_cookie_bulk_categorize_cookies", AjaxAction::BulkCategorizeCookies),
    ("save_cookie_settings", AjaxAction::SaveCookieSettings),
    ("custom_cookie_save_cookie_settings", AjaxAction::SaveCookieSettings),
    ("save_integration_settings", AjaxAction::SaveIntegrationSettings),
    ("custom_cookie_save_integration_settings", AjaxAction::SaveIntegrationSettings),
    ("save_scanner_settings", AjaxAction::SaveScannerSettings),
    ("custom_cookie_save_scanner_settings", AjaxAction::SaveScannerSettings),
    ("log_consent", AjaxAction::LogConsent),
    ("custom_cookie_log_consent", AjaxAction::LogConsent),
    ("force_ocd_update", AjaxAction::ForceOcdUpdate),
    ("custom_cookie_force_ocd_update", AjaxAction::ForceOcdUpdate),
];

impl AjaxAction {
    pub fn from_name(name: &str) -> Option<Self> {
        ACTIONS
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, action)| *action)
    }

    /// Every registered name, in registration order.
    pub fn registered_names() -> impl Iterator<Item = &'static str> {
        ACTIONS.iter().map(|(name, _)| *name)
    }

    /// Only consent logging is open to visitors.
    pub fn requires_admin(&self) -> bool {
        !matches!(self, AjaxAction::LogConsent)
    }
}

pub fn routes() -> Router<Arc<AppContext>> {
    Router::new().route("/ajax", post(handle_ajax))
}

// ---------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct ScanNowRequest {
    /// Cookies captured elsewhere; when absent the site is fetched.
    #[serde(default)]
    cookies: Option<Vec<CookieObservation>>,
}

#[derive(Debug, Deserialize)]
struct CategorizeRequest {
    cookie_name: String,
    category: CategoryKey,
}

#[derive(Debug, Deserialize)]
struct CookieLabel {
    name: String,
    category: CategoryKey,
}

#[derive(Debug, Deserialize)]
struct BulkCategorizeRequest {
    cookies: Vec<CookieLabel>,
}

#[derive(Debug, Deserialize)]
struct LogConsentRequest {
    consent_data: Value,
    #[serde(default)]
    source: Option<String>,
}

fn parse<T: DeserializeOwned>(fields: Map<String, Value>) -> Result<T, AjaxReply> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| {
        reply(
            StatusCode::BAD_REQUEST,
            AjaxResponse::fail_message(format!("Invalid request: {}", e)),
        )
    })
}

// ---------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------

async fn handle_ajax(
    State(ctx): State<Arc<AppContext>>,
    visitor: Visitor,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> AjaxReply {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!("Rejected AJAX body from {}: {}", visitor.ip, rejection.body_text());
            return reply(
                rejection.status(),
                AjaxResponse::fail_message(rejection.body_text()),
            );
        }
    };
    let Value::Object(mut fields) = body else {
        return reply(
            StatusCode::BAD_REQUEST,
            AjaxResponse::fail_message("Request body must be a JSON object"),
        );
    };

    let name = fields
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let Some(action) = AjaxAction::from_name(&name) else {
        warn!("Unknown AJAX action {:?}", name);
        return reply(
            StatusCode::BAD_REQUEST,
            AjaxResponse::fail_message(format!("Unknown action: {}", name)),
        );
    };

    if action.requires_admin() && !is_admin(&ctx, &headers) {
        warn!("Rejected {} from {}: missing admin token", name, visitor.ip);
        return reply(StatusCode::FORBIDDEN, AjaxResponse::fail_text("Permission denied"));
    }

    for key in IGNORED_FIELDS {
        fields.remove(key);
    }
    debug!("AJAX {} ({:?})", name, action);

    let result = match action {
        AjaxAction::ScanNow => scan_now(&ctx, fields).await,
        AjaxAction::CategorizeCookie => categorize_cookie(&ctx, fields),
        AjaxAction::BulkCategorizeCookies => bulk_categorize_cookies(&ctx, fields),
        AjaxAction::SaveCookieSettings => save_form::<CookieSettingsForm>(&ctx, fields),
        AjaxAction::SaveIntegrationSettings => save_form::<IntegrationSettingsForm>(&ctx, fields),
        AjaxAction::SaveScannerSettings => save_form::<ScannerSettingsForm>(&ctx, fields),
        AjaxAction::LogConsent => log_consent(&ctx, &visitor, fields),
        AjaxAction::ForceOcdUpdate => ocd_update(&ctx).await,
    };

    match result {
        Ok(data) => reply(StatusCode::OK, data),
        Err(failure) => failure,
    }
}

// ---------------------------------------------------------------
// Actions
// ---------------------------------------------------------------

async fn scan_now(
    ctx: &Arc<AppContext>,
    fields: Map<String, Value>,
) -> Result<AjaxResponse, AjaxReply> {
    let req: ScanNowRequest = parse(fields)?;
    match run_scan(ctx, req.cookies).await {
        Ok(summary) => {
            info!(
                "Scan {} found {} cookies ({} uncategorized)",
                summary.scan_id, summary.total, summary.uncategorized
            );
            Ok(AjaxResponse::ok(summary))
        }
        Err(e) => {
            warn!("Scan failed: {}", e);
            Err(reply(StatusCode::OK, AjaxResponse::fail_message(e.to_string())))
        }
    }
}

fn categorize_cookie(
    ctx: &AppContext,
    fields: Map<String, Value>,
) -> Result<AjaxResponse, AjaxReply> {
    let req: CategorizeRequest = parse(fields)?;
    let found = ctx
        .update_detected_cookies(|cookies| categorize(cookies, &req.cookie_name, req.category))
        .map_err(save_failed)?;
    if !found {
        return Err(reply(
            StatusCode::OK,
            AjaxResponse::fail_message(format!("Cookie not found: {}", req.cookie_name)),
        ));
    }
    Ok(AjaxResponse::ok(json!({
        "cookie_name": req.cookie_name,
        "category": req.category,
    })))
}

fn bulk_categorize_cookies(
    ctx: &AppContext,
    fields: Map<String, Value>,
) -> Result<AjaxResponse, AjaxReply> {
    let req: BulkCategorizeRequest = parse(fields)?;
    let labels: Vec<(String, CategoryKey)> = req
        .cookies
        .into_iter()
        .map(|label| (label.name, label.category))
        .collect();

    let result = ctx
        .update_detected_cookies(|cookies| bulk_categorize(cookies, &labels))
        .map_err(save_failed)?;
    Ok(AjaxResponse::ok(result))
}

fn save_failed(e: cookiebar_core::Error) -> AjaxReply {
    warn!("Failed to save detected cookies: {}", e);
    reply(StatusCode::OK, AjaxResponse::fail_text("Could not save cookie categories"))
}

fn save_form<F: SettingsForm + DeserializeOwned>(
    ctx: &AppContext,
    fields: Map<String, Value>,
) -> Result<AjaxResponse, AjaxReply> {
    let form: F = parse(fields)?;
    match ctx.store.apply_settings_form(form) {
        Ok(settings) => Ok(AjaxResponse::ok(json!({
            "message": "Settings saved",
            "settings": settings,
        }))),
        Err(e) => Err(reply(StatusCode::OK, AjaxResponse::fail_message(e.to_string()))),
    }
}

fn log_consent(
    ctx: &AppContext,
    visitor: &Visitor,
    fields: Map<String, Value>,
) -> Result<AjaxResponse, AjaxReply> {
    let req: LogConsentRequest = parse(fields)?;

    // Form posts deliver the decision as a JSON string.
    let mut consent_data = match req.consent_data {
        Value::String(raw) => serde_json::from_str::<Value>(&raw).map_err(|_| {
            reply(
                StatusCode::BAD_REQUEST,
                AjaxResponse::fail_message("consent_data is not valid JSON"),
            )
        })?,
        other => other,
    };
    let Value::Object(data) = &mut consent_data else {
        return Err(reply(
            StatusCode::BAD_REQUEST,
            AjaxResponse::fail_message("consent_data must be an object"),
        ));
    };
    if let Some(source) = req.source.filter(|s| !s.is_empty()) {
        data.entry("consent_source").or_insert(Value::String(source));
    }

    let settings = ctx.settings();
    if !settings.log_consents {
        debug!("Consent logging disabled; not recording");
        return Ok(AjaxResponse::ok(json!({
            "logged": false,
            "message": "Consent logging is disabled",
        })));
    }

    if !ctx.store.create_database_table() {
        return Err(reply(StatusCode::OK, AjaxResponse::fail_text("Failed to log consent")));
    }
    let ip = if settings.anonymize_ip {
        anonymize_ip(&visitor.ip)
    } else {
        visitor.ip.clone()
    };
    if ctx.store.log_consent(&ip, visitor.user_id, &consent_data) {
        Ok(AjaxResponse::ok(json!({
            "logged": true,
            "message": "Consent logged",
        })))
    } else {
        Err(reply(StatusCode::OK, AjaxResponse::fail_text("Failed to log consent")))
    }
}

async fn ocd_update(ctx: &Arc<AppContext>) -> Result<AjaxResponse, AjaxReply> {
    match force_ocd_update(ctx).await {
        Ok(update) => Ok(AjaxResponse::ok(update)),
        Err(e) => Err(reply(StatusCode::OK, AjaxResponse::fail_message(e.to_string()))),
    }
}
