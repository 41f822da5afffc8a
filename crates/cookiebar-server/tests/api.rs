//! End-to-end tests driving the router in-process with `oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use cookiebar_core::{CookieBarConfig, DataPaths};
use cookiebar_server::{build_router, AppContext, HookRegistry};
use cookiebar_store::{LogFilter, SqliteStore};

struct TestApp {
    _dir: TempDir,
    ctx: Arc<AppContext>,
}

impl TestApp {
    fn new(admin_token: Option<&str>) -> Self {
        let dir = TempDir::new().unwrap();
        let data_paths = DataPaths::new(dir.path().join("data")).unwrap();
        let store = SqliteStore::open(&data_paths.db_dir).unwrap();
        let config = CookieBarConfig {
            port: 0,
            data_paths,
            admin_token: admin_token.map(String::from),
            trust_proxy: true,
        };
        let ctx = AppContext::new(config, store, HookRegistry::new());
        Self { _dir: dir, ctx }
    }

    fn router(&self) -> Router {
        build_router(self.ctx.clone())
    }

    async fn ajax(&self, body: Value, headers: &[(&str, &str)]) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/ajax")
            .header("content-type", "application/json");
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = self
            .router()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn ajax_raw(&self, body: &str, content_type: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api/ajax")
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, String) {
        let mut req = Request::builder().uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = self
            .router()
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }
}

#[tokio::test]
async fn test_log_consent_creates_table_and_records() {
    let app = TestApp::new(None);
    assert!(!app.ctx.store.table_exists());

    let consent = json!({
        "categories": { "necessary": true, "analytics": true, "marketing": false },
        "consent_source": "banner"
    });
    let (status, body) = app
        .ajax(
            json!({ "action": "log_consent", "nonce": "abc", "consent_data": consent }),
            &[("x-forwarded-for", "203.0.113.9"), ("x-user-id", "7")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(app.ctx.store.table_exists());

    let logs = app.ctx.store.get_logs(&LogFilter::default()).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].ip_address, "203.0.113.9");
    assert_eq!(logs[0].user_id, Some(7));
    assert_eq!(logs[0].consent_data, consent);
}

#[tokio::test]
async fn test_log_consent_accepts_json_string_and_source() {
    let app = TestApp::new(None);
    let (_, body) = app
        .ajax(
            json!({
                "action": "custom_cookie_log_consent",
                "consent_data": r#"{"categories":{"necessary":true,"functional":true}}"#,
                "source": "settings_panel"
            }),
            &[("x-forwarded-for", "198.51.100.20")],
        )
        .await;
    assert_eq!(body["success"], true);

    let logs = app.ctx.store.get_logs(&LogFilter::default()).unwrap();
    assert_eq!(logs[0].consent_data["consent_source"], "settings_panel");
    assert_eq!(logs[0].user_id, None);
    assert_eq!(logs[0].granted_categories(), ["necessary", "functional"]);
}

#[tokio::test]
async fn test_log_consent_respects_settings() {
    let app = TestApp::new(None);
    let (_, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "anonymize_ip": true }), &[])
        .await;
    assert_eq!(body["success"], true);

    app.ajax(
        json!({ "action": "log_consent", "consent_data": { "categories": { "necessary": true } } }),
        &[("x-forwarded-for", "203.0.113.77")],
    )
    .await;
    let logs = app.ctx.store.get_logs(&LogFilter::default()).unwrap();
    assert_eq!(logs[0].ip_address, "203.0.113.0");

    app.ajax(json!({ "action": "save_cookie_settings", "log_consents": false }), &[])
        .await;
    let (_, body) = app
        .ajax(
            json!({ "action": "log_consent", "consent_data": { "categories": {} } }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["logged"], false);
    assert_eq!(app.ctx.store.count_logs().unwrap(), 1);
}

#[tokio::test]
async fn test_log_consent_rejects_non_object() {
    let app = TestApp::new(None);
    let (status, body) = app
        .ajax(json!({ "action": "log_consent", "consent_data": "not json" }), &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["data"]["message"].is_string());
}

#[tokio::test]
async fn test_position_top_reflected_in_banner() {
    let app = TestApp::new(None);
    let (_, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "position": "top" }), &[])
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["settings"]["banner_position"], "top");

    let (status, html) = app.get("/banner", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("cookiebar-position-top"));
    assert!(html.contains(r#"data-position="top""#));
    assert!(html.contains(r#"role="dialog""#));
}

#[tokio::test]
async fn test_settings_form_rejects_unknown_and_invalid_fields() {
    let app = TestApp::new(None);
    let (status, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "favourite_color": "red" }), &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Integration fields belong to their own form.
    let (_, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "gcm_enabled": true }), &[])
        .await;
    assert_eq!(body["success"], false);

    let (_, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "consent_expiry_days": 0 }), &[])
        .await;
    assert_eq!(body["success"], false);
    assert!(body["data"]["message"].as_str().unwrap().contains("consent_expiry_days"));
    assert_eq!(app.ctx.settings().consent_expiry_days, 365);
}

#[tokio::test]
async fn test_integration_and_scanner_forms() {
    let app = TestApp::new(None);
    let (_, body) = app
        .ajax(
            json!({
                "action": "custom_cookie_save_integration_settings",
                "gcm_enabled": true,
                "gcm_wait_for_update": 800
            }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);

    let (_, body) = app
        .ajax(
            json!({ "action": "save_scanner_settings", "scan_frequency": "daily", "scan_paths": ["/", "/shop"] }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);

    let settings = app.ctx.settings();
    assert!(settings.gcm_enabled);
    assert_eq!(settings.gcm_wait_for_update, 800);
    assert_eq!(settings.scan_paths, ["/", "/shop"]);

    let (_, html) = app.get("/banner", &[]).await;
    assert!(html.contains("gtag('consent', 'default'"));
}

#[tokio::test]
async fn test_admin_token_enforced() {
    let app = TestApp::new(Some("s3cret"));

    let (status, body) = app
        .ajax(json!({ "action": "save_cookie_settings", "position": "top" }), &[])
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "success": false, "data": "Permission denied" }));

    let (status, body) = app
        .ajax(
            json!({ "action": "save_cookie_settings", "position": "top" }),
            &[("x-admin-token", "s3cret")],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    // Visitors can always record consent.
    let (_, body) = app
        .ajax(json!({ "action": "log_consent", "consent_data": { "categories": {} } }), &[])
        .await;
    assert_eq!(body["success"], true);

    let (status, _) = app.get("/api/settings", &[]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.get("/api/settings", &[("x-admin-token", "s3cret")]).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_action_fails_with_message() {
    let app = TestApp::new(None);
    let (status, body) = app.ajax(json!({ "action": "drop_tables" }), &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["message"], "Unknown action: drop_tables");

    let (_, body) = app.ajax(json!({ "no_action": true }), &[]).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_export_on_missing_table_is_header_only() {
    let app = TestApp::new(None);
    let (status, csv) = app.get("/api/consent/export", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(csv, "Date,IP,User ID,Categories\n");
    assert!(app.ctx.store.table_exists());
}

#[tokio::test]
async fn test_export_and_log_listing() {
    let app = TestApp::new(None);
    app.ajax(
        json!({
            "action": "log_consent",
            "consent_data": { "categories": { "necessary": true, "analytics": true, "marketing": false } }
        }),
        &[("x-forwarded-for", "192.0.2.5")],
    )
    .await;

    let (_, csv) = app.get("/api/consent/export", &[]).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains(",192.0.2.5,,\"necessary,analytics\""));

    let (status, body) = app.get("/api/consent/logs?ip_address=192.0.2.5", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_scan_snapshot_then_categorize() {
    let app = TestApp::new(None);
    let (_, body) = app
        .ajax(
            json!({
                "action": "custom_cookie_scan_now",
                "cookies": [
                    { "name": "_ga", "domain": ".example.com" },
                    { "name": "zz_internal_flag", "domain": "example.com" }
                ]
            }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true, "{}", body);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["uncategorized"], 1);
    assert!(!app.ctx.is_scan_running());

    let (_, body) = app
        .ajax(
            json!({ "action": "categorize_cookie", "cookie_name": "zz_internal_flag", "category": "functional" }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);

    let (_, body) = app
        .ajax(
            json!({ "action": "categorize_cookie", "cookie_name": "missing", "category": "functional" }),
            &[],
        )
        .await;
    assert_eq!(body["success"], false);

    let (_, body) = app
        .ajax(
            json!({
                "action": "bulk_categorize_cookies",
                "cookies": [
                    { "name": "zz_internal_flag", "category": "marketing" },
                    { "name": "nope", "category": "analytics" }
                ]
            }),
            &[],
        )
        .await;
    assert_eq!(body["data"]["updated"], 1);
    assert_eq!(body["data"]["not_found"], json!(["nope"]));

    let (_, body) = app.get("/api/cookies", &[]).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["uncategorized"], 0);
    let flag = body["cookies"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "zz_internal_flag")
        .unwrap();
    assert_eq!(flag["category"], "marketing");
    assert_eq!(flag["source"], "admin");

    // A rescan keeps the admin label.
    let (_, body) = app
        .ajax(
            json!({ "action": "scan_now", "cookies": [{ "name": "zz_internal_flag", "domain": "example.com" }] }),
            &[],
        )
        .await;
    assert_eq!(body["data"]["uncategorized"], 0);
}

#[tokio::test]
async fn test_shortcode_endpoint_uses_visitor_record() {
    let app = TestApp::new(None);
    let headers = [("x-forwarded-for", "192.0.2.44")];

    let req = |content: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/shortcode")
            .header("content-type", "application/json")
            .header(headers[0].0, headers[0].1)
            .body(Body::from(json!({ "content": content }).to_string()))
            .unwrap()
    };

    let resp = app.router().oneshot(req("[show_my_consent_data]")).await.unwrap();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["html"].as_str().unwrap().contains("No consent has been recorded"));

    app.ajax(
        json!({ "action": "log_consent", "consent_data": { "categories": { "necessary": true, "analytics": true } } }),
        &headers,
    )
    .await;

    let resp = app
        .router()
        .oneshot(req("[show_my_consent_data] [cookie_settings text=\"Change\"]"))
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let html = body["html"].as_str().unwrap();
    assert!(html.contains(r#"<tr data-category="analytics"><th>Analytics</th><td>Allowed</td></tr>"#));
    assert!(html.contains(">Change</a>"));
}

#[tokio::test]
async fn test_categories_and_health() {
    let app = TestApp::new(None);
    let (_, body) = app.get("/api/categories", &[]).await;
    let body: Value = serde_json::from_str(&body).unwrap();
    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 4);
    let required: Vec<&Value> = categories.iter().filter(|c| c["required"] == true).collect();
    assert_eq!(required.len(), 1);
    assert_eq!(required[0]["key"], "necessary");

    let (status, body) = app.get("/api/health", &[]).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["ocdEntries"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_unparseable_body_gets_envelope() {
    let app = TestApp::new(None);
    let (status, body) = app.ajax_raw("{not json", "application/json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["data"]["message"].is_string());

    let (status, body) = app
        .ajax_raw("action=log_consent", "application/x-www-form-urlencoded")
        .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["success"], false);
    assert!(body["data"]["message"].is_string());
}

#[tokio::test]
async fn test_ocd_refresh_failure_keeps_current_database() {
    let app = TestApp::new(None);
    let (_, health) = app.get("/api/health", &[]).await;
    let before: Value = serde_json::from_str(&health).unwrap();

    let (_, body) = app
        .ajax(
            json!({ "action": "save_scanner_settings", "ocd_url": "http://127.0.0.1:9/open-cookie-database.csv" }),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);

    let (status, body) = app
        .ajax(json!({ "action": "custom_cookie_force_ocd_update" }), &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["data"]["message"].is_string());

    let (_, health) = app.get("/api/health", &[]).await;
    let after: Value = serde_json::from_str(&health).unwrap();
    assert_eq!(after["ocdEntries"], before["ocdEntries"]);
}
