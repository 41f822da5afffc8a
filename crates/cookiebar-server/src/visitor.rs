//! Request-derived identity: the visiting client and admin access.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;

use crate::state::AppContext;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const USER_ID_HEADER: &str = "x-user-id";

/// The client behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visitor {
    pub ip: String,
    /// Logged-in user, as asserted by the fronting site.
    pub user_id: Option<i64>,
}

impl Visitor {
    /// Identify the client. With `trust_proxy` the first `X-Forwarded-For`
    /// hop (then `X-Real-IP`) is used; those headers are client-controlled
    /// unless a reverse proxy rewrites them. Otherwise the socket peer is used.
    pub fn from_parts(parts: &Parts, trust_proxy: bool) -> Self {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let forwarded = trust_proxy
            .then(|| {
                header("x-forwarded-for")
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
                    .or_else(|| header("x-real-ip").map(String::from))
            })
            .flatten();

        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_id = header(USER_ID_HEADER)
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|id| *id > 0);

        Self { ip, user_id }
    }
}

impl FromRequestParts<Arc<AppContext>> for Visitor {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.config.trust_proxy))
    }
}

/// Mask the host part of an address: IPv4 keeps three octets, IPv6 keeps
/// the /48 prefix. Strings that are not addresses are returned unchanged.
pub fn anonymize_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => {
            let [a, b, c, _] = v4.octets();
            format!("{}.{}.{}.0", a, b, c)
        }
        Ok(IpAddr::V6(v6)) => {
            let s = v6.segments();
            std::net::Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0).to_string()
        }
        Err(_) => ip.to_string(),
    }
}

/// Whether the request may perform admin operations. With no token
/// configured every caller is trusted.
pub fn is_admin(ctx: &AppContext, headers: &HeaderMap) -> bool {
    match ctx.config.admin_token.as_deref() {
        None => true,
        Some(expected) => headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|given| given == expected),
    }
}

/// Extractor guarding the admin API.
pub struct RequireAdmin;

impl FromRequestParts<Arc<AppContext>> for RequireAdmin {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        if is_admin(state, &parts.headers) {
            Ok(RequireAdmin)
        } else {
            Err((
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "Admin token required" })),
            ))
        }
    }
}
