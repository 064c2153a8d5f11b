//! Header-Hilfen und Rate-Limit-Middleware

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::rate_limit::Vorgang;
use crate::state::ApiState;

/// Client-IP: `X-Forwarded-For`, sonst die Peer-Adresse, sonst `unknown`
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Bearer-Token aus dem Authorization-Header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn begrenzen(state: &ApiState, vorgang: Vorgang, req: &Request<Body>) -> Result<(), ApiError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(req.headers(), peer);
    state.limiter.pruefen(vorgang, &ip).map_err(|retry_after_secs| {
        tracing::warn!(ip = %ip, vorgang = ?vorgang, "Rate Limit ueberschritten");
        ApiError::RateLimitUeberschritten { retry_after_secs }
    })
}

pub async fn beitritt_begrenzen(
    State(state): State<ApiState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match begrenzen(&state, Vorgang::Beitreten, &req) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

pub async fn anlegen_begrenzen(
    State(state): State<ApiState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    match begrenzen(&state, Vorgang::Anlegen, &req) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}
