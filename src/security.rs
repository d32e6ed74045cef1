#![forbid(unsafe_code)]

//! Bearer-token gate for the HTTP API.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;

/// Decides whether a presented credential is allowed through.
///
/// The pipeline never sees credentials; swapping this for a real identity
/// provider only touches the router setup.
pub trait CredentialCheck: Send + Sync {
    fn verify(&self, token: &str) -> bool;
}

/// Single static shared secret compared by exact match.
pub struct StaticToken {
    secret: String,
}

impl StaticToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialCheck for StaticToken {
    fn verify(&self, token: &str) -> bool {
        constant_time_eq(token.as_bytes(), self.secret.as_bytes())
    }
}

/// Compares every byte regardless of where the first mismatch is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware that rejects requests without a valid bearer token with 401
/// before they reach any handler.
pub async fn require_bearer(
    State(check): State<Arc<dyn CredentialCheck>>,
    request: Request,
    next: Next,
) -> Response {
    match bearer_token(request.headers()) {
        Some(token) if check.verify(token) => next.run(request).await,
        _ => unauthorized(),
    }
}

fn unauthorized() -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Invalid or missing token" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
