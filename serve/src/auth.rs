//! Auth guard (§6): every `/chat*` and `/files*` route requires a bearer token or an
//! `access_token` cookie, validated by forwarding it to the Core service's `/auth/me`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;

use crate::app::AppState;

/// An authenticated caller. Handlers take this as a parameter to opt into the auth check;
/// `token` is forwarded unchanged to downstream Core-service calls.
pub struct AuthUser {
    pub token: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).or_else(|| cookie_token(parts)).ok_or_else(unauthorized)?;

        let Some(core) = &state.core else {
            return Err(unauthorized());
        };
        core.auth_me(&token).await.map_err(|_| unauthorized())?;

        Ok(AuthUser { token })
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == "access_token").then(|| value.to_string())
    })
}

fn unauthorized() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "missing or invalid credentials" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts_with_header(name: axum::http::HeaderName, value: &str) -> Parts {
        let mut req = Request::builder().body(()).unwrap();
        req.headers_mut().insert(name, HeaderValue::from_str(value).unwrap());
        req.into_parts().0
    }

    #[test]
    fn bearer_token_strips_prefix() {
        let parts = parts_with_header(axum::http::header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(bearer_token(&parts), Some("abc123".to_string()));
    }

    #[test]
    fn cookie_token_finds_access_token_among_multiple_cookies() {
        let parts = parts_with_header(axum::http::header::COOKIE, "foo=bar; access_token=xyz; baz=qux");
        assert_eq!(cookie_token(&parts), Some("xyz".to_string()));
    }

    #[test]
    fn cookie_token_absent_when_no_access_token_cookie() {
        let parts = parts_with_header(axum::http::header::COOKIE, "foo=bar");
        assert_eq!(cookie_token(&parts), None);
    }
}
