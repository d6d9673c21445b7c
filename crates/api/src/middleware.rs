use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use scholar_infra::Services;

use crate::app::errors::{ApiError, json_error};
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub services: Arc<Services>,
    pub cookie_name: Arc<str>,
}

/// Resolve the session behind the request and attach a [`PrincipalContext`].
///
/// Missing, unknown and expired sessions are all rejected with 401 before the
/// handler runs.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers(), &state.cookie_name) else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "a valid session is required",
        );
    };
    let token = token.to_string();

    let principal = match state.services.access.authenticate(&token).await {
        Ok(p) => p,
        Err(e) => return ApiError::from(e).into_response(),
    };

    req.extensions_mut()
        .insert(PrincipalContext::new(principal, token));
    next.run(req).await
}

/// Session token from `Authorization: Bearer …`, falling back to the session
/// cookie.
pub fn extract_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    extract_bearer(headers).or_else(|| extract_cookie(headers, cookie_name))
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn extract_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
