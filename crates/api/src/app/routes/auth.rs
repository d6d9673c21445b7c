use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Extension,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use scholar_core::DomainError;
use scholar_infra::Services;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::context::PrincipalContext;

/// Name and attributes of the session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookie {
    name: Arc<str>,
}

impl SessionCookie {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    fn set(&self, token: &str, max_age_secs: i64) -> String {
        format!(
            "{}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}",
            self.name
        )
    }

    fn clear(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", self.name)
    }
}

/// Endpoints reachable without a session.
pub fn public_router() -> Router {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
}

pub fn router() -> Router {
    Router::new()
        .route("/sign-out", post(sign_out))
        .route("/me", get(me))
}

pub async fn sign_up(
    Extension(services): Extension<Arc<Services>>,
    Json(body): Json<dto::SignUpRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = services
        .sessions
        .sign_up(&body.name, &body.email, &body.password)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn sign_in(
    Extension(services): Extension<Arc<Services>>,
    Extension(cookie): Extension<SessionCookie>,
    Json(body): Json<dto::SignInRequest>,
) -> ApiResult<impl IntoResponse> {
    let issued = services.sessions.sign_in(&body.email, &body.password).await?;
    let user = services
        .sessions
        .resolve_user(issued.token.as_str())
        .await?
        .ok_or(DomainError::Unauthenticated)?;

    let max_age = (issued.session.expires_at - issued.session.created_at).num_seconds();
    let set_cookie = cookie.set(issued.token.as_str(), max_age);
    Ok((
        [(header::SET_COOKIE, set_cookie)],
        Json(dto::SessionResponse::new(&issued, user)),
    ))
}

pub async fn sign_out(
    Extension(services): Extension<Arc<Services>>,
    Extension(cookie): Extension<SessionCookie>,
    Extension(ctx): Extension<PrincipalContext>,
) -> ApiResult<impl IntoResponse> {
    services.sessions.sign_out(ctx.token()).await?;
    tracing::info!(user_id = %ctx.user_id(), "signed out");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, cookie.clear())],
    ))
}

pub async fn me(Extension(ctx): Extension<PrincipalContext>) -> Json<dto::MeResponse> {
    Json(dto::MeResponse::from(ctx.principal()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes() {
        let cookie = SessionCookie::new("sid");
        assert_eq!(
            cookie.set("abc", 60),
            "sid=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
        assert!(cookie.clear().starts_with("sid=;"));
        assert!(cookie.clear().ends_with("Max-Age=0"));
    }
}
