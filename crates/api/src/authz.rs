//! Per-route permission guard.
//!
//! The layer runs after the session middleware and before the handler, so a
//! rejected request never reaches service code.

use axum::{
    Extension,
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};

use scholar_auth::{PermissionKey, RequirePermissions, authorize};
use scholar_core::DomainError;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub async fn require_permissions(
    State(keys): State<&'static [PermissionKey]>,
    Extension(ctx): Extension<PrincipalContext>,
    req: Request,
    next: Next,
) -> Response {
    match authorize(Some(ctx.principal()), RequirePermissions(keys)) {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::info!(user_id = %ctx.user_id(), error = %e, "request denied");
            ApiError::from(DomainError::from(e)).into_response()
        }
    }
}

/// `post(handler).require(KEYS)`: every key in `KEYS` must be held.
pub trait RequireExt {
    fn require(self, keys: &'static [PermissionKey]) -> Self;
}

impl RequireExt for MethodRouter {
    fn require(self, keys: &'static [PermissionKey]) -> Self {
        self.route_layer(middleware::from_fn_with_state(keys, require_permissions))
    }
}
