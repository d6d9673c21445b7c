//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, schema and seed
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use scholar_infra::{AppConfig, Services};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(services: Services, config: &AppConfig) -> Router {
    let services = Arc::new(services);
    let auth_state = middleware::AuthState {
        services: services.clone(),
        cookie_name: config.session_cookie.as_str().into(),
    };

    // Protected routes: a resolved principal is required.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/auth", routes::auth::public_router())
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(Extension(routes::auth::SessionCookie::new(
                    config.session_cookie.as_str(),
                ))),
        )
}
