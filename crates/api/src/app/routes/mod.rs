use axum::Router;

pub mod auth;
pub mod categories;
pub mod courses;
pub mod system;

/// Router for every endpoint behind the session middleware.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/courses", courses::router())
}
