use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use scholar_auth::PermissionKey;
use scholar_auth::permissions::keys;
use scholar_core::{CategoryId, PageRequest};
use scholar_infra::Services;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::authz::RequireExt;
use crate::context::PrincipalContext;

const WRITE_CATEGORIES: &[PermissionKey] = &[keys::WRITE_CATEGORIES];

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_categories).merge(post(create_category).require(WRITE_CATEGORIES)),
        )
        .route(
            "/:id",
            put(update_category)
                .delete(delete_category)
                .require(WRITE_CATEGORIES),
        )
}

pub async fn list_categories(
    Extension(services): Extension<Arc<Services>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.catalog.list_categories(&page).await?))
}

pub async fn create_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let category = services
        .catalog
        .create_category(ctx.principal(), &body.name)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CategoryId>,
    Json(body): Json<dto::UpdateCategoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let category = services
        .catalog
        .update_category(
            ctx.principal(),
            id,
            body.name.as_deref(),
            body.slug.as_deref(),
        )
        .await?;
    Ok(Json(category))
}

pub async fn delete_category(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CategoryId>,
) -> ApiResult<impl IntoResponse> {
    services.catalog.delete_category(ctx.principal(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
