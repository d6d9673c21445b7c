//! Course catalog, question management and the student test flow.
//!
//! Routes needing `write:courses` carry the permission layer; ownership of the
//! course is checked by the catalog service itself, since it depends on the
//! course being loaded.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post, put},
};

use scholar_auth::PermissionKey;
use scholar_auth::permissions::keys;
use scholar_core::{AnswerOptionId, CourseId, PageRequest, QuestionId};
use scholar_infra::Services;

use crate::app::dto;
use crate::app::errors::ApiResult;
use crate::app::routes::categories;
use crate::authz::RequireExt;
use crate::context::PrincipalContext;

const WRITE_COURSES: &[PermissionKey] = &[keys::WRITE_COURSES];

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(list_courses).merge(post(create_course).require(WRITE_COURSES)),
        )
        .nest("/categories", categories::router())
        .route("/my-courses", get(my_courses))
        .route("/my-courses/:id", get(my_course))
        .route(
            "/teacher/my-courses",
            get(teacher_courses).require(WRITE_COURSES),
        )
        .route(
            "/:id",
            get(get_course).merge(patch(update_course).require(WRITE_COURSES)),
        )
        .route(
            "/:id/questions",
            get(list_questions).merge(post(create_question).require(WRITE_COURSES)),
        )
        .route(
            "/:id/questions/:question_id",
            put(update_question)
                .delete(delete_question)
                .require(WRITE_COURSES),
        )
        .route(
            "/:id/answer-options",
            post(create_answer_option).require(WRITE_COURSES),
        )
        .route(
            "/:id/answer-options/:option_id",
            put(update_answer_option)
                .delete(delete_answer_option)
                .require(WRITE_COURSES),
        )
        .route("/:id/students", get(students).require(WRITE_COURSES))
        .route("/:id/join", post(join))
        .route("/:id/start", post(start))
        .route("/:id/answer", post(answer))
        .route("/:id/finish", post(finish))
        .route("/:id/answers", get(answers))
        .route("/:id/report", get(report))
}

// Catalog

pub async fn list_courses(
    Extension(services): Extension<Arc<Services>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.catalog.list_courses(&page).await?))
}

pub async fn get_course(
    Extension(services): Extension<Arc<Services>>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.catalog.course(id).await?))
}

pub async fn create_course(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateCourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let course = services
        .catalog
        .create_course(ctx.principal(), body.into())
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn update_course(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
    Json(body): Json<dto::UpdateCourseRequest>,
) -> ApiResult<impl IntoResponse> {
    let course = services
        .catalog
        .update_course(ctx.principal(), id, body.into())
        .await?;
    Ok(Json(course))
}

pub async fn teacher_courses(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        services
            .catalog
            .taught_courses(ctx.principal(), &page)
            .await?,
    ))
}

pub async fn students(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
    Query(query): Query<dto::RosterQuery>,
) -> ApiResult<impl IntoResponse> {
    let roster = services
        .catalog
        .roster(ctx.principal(), id, &query.page_request(), query.with_result)
        .await?;
    Ok(Json(roster))
}

// Questions and answer options

pub async fn list_questions(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.catalog.questions(ctx.principal(), id).await?))
}

pub async fn create_question(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
    Json(body): Json<dto::QuestionRequest>,
) -> ApiResult<impl IntoResponse> {
    let question = services
        .catalog
        .create_question(ctx.principal(), id, &body.question)
        .await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, question_id)): Path<(CourseId, QuestionId)>,
    Json(body): Json<dto::QuestionRequest>,
) -> ApiResult<impl IntoResponse> {
    let question = services
        .catalog
        .update_question(ctx.principal(), id, question_id, &body.question)
        .await?;
    Ok(Json(question))
}

pub async fn delete_question(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, question_id)): Path<(CourseId, QuestionId)>,
) -> ApiResult<impl IntoResponse> {
    services
        .catalog
        .delete_question(ctx.principal(), id, question_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_answer_option(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
    Json(body): Json<dto::CreateAnswerOptionRequest>,
) -> ApiResult<impl IntoResponse> {
    let option = services
        .catalog
        .create_answer_option(
            ctx.principal(),
            id,
            body.question_id,
            &body.value,
            body.is_correct,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(option)))
}

pub async fn update_answer_option(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, option_id)): Path<(CourseId, AnswerOptionId)>,
    Json(body): Json<dto::UpdateAnswerOptionRequest>,
) -> ApiResult<impl IntoResponse> {
    let option = services
        .catalog
        .update_answer_option(
            ctx.principal(),
            id,
            option_id,
            body.value.as_deref(),
            body.is_correct,
        )
        .await?;
    Ok(Json(option))
}

pub async fn delete_answer_option(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path((id, option_id)): Path<(CourseId, AnswerOptionId)>,
) -> ApiResult<impl IntoResponse> {
    services
        .catalog
        .delete_answer_option(ctx.principal(), id, option_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// Test flow

pub async fn join(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    let enrollment = services.progress.join(ctx.principal(), id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn start(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.progress.start(ctx.principal(), id).await?))
}

pub async fn answer(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
    Json(body): Json<dto::AnswerRequest>,
) -> ApiResult<impl IntoResponse> {
    let answer = services
        .progress
        .answer(ctx.principal(), id, body.question_id, body.answer_id)
        .await?;
    Ok(Json(answer))
}

pub async fn finish(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    let (enrollment, report) = services.progress.finish(ctx.principal(), id).await?;
    Ok(Json(dto::FinishResponse {
        enrollment,
        report: report.into(),
    }))
}

pub async fn answers(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(services.progress.answers(ctx.principal(), id).await?))
}

pub async fn report(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    let report = services.progress.report(ctx.principal(), id).await?;
    Ok(Json(dto::ReportResponse::from(report)))
}

// Student listings

pub async fn my_courses(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Query(page): Query<PageRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        services
            .progress
            .enrolled_courses(ctx.principal(), &page)
            .await?,
    ))
}

pub async fn my_course(
    Extension(services): Extension<Arc<Services>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<CourseId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        services
            .progress
            .enrolled_course(ctx.principal(), id)
            .await?,
    ))
}
