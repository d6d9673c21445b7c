use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use scholar_auth::{IssuedSession, Principal, User};
use scholar_core::{AnswerOptionId, CategoryId, OrganizationId, PageRequest, QuestionId};
use scholar_courses::{Enrollment, NewCourse, QuestionResult, Report};
use scholar_infra::services::CourseChanges;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub name: String,
    pub image: Option<String>,
    pub category_id: CategoryId,
    /// Minutes; 0 means untimed.
    #[serde(default)]
    pub test_duration: u32,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<CreateCourseRequest> for NewCourse {
    fn from(value: CreateCourseRequest) -> Self {
        NewCourse {
            name: value.name,
            image: value.image,
            category_id: value.category_id,
            test_duration: value.test_duration,
            published_at: value.published_at,
        }
    }
}

/// Absent fields are left unchanged; `"image": null` clears the image.
#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
    pub category_id: Option<CategoryId>,
    pub test_duration: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl From<UpdateCourseRequest> for CourseChanges {
    fn from(value: UpdateCourseRequest) -> Self {
        CourseChanges {
            name: value.name,
            image: value.image,
            category_id: value.category_id,
            test_duration: value.test_duration,
            published_at: value.published_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateAnswerOptionRequest {
    pub question_id: QuestionId,
    pub value: String,
    #[serde(default)]
    pub is_correct: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnswerOptionRequest {
    pub value: Option<String>,
    pub is_correct: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub question_id: QuestionId,
    pub answer_id: AnswerOptionId,
}

/// Query of the course roster. Kept flat because urlencoded numbers do not
/// survive `#[serde(flatten)]`.
#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub search: Option<String>,
    #[serde(default)]
    pub with_result: bool,
}

impl RosterQuery {
    pub fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
            search: self.search.clone(),
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl SessionResponse {
    pub fn new(issued: &IssuedSession, user: User) -> Self {
        Self {
            token: issued.token.as_str().to_string(),
            expires_at: issued.session.expires_at,
            user,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub organization_id: OrganizationId,
    pub permissions: Vec<String>,
}

impl From<&Principal> for MeResponse {
    fn from(value: &Principal) -> Self {
        Self {
            user: value.user.clone(),
            organization_id: value.organization_id,
            permissions: value
                .permissions
                .iter()
                .map(|k| k.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub score: u32,
    pub is_passed: bool,
    pub question_count: usize,
    pub results: Vec<QuestionResult>,
}

impl From<Report> for ReportResponse {
    fn from(value: Report) -> Self {
        Self {
            score: value.score(),
            is_passed: value.is_passed(),
            question_count: value.question_count(),
            results: value.results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FinishResponse {
    pub enrollment: Enrollment,
    pub report: ReportResponse,
}
