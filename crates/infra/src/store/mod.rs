//! Relational store abstraction.
//!
//! The traits are split by concern but implemented together by one backend,
//! so services depend on the combined [`Store`]. Every method that moves an
//! enrollment through its lifecycle runs as a single transaction: the domain
//! rule is evaluated against the locked row and the write happens in the same
//! unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use scholar_auth::{
    Organization, PermissionKey, PermissionRecord, PermissionSet, RoleKey, RoleRecord, Session,
    User,
};
use scholar_core::{
    AnswerOptionId, CategoryId, CourseId, OrganizationId, Page, PageRequest, PermissionId,
    QuestionId, RoleId, UserId,
};
use scholar_courses::{
    AnswerOption, Category, Course, CourseDetails, CourseProgress, Enrollment, Question, Report,
    StudentAnswer,
};

use crate::error::StoreResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Users and their sessions.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert the user, join them to `organization` and assign `roles` there,
    /// atomically. Duplicate email → `Conflict`; nothing is written on failure.
    async fn register_user(
        &self,
        user: &User,
        organization: OrganizationId,
        roles: &[RoleId],
    ) -> StoreResult<()>;
    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>>;
    /// `email` is expected to be normalised already.
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn insert_session(&self, session: &Session) -> StoreResult<()>;
    async fn session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>>;
    /// Idempotent.
    async fn delete_session(&self, token_hash: &str) -> StoreResult<()>;
}

/// Organizations, roles, permissions and the edges between them.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn default_organization(&self) -> StoreResult<Option<Organization>>;
    /// A second default organization → `Conflict`.
    async fn insert_organization(&self, organization: &Organization) -> StoreResult<()>;
    async fn role_by_key(&self, key: &RoleKey) -> StoreResult<Option<RoleRecord>>;
    async fn insert_role(&self, role: &RoleRecord) -> StoreResult<()>;
    async fn sign_up_roles(&self) -> StoreResult<Vec<RoleRecord>>;

    async fn permission_by_key(&self, key: &PermissionKey) -> StoreResult<Option<PermissionRecord>>;
    async fn insert_permission(&self, permission: &PermissionRecord) -> StoreResult<()>;

    /// Idempotent.
    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()>;
    /// Idempotent.
    async fn assign_role(
        &self,
        user: UserId,
        role: RoleId,
        organization: OrganizationId,
    ) -> StoreResult<()>;

    /// Union of the permission keys granted to `user` by roles assigned in
    /// `organization`.
    async fn permission_keys_for(
        &self,
        user: UserId,
        organization: OrganizationId,
    ) -> StoreResult<PermissionSet>;
}

/// Categories, courses, teachers, questions and answer options.
#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn list_categories(&self, page: &PageRequest) -> StoreResult<Page<Category>>;
    async fn category(&self, id: CategoryId) -> StoreResult<Option<Category>>;
    /// Duplicate slug → `Conflict`.
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn update_category(&self, category: &Category) -> StoreResult<()>;
    /// A category still referenced by courses → `Conflict`.
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()>;

    /// Insert the course and make `teacher` its first teacher, atomically.
    async fn insert_course(&self, course: &Course, teacher: UserId) -> StoreResult<()>;
    async fn update_course(&self, course: &Course) -> StoreResult<()>;
    async fn course(&self, id: CourseId) -> StoreResult<Option<CourseDetails>>;
    async fn list_courses(&self, page: &PageRequest) -> StoreResult<Page<CourseDetails>>;
    async fn courses_taught_by(
        &self,
        teacher: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseDetails>>;

    /// Questions of a course in creation order.
    async fn questions(&self, course: CourseId) -> StoreResult<Vec<Question>>;
    async fn question(&self, id: QuestionId) -> StoreResult<Option<Question>>;
    async fn insert_question(&self, question: &Question) -> StoreResult<()>;
    async fn update_question(&self, question: &Question) -> StoreResult<()>;
    /// Cascades to the question's options and recorded answers.
    async fn delete_question(&self, id: QuestionId) -> StoreResult<()>;

    /// Every option of every question of the course.
    async fn answer_options(&self, course: CourseId) -> StoreResult<Vec<AnswerOption>>;
    async fn answer_option(&self, id: AnswerOptionId) -> StoreResult<Option<AnswerOption>>;
    async fn insert_answer_option(&self, option: &AnswerOption) -> StoreResult<()>;
    async fn update_answer_option(&self, option: &AnswerOption) -> StoreResult<()>;
    async fn delete_answer_option(&self, id: AnswerOptionId) -> StoreResult<()>;
}

/// Enrollment rows and recorded answers.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn enrollment(&self, student: UserId, course: CourseId)
    -> StoreResult<Option<Enrollment>>;

    /// Duplicate (student, course) → `Conflict`; unknown course → `NotFound`.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()>;

    /// `Joined → Started` on the locked row.
    async fn start_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<Enrollment>;

    /// Upsert the answer for `(student, question)` while the test is running.
    async fn record_answer(
        &self,
        course: CourseId,
        answer: &StudentAnswer,
    ) -> StoreResult<StudentAnswer>;

    /// Score the recorded answers and close the enrollment.
    async fn finish_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Enrollment, Report)>;

    /// The student's answers to questions of `course`.
    async fn answers_for(&self, student: UserId, course: CourseId)
    -> StoreResult<Vec<StudentAnswer>>;

    /// Enrolled students of a course, ordered by join time.
    async fn roster(
        &self,
        course: CourseId,
        page: &PageRequest,
    ) -> StoreResult<Page<(User, Enrollment)>>;

    /// Courses the student joined, most recent first.
    async fn enrolled_courses(
        &self,
        student: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseProgress>>;
}

/// Everything the services need from a backend.
pub trait Store: IdentityStore + DirectoryStore + CourseStore + EnrollmentStore {}

impl<T> Store for T where T: IdentityStore + DirectoryStore + CourseStore + EnrollmentStore {}
