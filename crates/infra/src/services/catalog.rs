//! Course catalog management.
//!
//! Writes are checked twice: the principal must hold the permission key and,
//! for anything inside an existing course, must also teach that course.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use scholar_auth::permissions::keys;
use scholar_auth::{
    Guard, PermissionKey, Principal, RequireOwnership, RequirePermissions, authorize,
};
use scholar_core::{
    AnswerOptionId, CategoryId, CourseId, DomainError, Page, PageRequest, QuestionId,
};
use scholar_courses::{
    AnswerOption, Category, Course, CourseDetails, NewCourse, Question, QuestionView,
    StudentProgress, slugify,
};

use crate::error::ServiceResult;
use crate::store::Store;

const WRITE_COURSES: &[PermissionKey] = &[keys::WRITE_COURSES];
const WRITE_CATEGORIES: &[PermissionKey] = &[keys::WRITE_CATEGORIES];

/// Partial course update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct CourseChanges {
    pub name: Option<String>,
    pub image: Option<Option<String>>,
    pub category_id: Option<CategoryId>,
    pub test_duration: Option<u32>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn require_course(&self, id: CourseId) -> ServiceResult<CourseDetails> {
        self.store
            .course(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("course {id}")).into())
    }

    /// Load a course the principal may edit: `write:courses` and teacher of it.
    async fn owned_course(&self, principal: &Principal, id: CourseId) -> ServiceResult<CourseDetails> {
        let course = self.require_course(id).await?;
        let teachers = course.teacher_ids();
        let guard = RequirePermissions(WRITE_COURSES)
            .and(RequireOwnership::new("course", &teachers));
        authorize(Some(principal), guard)?;
        Ok(course)
    }

    async fn question_in(&self, course: CourseId, id: QuestionId) -> ServiceResult<Question> {
        match self.store.question(id).await? {
            Some(q) if q.course_id == course => Ok(q),
            _ => Err(DomainError::not_found(format!("question {id}")).into()),
        }
    }

    async fn option_in(&self, course: CourseId, id: AnswerOptionId) -> ServiceResult<AnswerOption> {
        let option = self
            .store
            .answer_option(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("answer option {id}")))?;
        self.question_in(course, option.question_id)
            .await
            .map_err(|_| DomainError::not_found(format!("answer option {id}")))?;
        Ok(option)
    }

    // Categories

    pub async fn list_categories(&self, page: &PageRequest) -> ServiceResult<Page<Category>> {
        Ok(self.store.list_categories(page).await?)
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn create_category(&self, principal: &Principal, name: &str) -> ServiceResult<Category> {
        authorize(Some(principal), RequirePermissions(WRITE_CATEGORIES))?;
        let category = Category::new(name)?;
        self.store.insert_category(&category).await?;
        Ok(category)
    }

    /// Rename a category and/or set its slug explicitly.
    ///
    /// A new name without an explicit slug leaves the slug untouched.
    pub async fn update_category(
        &self,
        principal: &Principal,
        id: CategoryId,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> ServiceResult<Category> {
        authorize(Some(principal), RequirePermissions(WRITE_CATEGORIES))?;
        let mut category = self
            .store
            .category(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("category {id}")))?;
        if let Some(name) = name {
            category.name = Category::new(name)?.name;
        }
        if let Some(slug) = slug {
            category.slug = slugify(slug)?;
        }
        self.store.update_category(&category).await?;
        Ok(category)
    }

    pub async fn delete_category(&self, principal: &Principal, id: CategoryId) -> ServiceResult<()> {
        authorize(Some(principal), RequirePermissions(WRITE_CATEGORIES))?;
        Ok(self.store.delete_category(id).await?)
    }

    // Courses

    pub async fn list_courses(&self, page: &PageRequest) -> ServiceResult<Page<CourseDetails>> {
        Ok(self.store.list_courses(page).await?)
    }

    pub async fn course(&self, id: CourseId) -> ServiceResult<CourseDetails> {
        self.require_course(id).await
    }

    /// Courses the principal teaches.
    pub async fn taught_courses(
        &self,
        principal: &Principal,
        page: &PageRequest,
    ) -> ServiceResult<Page<CourseDetails>> {
        Ok(self
            .store
            .courses_taught_by(principal.user_id(), page)
            .await?)
    }

    /// Create a course; its creator becomes its first teacher.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id()))]
    pub async fn create_course(
        &self,
        principal: &Principal,
        input: NewCourse,
    ) -> ServiceResult<CourseDetails> {
        authorize(Some(principal), RequirePermissions(WRITE_COURSES))?;
        if self.store.category(input.category_id).await?.is_none() {
            return Err(DomainError::not_found(format!("category {}", input.category_id)).into());
        }
        let course = Course::create(input, Utc::now())?;
        self.store
            .insert_course(&course, principal.user_id())
            .await?;
        tracing::info!(course_id = %course.id, "course created");
        self.require_course(course.id).await
    }

    pub async fn update_course(
        &self,
        principal: &Principal,
        id: CourseId,
        changes: CourseChanges,
    ) -> ServiceResult<CourseDetails> {
        let mut course = self.owned_course(principal, id).await?.course;
        let now = Utc::now();
        if let Some(name) = changes.name.as_deref() {
            course.rename(name, now)?;
        }
        if let Some(image) = changes.image {
            course.image = image;
        }
        if let Some(category_id) = changes.category_id {
            course.category_id = category_id;
        }
        if let Some(minutes) = changes.test_duration {
            course.set_test_duration(minutes)?;
        }
        if let Some(published_at) = changes.published_at {
            course.published_at = published_at;
        }
        course.updated_at = now;
        self.store.update_course(&course).await?;
        self.require_course(id).await
    }

    // Questions and answer options

    /// Questions with their options. `is_correct` is only shown to the
    /// course's teachers.
    pub async fn questions(
        &self,
        principal: &Principal,
        course: CourseId,
    ) -> ServiceResult<Vec<QuestionView>> {
        let details = self.require_course(course).await?;
        let is_teacher = details.teacher_ids().contains(&principal.user_id());
        let options = self.store.answer_options(course).await?;
        Ok(self
            .store
            .questions(course)
            .await?
            .into_iter()
            .map(|q| QuestionView::new(q, &options, is_teacher))
            .collect())
    }

    #[instrument(skip(self, principal, text), fields(user_id = %principal.user_id()))]
    pub async fn create_question(
        &self,
        principal: &Principal,
        course: CourseId,
        text: &str,
    ) -> ServiceResult<Question> {
        self.owned_course(principal, course).await?;
        let question = Question::new(course, text)?;
        self.store.insert_question(&question).await?;
        Ok(question)
    }

    pub async fn update_question(
        &self,
        principal: &Principal,
        course: CourseId,
        id: QuestionId,
        text: &str,
    ) -> ServiceResult<Question> {
        self.owned_course(principal, course).await?;
        let mut question = self.question_in(course, id).await?;
        question.question = Question::new(course, text)?.question;
        self.store.update_question(&question).await?;
        Ok(question)
    }

    /// Delete a question together with its options and recorded answers.
    pub async fn delete_question(
        &self,
        principal: &Principal,
        course: CourseId,
        id: QuestionId,
    ) -> ServiceResult<()> {
        self.owned_course(principal, course).await?;
        self.question_in(course, id).await?;
        Ok(self.store.delete_question(id).await?)
    }

    pub async fn create_answer_option(
        &self,
        principal: &Principal,
        course: CourseId,
        question: QuestionId,
        value: &str,
        is_correct: bool,
    ) -> ServiceResult<AnswerOption> {
        self.owned_course(principal, course).await?;
        self.question_in(course, question).await?;
        let option = AnswerOption::new(question, value, is_correct)?;
        self.store.insert_answer_option(&option).await?;
        Ok(option)
    }

    pub async fn update_answer_option(
        &self,
        principal: &Principal,
        course: CourseId,
        id: AnswerOptionId,
        value: Option<&str>,
        is_correct: Option<bool>,
    ) -> ServiceResult<AnswerOption> {
        self.owned_course(principal, course).await?;
        let mut option = self.option_in(course, id).await?;
        if let Some(value) = value {
            option.value = AnswerOption::new(option.question_id, value, option.is_correct)?.value;
        }
        if let Some(is_correct) = is_correct {
            option.is_correct = is_correct;
        }
        self.store.update_answer_option(&option).await?;
        Ok(option)
    }

    pub async fn delete_answer_option(
        &self,
        principal: &Principal,
        course: CourseId,
        id: AnswerOptionId,
    ) -> ServiceResult<()> {
        self.owned_course(principal, course).await?;
        self.option_in(course, id).await?;
        Ok(self.store.delete_answer_option(id).await?)
    }

    // Roster

    /// Students of a course, visible to its teachers.
    pub async fn roster(
        &self,
        principal: &Principal,
        course: CourseId,
        page: &PageRequest,
        with_result: bool,
    ) -> ServiceResult<Page<StudentProgress>> {
        self.owned_course(principal, course).await?;
        let rows = self.store.roster(course, page).await?;
        Ok(rows.map(|(user, enrollment)| {
            StudentProgress::new(user.id, user.name, user.email, user.image, &enrollment, with_result)
        }))
    }
}
