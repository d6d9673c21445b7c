//! Student progress through a course test.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use scholar_auth::Principal;
use scholar_core::{AnswerOptionId, CourseId, DomainError, Page, PageRequest, QuestionId};
use scholar_courses::{
    CourseProgress, Enrollment, Report, StudentAnswer, compute_report, require_finished,
    require_joined,
};

use crate::error::ServiceResult;
use crate::store::Store;

#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn Store>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn require_course_exists(&self, course: CourseId) -> ServiceResult<()> {
        match self.store.course(course).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::not_found(format!("course {course}")).into()),
        }
    }

    /// `NotJoined → Joined`. Joining twice is a conflict.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn join(&self, principal: &Principal, course: CourseId) -> ServiceResult<Enrollment> {
        self.require_course_exists(course).await?;
        let enrollment = Enrollment::join(principal.user_id(), course, Utc::now());
        self.store.insert_enrollment(&enrollment).await?;
        Ok(enrollment)
    }

    /// `Joined → Started`.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn start(&self, principal: &Principal, course: CourseId) -> ServiceResult<Enrollment> {
        Ok(self
            .store
            .start_enrollment(principal.user_id(), course, Utc::now())
            .await?)
    }

    /// Record or replace the answer to one question while the test runs.
    ///
    /// The question must belong to the course and the option to the question.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn answer(
        &self,
        principal: &Principal,
        course: CourseId,
        question: QuestionId,
        option: AnswerOptionId,
    ) -> ServiceResult<StudentAnswer> {
        match self.store.question(question).await? {
            Some(q) if q.course_id == course => {}
            _ => return Err(DomainError::not_found(format!("question {question}")).into()),
        }
        match self.store.answer_option(option).await? {
            Some(o) if o.question_id == question => {}
            Some(_) => {
                return Err(DomainError::validation(format!(
                    "answer option {option} does not belong to question {question}"
                ))
                .into());
            }
            None => return Err(DomainError::not_found(format!("answer option {option}")).into()),
        }

        let now = Utc::now();
        let answer = StudentAnswer {
            student_id: principal.user_id(),
            question_id: question,
            answer_id: option,
            created_at: now,
            updated_at: now,
        };
        Ok(self.store.record_answer(course, &answer).await?)
    }

    /// `Started → Finished`; scores the recorded answers.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id()))]
    pub async fn finish(
        &self,
        principal: &Principal,
        course: CourseId,
    ) -> ServiceResult<(Enrollment, Report)> {
        let (enrollment, report) = self
            .store
            .finish_enrollment(principal.user_id(), course, Utc::now())
            .await?;
        tracing::info!(
            course_id = %course,
            score = report.score(),
            is_passed = report.is_passed(),
            "test finished"
        );
        Ok((enrollment, report))
    }

    /// The principal's report. Only a finished test has one.
    pub async fn report(&self, principal: &Principal, course: CourseId) -> ServiceResult<Report> {
        let student = principal.user_id();
        require_finished(self.store.enrollment(student, course).await?)?;
        let questions = self.store.questions(course).await?;
        let options = self.store.answer_options(course).await?;
        let answers = self.store.answers_for(student, course).await?;
        Ok(compute_report(&questions, &options, &answers))
    }

    /// The principal's recorded answers for a course.
    pub async fn answers(
        &self,
        principal: &Principal,
        course: CourseId,
    ) -> ServiceResult<Vec<StudentAnswer>> {
        Ok(self.store.answers_for(principal.user_id(), course).await?)
    }

    /// Courses the principal joined.
    pub async fn enrolled_courses(
        &self,
        principal: &Principal,
        page: &PageRequest,
    ) -> ServiceResult<Page<CourseProgress>> {
        Ok(self
            .store
            .enrolled_courses(principal.user_id(), page)
            .await?)
    }

    /// One joined course with the principal's progress.
    pub async fn enrolled_course(
        &self,
        principal: &Principal,
        course: CourseId,
    ) -> ServiceResult<CourseProgress> {
        let details = self
            .store
            .course(course)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("course {course}")))?;
        let enrollment = require_joined(self.store.enrollment(principal.user_id(), course).await?)?;
        Ok(CourseProgress::new(details, &enrollment))
    }
}
