//! In-memory store for tests and database-less local runs.
//!
//! All tables live behind one `RwLock`, so every method is a serializable
//! transaction: a transition reads and writes under the same write guard.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

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
    StudentAnswer, TeacherSummary, compute_report, require_joined,
};

use super::{CourseStore, DirectoryStore, EnrollmentStore, IdentityStore};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    sessions: HashMap<String, Session>,
    organizations: HashMap<OrganizationId, Organization>,
    members: HashSet<(UserId, OrganizationId)>,
    roles: HashMap<RoleId, RoleRecord>,
    permissions: HashMap<PermissionId, PermissionRecord>,
    grants: HashSet<(RoleId, PermissionId)>,
    assignments: HashSet<(UserId, RoleId, OrganizationId)>,
    categories: BTreeMap<CategoryId, Category>,
    courses: BTreeMap<CourseId, Course>,
    teachers: BTreeSet<(CourseId, UserId)>,
    questions: BTreeMap<QuestionId, Question>,
    options: BTreeMap<AnswerOptionId, AnswerOption>,
    enrollments: BTreeMap<(UserId, CourseId), Enrollment>,
    answers: BTreeMap<(UserId, QuestionId), StudentAnswer>,
}

impl Tables {
    fn details(&self, course: &Course) -> CourseDetails {
        let teachers = self
            .teachers
            .iter()
            .filter(|(c, _)| *c == course.id)
            .filter_map(|(_, u)| self.users.get(u))
            .map(|u| TeacherSummary {
                id: u.id,
                name: u.name.clone(),
                image: u.image.clone(),
            })
            .collect();
        let total_students = self
            .enrollments
            .keys()
            .filter(|(_, c)| *c == course.id)
            .count() as u64;
        CourseDetails {
            course: course.clone(),
            teachers,
            total_students,
        }
    }

    fn course_page<'a>(
        &self,
        courses: impl Iterator<Item = &'a Course>,
        page: &PageRequest,
    ) -> Page<CourseDetails> {
        let mut matching: Vec<&Course> = courses.filter(|c| page.matches(&c.name)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let all = matching.into_iter().map(|c| self.details(c)).collect();
        Page::from_vec(all, page)
    }

    fn questions_of(&self, course: CourseId) -> Vec<Question> {
        self.questions
            .values()
            .filter(|q| q.course_id == course)
            .cloned()
            .collect()
    }

    fn options_of(&self, course: CourseId) -> Vec<AnswerOption> {
        self.options
            .values()
            .filter(|o| {
                self.questions
                    .get(&o.question_id)
                    .is_some_and(|q| q.course_id == course)
            })
            .cloned()
            .collect()
    }

    fn answers_of(&self, student: UserId, course: CourseId) -> Vec<StudentAnswer> {
        self.answers
            .values()
            .filter(|a| a.student_id == student)
            .filter(|a| {
                self.questions
                    .get(&a.question_id)
                    .is_some_and(|q| q.course_id == course)
            })
            .cloned()
            .collect()
    }

    fn slug_taken<'a>(mut slugs: impl Iterator<Item = (&'a str, bool)>, slug: &str) -> bool {
        slugs.any(|(s, same)| s == slug && !same)
    }
}

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn register_user(
        &self,
        user: &User,
        organization: OrganizationId,
        roles: &[RoleId],
    ) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("email {} already registered", user.email)));
        }
        if !t.organizations.contains_key(&organization) {
            return Err(StoreError::NotFound(format!("organization {organization}")));
        }
        if let Some(role) = roles.iter().find(|r| !t.roles.contains_key(r)) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }
        t.users.insert(user.id, user.clone());
        t.members.insert((user.id, organization));
        for role in roles {
            t.assignments.insert((user.id, *role, organization));
        }
        Ok(())
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.users.contains_key(&session.user_id) {
            return Err(StoreError::NotFound(format!("user {}", session.user_id)));
        }
        if t.sessions.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("session token".into()));
        }
        t.sessions.insert(session.token_hash.clone(), session.clone());
        Ok(())
    }

    async fn session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        Ok(self.read()?.sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        self.write()?.sessions.remove(token_hash);
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn default_organization(&self) -> StoreResult<Option<Organization>> {
        Ok(self
            .read()?
            .organizations
            .values()
            .find(|o| o.is_default)
            .cloned())
    }

    async fn insert_organization(&self, organization: &Organization) -> StoreResult<()> {
        let mut t = self.write()?;
        if organization.is_default && t.organizations.values().any(|o| o.is_default) {
            return Err(StoreError::Conflict("a default organization already exists".into()));
        }
        t.organizations.insert(organization.id, organization.clone());
        Ok(())
    }

    async fn role_by_key(&self, key: &RoleKey) -> StoreResult<Option<RoleRecord>> {
        Ok(self.read()?.roles.values().find(|r| &r.key == key).cloned())
    }

    async fn insert_role(&self, role: &RoleRecord) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.roles.values().any(|r| r.key == role.key) {
            return Err(StoreError::Conflict(format!("role {}", role.key)));
        }
        t.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn sign_up_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        let t = self.read()?;
        let mut roles: Vec<RoleRecord> = t
            .roles
            .values()
            .filter(|r| r.assigned_on_sign_up)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(roles)
    }

    async fn permission_by_key(&self, key: &PermissionKey) -> StoreResult<Option<PermissionRecord>> {
        Ok(self
            .read()?
            .permissions
            .values()
            .find(|p| &p.key == key)
            .cloned())
    }

    async fn insert_permission(&self, permission: &PermissionRecord) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.permissions.values().any(|p| p.key == permission.key) {
            return Err(StoreError::Conflict(format!("permission {}", permission.key)));
        }
        t.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.roles.contains_key(&role) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }
        if !t.permissions.contains_key(&permission) {
            return Err(StoreError::NotFound(format!("permission {permission}")));
        }
        t.grants.insert((role, permission));
        Ok(())
    }

    async fn assign_role(
        &self,
        user: UserId,
        role: RoleId,
        organization: OrganizationId,
    ) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.users.contains_key(&user) {
            return Err(StoreError::NotFound(format!("user {user}")));
        }
        if !t.roles.contains_key(&role) {
            return Err(StoreError::NotFound(format!("role {role}")));
        }
        if !t.organizations.contains_key(&organization) {
            return Err(StoreError::NotFound(format!("organization {organization}")));
        }
        t.assignments.insert((user, role, organization));
        Ok(())
    }

    async fn permission_keys_for(
        &self,
        user: UserId,
        organization: OrganizationId,
    ) -> StoreResult<PermissionSet> {
        let t = self.read()?;
        let roles: HashSet<RoleId> = t
            .assignments
            .iter()
            .filter(|(u, _, o)| *u == user && *o == organization)
            .map(|(_, r, _)| *r)
            .collect();
        Ok(t
            .grants
            .iter()
            .filter(|(r, _)| roles.contains(r))
            .filter_map(|(_, p)| t.permissions.get(p))
            .map(|p| p.key.clone())
            .collect())
    }
}

#[async_trait]
impl CourseStore for InMemoryStore {
    async fn list_categories(&self, page: &PageRequest) -> StoreResult<Page<Category>> {
        let t = self.read()?;
        let mut all: Vec<Category> = t
            .categories
            .values()
            .filter(|c| page.matches(&c.name))
            .cloned()
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Page::from_vec(all, page))
    }

    async fn category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut t = self.write()?;
        let slugs = t.categories.values().map(|c| (c.slug.as_str(), false));
        if Tables::slug_taken(slugs, &category.slug) {
            return Err(StoreError::Conflict(format!("category slug {}", category.slug)));
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.categories.contains_key(&category.id) {
            return Err(StoreError::NotFound(format!("category {}", category.id)));
        }
        let slugs = t
            .categories
            .values()
            .map(|c| (c.slug.as_str(), c.id == category.id));
        if Tables::slug_taken(slugs, &category.slug) {
            return Err(StoreError::Conflict(format!("category slug {}", category.slug)));
        }
        t.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.categories.contains_key(&id) {
            return Err(StoreError::NotFound(format!("category {id}")));
        }
        if t.courses.values().any(|c| c.category_id == id) {
            return Err(StoreError::Conflict(format!("category {id} still has courses")));
        }
        t.categories.remove(&id);
        Ok(())
    }

    async fn insert_course(&self, course: &Course, teacher: UserId) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.categories.contains_key(&course.category_id) {
            return Err(StoreError::NotFound(format!("category {}", course.category_id)));
        }
        if !t.users.contains_key(&teacher) {
            return Err(StoreError::NotFound(format!("user {teacher}")));
        }
        let slugs = t.courses.values().map(|c| (c.slug.as_str(), false));
        if Tables::slug_taken(slugs, &course.slug) {
            return Err(StoreError::Conflict(format!("course slug {}", course.slug)));
        }
        t.courses.insert(course.id, course.clone());
        t.teachers.insert((course.id, teacher));
        Ok(())
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.courses.contains_key(&course.id) {
            return Err(StoreError::NotFound(format!("course {}", course.id)));
        }
        if !t.categories.contains_key(&course.category_id) {
            return Err(StoreError::NotFound(format!("category {}", course.category_id)));
        }
        let slugs = t
            .courses
            .values()
            .map(|c| (c.slug.as_str(), c.id == course.id));
        if Tables::slug_taken(slugs, &course.slug) {
            return Err(StoreError::Conflict(format!("course slug {}", course.slug)));
        }
        t.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn course(&self, id: CourseId) -> StoreResult<Option<CourseDetails>> {
        let t = self.read()?;
        Ok(t.courses.get(&id).map(|c| t.details(c)))
    }

    async fn list_courses(&self, page: &PageRequest) -> StoreResult<Page<CourseDetails>> {
        let t = self.read()?;
        Ok(t.course_page(t.courses.values(), page))
    }

    async fn courses_taught_by(
        &self,
        teacher: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseDetails>> {
        let t = self.read()?;
        let taught = t
            .teachers
            .iter()
            .filter(|(_, u)| *u == teacher)
            .filter_map(|(c, _)| t.courses.get(c));
        Ok(t.course_page(taught, page))
    }

    async fn questions(&self, course: CourseId) -> StoreResult<Vec<Question>> {
        Ok(self.read()?.questions_of(course))
    }

    async fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        Ok(self.read()?.questions.get(&id).cloned())
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.courses.contains_key(&question.course_id) {
            return Err(StoreError::NotFound(format!("course {}", question.course_id)));
        }
        t.questions.insert(question.id, question.clone());
        Ok(())
    }

    async fn update_question(&self, question: &Question) -> StoreResult<()> {
        let mut t = self.write()?;
        match t.questions.get_mut(&question.id) {
            Some(existing) => {
                existing.question = question.question.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("question {}", question.id))),
        }
    }

    async fn delete_question(&self, id: QuestionId) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.questions.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("question {id}")));
        }
        t.options.retain(|_, o| o.question_id != id);
        t.answers.retain(|(_, q), _| *q != id);
        Ok(())
    }

    async fn answer_options(&self, course: CourseId) -> StoreResult<Vec<AnswerOption>> {
        Ok(self.read()?.options_of(course))
    }

    async fn answer_option(&self, id: AnswerOptionId) -> StoreResult<Option<AnswerOption>> {
        Ok(self.read()?.options.get(&id).cloned())
    }

    async fn insert_answer_option(&self, option: &AnswerOption) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.questions.contains_key(&option.question_id) {
            return Err(StoreError::NotFound(format!("question {}", option.question_id)));
        }
        t.options.insert(option.id, option.clone());
        Ok(())
    }

    async fn update_answer_option(&self, option: &AnswerOption) -> StoreResult<()> {
        let mut t = self.write()?;
        match t.options.get_mut(&option.id) {
            Some(existing) => {
                existing.value = option.value.clone();
                existing.is_correct = option.is_correct;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("answer option {}", option.id))),
        }
    }

    async fn delete_answer_option(&self, id: AnswerOptionId) -> StoreResult<()> {
        let mut t = self.write()?;
        if t.options.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("answer option {id}")));
        }
        t.answers.retain(|_, a| a.answer_id != id);
        Ok(())
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryStore {
    async fn enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self.read()?.enrollments.get(&(student, course)).cloned())
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.courses.contains_key(&enrollment.course_id) {
            return Err(StoreError::NotFound(format!("course {}", enrollment.course_id)));
        }
        if !t.users.contains_key(&enrollment.student_id) {
            return Err(StoreError::NotFound(format!("user {}", enrollment.student_id)));
        }
        let key = (enrollment.student_id, enrollment.course_id);
        if t.enrollments.contains_key(&key) {
            return Err(StoreError::Conflict("already joined this course".into()));
        }
        t.enrollments.insert(key, enrollment.clone());
        Ok(())
    }

    async fn start_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut t = self.write()?;
        let mut enrollment = require_joined(t.enrollments.get(&(student, course)).cloned())?;
        enrollment.start(now)?;
        t.enrollments.insert((student, course), enrollment.clone());
        Ok(enrollment)
    }

    async fn record_answer(
        &self,
        course: CourseId,
        answer: &StudentAnswer,
    ) -> StoreResult<StudentAnswer> {
        let mut t = self.write()?;
        let enrollment = require_joined(t.enrollments.get(&(answer.student_id, course)).cloned())?;
        enrollment.ensure_answerable()?;

        let key = (answer.student_id, answer.question_id);
        let stored = match t.answers.get(&key) {
            Some(existing) => StudentAnswer {
                answer_id: answer.answer_id,
                updated_at: answer.updated_at,
                ..existing.clone()
            },
            None => answer.clone(),
        };
        t.answers.insert(key, stored.clone());
        Ok(stored)
    }

    async fn finish_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Enrollment, Report)> {
        let mut t = self.write()?;
        let mut enrollment = require_joined(t.enrollments.get(&(student, course)).cloned())?;
        let report = compute_report(
            &t.questions_of(course),
            &t.options_of(course),
            &t.answers_of(student, course),
        );
        enrollment.finish(now, &report)?;
        t.enrollments.insert((student, course), enrollment.clone());
        Ok((enrollment, report))
    }

    async fn answers_for(
        &self,
        student: UserId,
        course: CourseId,
    ) -> StoreResult<Vec<StudentAnswer>> {
        Ok(self.read()?.answers_of(student, course))
    }

    async fn roster(
        &self,
        course: CourseId,
        page: &PageRequest,
    ) -> StoreResult<Page<(User, Enrollment)>> {
        let t = self.read()?;
        let mut rows: Vec<(User, Enrollment)> = t
            .enrollments
            .values()
            .filter(|e| e.course_id == course)
            .filter_map(|e| t.users.get(&e.student_id).map(|u| (u.clone(), e.clone())))
            .filter(|(u, _)| page.matches(&u.name))
            .collect();
        rows.sort_by(|a, b| a.1.joined_at.cmp(&b.1.joined_at));
        Ok(Page::from_vec(rows, page))
    }

    async fn enrolled_courses(
        &self,
        student: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseProgress>> {
        let t = self.read()?;
        let mut rows: Vec<(&Enrollment, &Course)> = t
            .enrollments
            .values()
            .filter(|e| e.student_id == student)
            .filter_map(|e| t.courses.get(&e.course_id).map(|c| (e, c)))
            .filter(|(_, c)| page.matches(&c.name))
            .collect();
        rows.sort_by(|a, b| b.0.joined_at.cmp(&a.0.joined_at));
        let all = rows
            .into_iter()
            .map(|(e, c)| CourseProgress::new(t.details(c), e))
            .collect();
        Ok(Page::from_vec(all, page))
    }
}
