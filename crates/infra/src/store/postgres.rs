//! Postgres-backed store.
//!
//! Every lifecycle transition of an enrollment runs in one transaction that
//! first locks the `(student, course)` row with `SELECT … FOR UPDATE`, applies
//! the domain rule to the locked row and writes the result before committing.
//! Answers rely on the composite primary key for their upsert.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use scholar_auth::{
    Organization, PermissionKey, PermissionRecord, PermissionSet, RoleKey, RoleRecord, Session,
    User,
};
use scholar_core::{
    AnswerOptionId, CategoryId, CourseId, DomainError, OrganizationId, Page, PageRequest,
    PermissionId, QuestionId, RoleId, UserId,
};
use scholar_courses::{
    AnswerOption, Category, Course, CourseDetails, CourseProgress, Enrollment, Question, Report,
    StudentAnswer, TeacherSummary, compute_report, require_joined,
};

use super::{CourseStore, DirectoryStore, EnrollmentStore, IdentityStore};
use crate::error::{StoreError, StoreResult, map_sqlx_error};

const SCHEMA: &str = include_str!("../../migrations/0001_schema.sql");

const USER_COLUMNS: &str = "id, name, email, password_hash, image, is_email_verified, created_at";
const COURSE_COLUMNS: &str =
    "id, name, slug, image, category_id, test_duration, created_at, updated_at, published_at";
const ENROLLMENT_COLUMNS: &str =
    "student_id, course_id, joined_at, started_at, finished_at, is_passed, score";

/// Postgres implementation of every store trait.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a connection pool against `database_url`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the schema. Every statement is `IF NOT EXISTS`, so this is safe
    /// to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    /// Attach teachers and student counts to a batch of courses.
    async fn with_details(&self, courses: Vec<Course>) -> StoreResult<Vec<CourseDetails>> {
        if courses.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = courses.iter().map(|c| *c.id.as_uuid()).collect();

        let teacher_rows = sqlx::query(
            r#"
            SELECT tc.course_id, u.id, u.name, u.image
            FROM teachers_to_courses tc
            JOIN users u ON u.id = tc.teacher_id
            WHERE tc.course_id = ANY($1)
            ORDER BY u.name ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_teachers", e))?;

        let mut teachers: HashMap<Uuid, Vec<TeacherSummary>> = HashMap::new();
        for row in teacher_rows {
            let course_id: Uuid = row.try_get("course_id").map_err(decode_err)?;
            teachers.entry(course_id).or_default().push(TeacherSummary {
                id: UserId::from_uuid(row.try_get("id").map_err(decode_err)?),
                name: row.try_get("name").map_err(decode_err)?,
                image: row.try_get("image").map_err(decode_err)?,
            });
        }

        let count_rows = sqlx::query(
            r#"
            SELECT course_id, COUNT(*) AS total
            FROM students_to_courses
            WHERE course_id = ANY($1)
            GROUP BY course_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_students", e))?;

        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for row in count_rows {
            counts.insert(
                row.try_get("course_id").map_err(decode_err)?,
                row.try_get("total").map_err(decode_err)?,
            );
        }

        Ok(courses
            .into_iter()
            .map(|course| {
                let key = *course.id.as_uuid();
                CourseDetails {
                    teachers: teachers.remove(&key).unwrap_or_default(),
                    total_students: counts.get(&key).copied().unwrap_or(0) as u64,
                    course,
                }
            })
            .collect())
    }

    async fn course_page(
        &self,
        teacher: Option<UserId>,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseDetails>> {
        let teacher = teacher.map(|t| *t.as_uuid());
        let search = like_pattern(page.search_term());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM courses c
            WHERE ($1::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM teachers_to_courses tc
                    WHERE tc.course_id = c.id AND tc.teacher_id = $1))
              AND ($2::text IS NULL OR c.name ILIKE $2)
            "#,
        )
        .bind(teacher)
        .bind(search.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_courses", e))?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {COURSE_COLUMNS}
            FROM courses c
            WHERE ($1::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM teachers_to_courses tc
                    WHERE tc.course_id = c.id AND tc.teacher_id = $1))
              AND ($2::text IS NULL OR c.name ILIKE $2)
            ORDER BY c.created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(teacher)
        .bind(search.as_deref())
        .bind(i64::from(page.size()))
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_courses", e))?;

        let courses = rows
            .iter()
            .map(course_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(decode_err)?;
        let data = self.with_details(courses).await?;
        Ok(Page::new(data, total as u64, page))
    }
}

/// Substring pattern for `ILIKE`, with the search term's own wildcards taken
/// literally.
fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(|term| {
        let mut pattern = String::with_capacity(term.len() + 2);
        pattern.push('%');
        for c in term.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    })
}

fn test_duration_param(minutes: u32) -> StoreResult<i32> {
    i32::try_from(minutes)
        .map_err(|_| DomainError::validation(format!("test duration {minutes} is out of range")).into())
}

fn decode_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {e}"))
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        image: row.try_get("image")?,
        is_email_verified: row.try_get("is_email_verified")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleRecord, sqlx::Error> {
    Ok(RoleRecord {
        id: RoleId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        key: RoleKey::new(row.try_get::<String, _>("key")?),
        description: row.try_get("description")?,
        assigned_on_sign_up: row.try_get("assigned_on_sign_up")?,
        created_at: row.try_get("created_at")?,
    })
}

fn course_from_row(row: &PgRow) -> Result<Course, sqlx::Error> {
    Ok(Course {
        id: CourseId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        image: row.try_get("image")?,
        category_id: CategoryId::from_uuid(row.try_get("category_id")?),
        test_duration: row.try_get::<i32, _>("test_duration")?.max(0) as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        published_at: row.try_get("published_at")?,
    })
}

fn question_from_row(row: &PgRow) -> Result<Question, sqlx::Error> {
    Ok(Question {
        id: QuestionId::from_uuid(row.try_get("id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        question: row.try_get("question")?,
    })
}

fn option_from_row(row: &PgRow) -> Result<AnswerOption, sqlx::Error> {
    Ok(AnswerOption {
        id: AnswerOptionId::from_uuid(row.try_get("id")?),
        question_id: QuestionId::from_uuid(row.try_get("question_id")?),
        value: row.try_get("value")?,
        is_correct: row.try_get("is_correct")?,
    })
}

fn enrollment_from_row(row: &PgRow) -> Result<Enrollment, sqlx::Error> {
    Ok(Enrollment {
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        course_id: CourseId::from_uuid(row.try_get("course_id")?),
        joined_at: row.try_get("joined_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        is_passed: row.try_get("is_passed")?,
        score: row
            .try_get::<Option<i32>, _>("score")?
            .map(|s| s.max(0) as u32),
    })
}

fn answer_from_row(row: &PgRow) -> Result<StudentAnswer, sqlx::Error> {
    Ok(StudentAnswer {
        student_id: UserId::from_uuid(row.try_get("student_id")?),
        question_id: QuestionId::from_uuid(row.try_get("question_id")?),
        answer_id: AnswerOptionId::from_uuid(row.try_get("answer_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn collect_rows<T>(
    rows: &[PgRow],
    f: impl Fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    rows.iter().map(f).collect::<Result<Vec<_>, _>>().map_err(decode_err)
}

async fn lock_enrollment(
    tx: &mut Transaction<'static, Postgres>,
    student: UserId,
    course: CourseId,
) -> StoreResult<Option<Enrollment>> {
    let row = sqlx::query(&format!(
        "SELECT {ENROLLMENT_COLUMNS} FROM students_to_courses \
         WHERE student_id = $1 AND course_id = $2 FOR UPDATE"
    ))
    .bind(student.as_uuid())
    .bind(course.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_enrollment", e))?;

    row.as_ref()
        .map(enrollment_from_row)
        .transpose()
        .map_err(decode_err)
}

async fn save_enrollment(
    tx: &mut Transaction<'static, Postgres>,
    enrollment: &Enrollment,
) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE students_to_courses
        SET started_at = $3, finished_at = $4, is_passed = $5, score = $6
        WHERE student_id = $1 AND course_id = $2
        "#,
    )
    .bind(enrollment.student_id.as_uuid())
    .bind(enrollment.course_id.as_uuid())
    .bind(enrollment.started_at)
    .bind(enrollment.finished_at)
    .bind(enrollment.is_passed)
    .bind(enrollment.score.map(|s| s as i32))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("save_enrollment", e))?;
    Ok(())
}

fn require_affected(rows: u64, what: impl FnOnce() -> String) -> StoreResult<()> {
    if rows == 0 {
        Err(StoreError::NotFound(what()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PostgresStore {
    #[instrument(skip(self, user, roles), fields(user_id = %user.id, organization_id = %organization), err)]
    async fn register_user(
        &self,
        user: &User,
        organization: OrganizationId,
        roles: &[RoleId],
    ) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, image, is_email_verified, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.image)
        .bind(user.is_email_verified)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        sqlx::query("INSERT INTO users_to_organizations (user_id, organization_id) VALUES ($1, $2)")
            .bind(user.id.as_uuid())
            .bind(organization.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("add_member", e))?;

        let role_ids: Vec<Uuid> = roles.iter().map(|r| *r.as_uuid()).collect();
        sqlx::query(
            r#"
            INSERT INTO roles_to_users (user_id, role_id, organization_id)
            SELECT $1::uuid, role_id, $3::uuid FROM UNNEST($2::uuid[]) AS r(role_id)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&role_ids)
        .bind(organization.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("assign_sign_up_roles", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_id", e))?;
        row.as_ref().map(user_from_row).transpose().map_err(decode_err)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_email", e))?;
        row.as_ref().map(user_from_row).transpose().map_err(decode_err)
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id), err)]
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token_hash)
        .bind(session.user_id.as_uuid())
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_session", e))?;
        Ok(())
    }

    async fn session_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("session_by_token_hash", e))?;

        row.map(|r| -> Result<Session, sqlx::Error> {
            Ok(Session {
                token_hash: r.try_get("token_hash")?,
                user_id: UserId::from_uuid(r.try_get("user_id")?),
                created_at: r.try_get("created_at")?,
                expires_at: r.try_get("expires_at")?,
            })
        })
        .transpose()
        .map_err(decode_err)
    }

    async fn delete_session(&self, token_hash: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_session", e))?;
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for PostgresStore {
    async fn default_organization(&self) -> StoreResult<Option<Organization>> {
        let row = sqlx::query(
            "SELECT id, name, is_default, created_at FROM organizations WHERE is_default LIMIT 1",
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("default_organization", e))?;

        row.map(|r| -> Result<Organization, sqlx::Error> {
            Ok(Organization {
                id: OrganizationId::from_uuid(r.try_get("id")?),
                name: r.try_get("name")?,
                is_default: r.try_get("is_default")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
        .map_err(decode_err)
    }

    async fn insert_organization(&self, organization: &Organization) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO organizations (id, name, is_default, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(organization.id.as_uuid())
        .bind(&organization.name)
        .bind(organization.is_default)
        .bind(organization.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_organization", e))?;
        Ok(())
    }

    async fn role_by_key(&self, key: &RoleKey) -> StoreResult<Option<RoleRecord>> {
        let row = sqlx::query(
            "SELECT id, name, key, description, assigned_on_sign_up, created_at FROM roles WHERE key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_by_key", e))?;
        row.as_ref().map(role_from_row).transpose().map_err(decode_err)
    }

    async fn insert_role(&self, role: &RoleRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (id, name, key, description, assigned_on_sign_up, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(&role.name)
        .bind(role.key.as_str())
        .bind(&role.description)
        .bind(role.assigned_on_sign_up)
        .bind(role.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(())
    }

    async fn sign_up_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, key, description, assigned_on_sign_up, created_at
            FROM roles
            WHERE assigned_on_sign_up
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("sign_up_roles", e))?;
        collect_rows(&rows, role_from_row)
    }

    async fn permission_by_key(&self, key: &PermissionKey) -> StoreResult<Option<PermissionRecord>> {
        let row = sqlx::query(
            "SELECT id, name, key, description, created_at FROM permissions WHERE key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_by_key", e))?;

        row.map(|r| -> Result<PermissionRecord, sqlx::Error> {
            Ok(PermissionRecord {
                id: PermissionId::from_uuid(r.try_get("id")?),
                name: r.try_get("name")?,
                key: PermissionKey::new(r.try_get::<String, _>("key")?),
                description: r.try_get("description")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
        .map_err(decode_err)
    }

    async fn insert_permission(&self, permission: &PermissionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, key, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(permission.id.as_uuid())
        .bind(&permission.name)
        .bind(permission.key.as_str())
        .bind(&permission.description)
        .bind(permission.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(())
    }

    async fn grant_permission(&self, role: RoleId, permission: PermissionId) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO permissions_to_roles (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role.as_uuid())
        .bind(permission.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grant_permission", e))?;
        Ok(())
    }

    async fn assign_role(
        &self,
        user: UserId,
        role: RoleId,
        organization: OrganizationId,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO roles_to_users (user_id, role_id, organization_id)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.as_uuid())
        .bind(role.as_uuid())
        .bind(organization.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_role", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user, organization_id = %organization), err)]
    async fn permission_keys_for(
        &self,
        user: UserId,
        organization: OrganizationId,
    ) -> StoreResult<PermissionSet> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.key
            FROM roles_to_users ru
            JOIN permissions_to_roles pr ON pr.role_id = ru.role_id
            JOIN permissions p ON p.id = pr.permission_id
            WHERE ru.user_id = $1 AND ru.organization_id = $2
            "#,
        )
        .bind(user.as_uuid())
        .bind(organization.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permission_keys_for", e))?;

        Ok(keys.into_iter().map(PermissionKey::new).collect())
    }
}

#[async_trait]
impl CourseStore for PostgresStore {
    async fn list_categories(&self, page: &PageRequest) -> StoreResult<Page<Category>> {
        let search = like_pattern(page.search_term());
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM course_categories WHERE ($1::text IS NULL OR name ILIKE $1)",
        )
        .bind(search.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_categories", e))?;

        let rows = sqlx::query(
            r#"
            SELECT id, name, slug
            FROM course_categories
            WHERE ($1::text IS NULL OR name ILIKE $1)
            ORDER BY name ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(search.as_deref())
        .bind(i64::from(page.size()))
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_categories", e))?;

        let data = collect_rows(&rows, |r| {
            Ok(Category {
                id: CategoryId::from_uuid(r.try_get("id")?),
                name: r.try_get("name")?,
                slug: r.try_get("slug")?,
            })
        })?;
        Ok(Page::new(data, total as u64, page))
    }

    async fn category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name, slug FROM course_categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("category", e))?;
        row.map(|r| -> Result<Category, sqlx::Error> {
            Ok(Category {
                id: CategoryId::from_uuid(r.try_get("id")?),
                name: r.try_get("name")?,
                slug: r.try_get("slug")?,
            })
        })
        .transpose()
        .map_err(decode_err)
    }

    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO course_categories (id, name, slug) VALUES ($1, $2, $3)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.slug)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let result = sqlx::query("UPDATE course_categories SET name = $2, slug = $3 WHERE id = $1")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(&category.slug)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_category", e))?;
        require_affected(result.rows_affected(), || format!("category {}", category.id))
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM course_categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| match map_sqlx_error("delete_category", e) {
                // On delete the violated key points the other way: courses still reference it.
                StoreError::NotFound(_) => {
                    StoreError::Conflict(format!("category {id} still has courses"))
                }
                other => other,
            })?;
        require_affected(result.rows_affected(), || format!("category {id}"))
    }

    #[instrument(skip(self, course), fields(course_id = %course.id, teacher_id = %teacher), err)]
    async fn insert_course(&self, course: &Course, teacher: UserId) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO courses (
                id, name, slug, image, category_id, test_duration,
                created_at, updated_at, published_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.name)
        .bind(&course.slug)
        .bind(&course.image)
        .bind(course.category_id.as_uuid())
        .bind(test_duration_param(course.test_duration)?)
        .bind(course.created_at)
        .bind(course.updated_at)
        .bind(course.published_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_course", e))?;

        sqlx::query("INSERT INTO teachers_to_courses (course_id, teacher_id) VALUES ($1, $2)")
            .bind(course.id.as_uuid())
            .bind(teacher.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_course_teacher", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn update_course(&self, course: &Course) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE courses
            SET name = $2, slug = $3, image = $4, category_id = $5,
                test_duration = $6, updated_at = $7, published_at = $8
            WHERE id = $1
            "#,
        )
        .bind(course.id.as_uuid())
        .bind(&course.name)
        .bind(&course.slug)
        .bind(&course.image)
        .bind(course.category_id.as_uuid())
        .bind(test_duration_param(course.test_duration)?)
        .bind(course.updated_at)
        .bind(course.published_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_course", e))?;
        require_affected(result.rows_affected(), || format!("course {}", course.id))
    }

    async fn course(&self, id: CourseId) -> StoreResult<Option<CourseDetails>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("course", e))?;
        let Some(course) = row.as_ref().map(course_from_row).transpose().map_err(decode_err)? else {
            return Ok(None);
        };
        Ok(self.with_details(vec![course]).await?.pop())
    }

    async fn list_courses(&self, page: &PageRequest) -> StoreResult<Page<CourseDetails>> {
        self.course_page(None, page).await
    }

    async fn courses_taught_by(
        &self,
        teacher: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseDetails>> {
        self.course_page(Some(teacher), page).await
    }

    async fn questions(&self, course: CourseId) -> StoreResult<Vec<Question>> {
        let rows = sqlx::query(
            "SELECT id, course_id, question FROM course_questions WHERE course_id = $1 ORDER BY id ASC",
        )
        .bind(course.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("questions", e))?;
        collect_rows(&rows, question_from_row)
    }

    async fn question(&self, id: QuestionId) -> StoreResult<Option<Question>> {
        let row = sqlx::query("SELECT id, course_id, question FROM course_questions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("question", e))?;
        row.as_ref().map(question_from_row).transpose().map_err(decode_err)
    }

    async fn insert_question(&self, question: &Question) -> StoreResult<()> {
        sqlx::query("INSERT INTO course_questions (id, course_id, question) VALUES ($1, $2, $3)")
            .bind(question.id.as_uuid())
            .bind(question.course_id.as_uuid())
            .bind(&question.question)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_question", e))?;
        Ok(())
    }

    async fn update_question(&self, question: &Question) -> StoreResult<()> {
        let result = sqlx::query("UPDATE course_questions SET question = $2 WHERE id = $1")
            .bind(question.id.as_uuid())
            .bind(&question.question)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_question", e))?;
        require_affected(result.rows_affected(), || format!("question {}", question.id))
    }

    async fn delete_question(&self, id: QuestionId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM course_questions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_question", e))?;
        require_affected(result.rows_affected(), || format!("question {id}"))
    }

    async fn answer_options(&self, course: CourseId) -> StoreResult<Vec<AnswerOption>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.question_id, o.value, o.is_correct
            FROM course_answer_options o
            JOIN course_questions q ON q.id = o.question_id
            WHERE q.course_id = $1
            ORDER BY o.id ASC
            "#,
        )
        .bind(course.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("answer_options", e))?;
        collect_rows(&rows, option_from_row)
    }

    async fn answer_option(&self, id: AnswerOptionId) -> StoreResult<Option<AnswerOption>> {
        let row = sqlx::query(
            "SELECT id, question_id, value, is_correct FROM course_answer_options WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("answer_option", e))?;
        row.as_ref().map(option_from_row).transpose().map_err(decode_err)
    }

    async fn insert_answer_option(&self, option: &AnswerOption) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO course_answer_options (id, question_id, value, is_correct) VALUES ($1, $2, $3, $4)",
        )
        .bind(option.id.as_uuid())
        .bind(option.question_id.as_uuid())
        .bind(&option.value)
        .bind(option.is_correct)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_answer_option", e))?;
        Ok(())
    }

    async fn update_answer_option(&self, option: &AnswerOption) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE course_answer_options SET value = $2, is_correct = $3 WHERE id = $1",
        )
        .bind(option.id.as_uuid())
        .bind(&option.value)
        .bind(option.is_correct)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_answer_option", e))?;
        require_affected(result.rows_affected(), || format!("answer option {}", option.id))
    }

    async fn delete_answer_option(&self, id: AnswerOptionId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM course_answer_options WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_answer_option", e))?;
        require_affected(result.rows_affected(), || format!("answer option {id}"))
    }
}

#[async_trait]
impl EnrollmentStore for PostgresStore {
    async fn enrollment(
        &self,
        student: UserId,
        course: CourseId,
    ) -> StoreResult<Option<Enrollment>> {
        let row = sqlx::query(&format!(
            "SELECT {ENROLLMENT_COLUMNS} FROM students_to_courses WHERE student_id = $1 AND course_id = $2"
        ))
        .bind(student.as_uuid())
        .bind(course.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("enrollment", e))?;
        row.as_ref().map(enrollment_from_row).transpose().map_err(decode_err)
    }

    #[instrument(
        skip(self, enrollment),
        fields(student_id = %enrollment.student_id, course_id = %enrollment.course_id),
        err
    )]
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO students_to_courses (student_id, course_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(enrollment.student_id.as_uuid())
        .bind(enrollment.course_id.as_uuid())
        .bind(enrollment.joined_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| match map_sqlx_error("insert_enrollment", e) {
            StoreError::Conflict(_) => StoreError::Conflict("already joined this course".into()),
            other => other,
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(student_id = %student, course_id = %course), err)]
    async fn start_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<Enrollment> {
        let mut tx = self.begin().await?;
        let mut enrollment = require_joined(lock_enrollment(&mut tx, student, course).await?)?;
        enrollment.start(now)?;
        save_enrollment(&mut tx, &enrollment).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(enrollment)
    }

    #[instrument(
        skip(self, answer),
        fields(student_id = %answer.student_id, question_id = %answer.question_id),
        err
    )]
    async fn record_answer(
        &self,
        course: CourseId,
        answer: &StudentAnswer,
    ) -> StoreResult<StudentAnswer> {
        let mut tx = self.begin().await?;
        let enrollment =
            require_joined(lock_enrollment(&mut tx, answer.student_id, course).await?)?;
        enrollment.ensure_answerable()?;

        let row = sqlx::query(
            r#"
            INSERT INTO students_to_answers (student_id, question_id, answer_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, question_id)
            DO UPDATE SET answer_id = EXCLUDED.answer_id, updated_at = EXCLUDED.updated_at
            RETURNING student_id, question_id, answer_id, created_at, updated_at
            "#,
        )
        .bind(answer.student_id.as_uuid())
        .bind(answer.question_id.as_uuid())
        .bind(answer.answer_id.as_uuid())
        .bind(answer.created_at)
        .bind(answer.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("record_answer", e))?;
        let stored = answer_from_row(&row).map_err(decode_err)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(student_id = %student, course_id = %course), err)]
    async fn finish_enrollment(
        &self,
        student: UserId,
        course: CourseId,
        now: DateTime<Utc>,
    ) -> StoreResult<(Enrollment, Report)> {
        let mut tx = self.begin().await?;
        let mut enrollment = require_joined(lock_enrollment(&mut tx, student, course).await?)?;

        let question_rows = sqlx::query(
            "SELECT id, course_id, question FROM course_questions WHERE course_id = $1 ORDER BY id ASC",
        )
        .bind(course.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finish_load_questions", e))?;

        let option_rows = sqlx::query(
            r#"
            SELECT o.id, o.question_id, o.value, o.is_correct
            FROM course_answer_options o
            JOIN course_questions q ON q.id = o.question_id
            WHERE q.course_id = $1
            "#,
        )
        .bind(course.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finish_load_options", e))?;

        let answer_rows = sqlx::query(
            r#"
            SELECT a.student_id, a.question_id, a.answer_id, a.created_at, a.updated_at
            FROM students_to_answers a
            JOIN course_questions q ON q.id = a.question_id
            WHERE a.student_id = $1 AND q.course_id = $2
            "#,
        )
        .bind(student.as_uuid())
        .bind(course.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finish_load_answers", e))?;

        let report = compute_report(
            &collect_rows(&question_rows, question_from_row)?,
            &collect_rows(&option_rows, option_from_row)?,
            &collect_rows(&answer_rows, answer_from_row)?,
        );
        enrollment.finish(now, &report)?;
        save_enrollment(&mut tx, &enrollment).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok((enrollment, report))
    }

    async fn answers_for(
        &self,
        student: UserId,
        course: CourseId,
    ) -> StoreResult<Vec<StudentAnswer>> {
        let rows = sqlx::query(
            r#"
            SELECT a.student_id, a.question_id, a.answer_id, a.created_at, a.updated_at
            FROM students_to_answers a
            JOIN course_questions q ON q.id = a.question_id
            WHERE a.student_id = $1 AND q.course_id = $2
            ORDER BY a.question_id ASC
            "#,
        )
        .bind(student.as_uuid())
        .bind(course.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("answers_for", e))?;
        collect_rows(&rows, answer_from_row)
    }

    async fn roster(
        &self,
        course: CourseId,
        page: &PageRequest,
    ) -> StoreResult<Page<(User, Enrollment)>> {
        let search = like_pattern(page.search_term());
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM students_to_courses sc
            JOIN users u ON u.id = sc.student_id
            WHERE sc.course_id = $1 AND ($2::text IS NULL OR u.name ILIKE $2)
            "#,
        )
        .bind(course.as_uuid())
        .bind(search.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_roster", e))?;

        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.password_hash, u.image, u.is_email_verified, u.created_at,
                   sc.student_id, sc.course_id, sc.joined_at, sc.started_at, sc.finished_at,
                   sc.is_passed, sc.score
            FROM students_to_courses sc
            JOIN users u ON u.id = sc.student_id
            WHERE sc.course_id = $1 AND ($2::text IS NULL OR u.name ILIKE $2)
            ORDER BY sc.joined_at ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(course.as_uuid())
        .bind(search.as_deref())
        .bind(i64::from(page.size()))
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("roster", e))?;

        let data = collect_rows(&rows, |r| Ok((user_from_row(r)?, enrollment_from_row(r)?)))?;
        Ok(Page::new(data, total as u64, page))
    }

    async fn enrolled_courses(
        &self,
        student: UserId,
        page: &PageRequest,
    ) -> StoreResult<Page<CourseProgress>> {
        let search = like_pattern(page.search_term());
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM students_to_courses sc
            JOIN courses c ON c.id = sc.course_id
            WHERE sc.student_id = $1 AND ($2::text IS NULL OR c.name ILIKE $2)
            "#,
        )
        .bind(student.as_uuid())
        .bind(search.as_deref())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_enrolled_courses", e))?;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.name, c.slug, c.image, c.category_id, c.test_duration,
                   c.created_at, c.updated_at, c.published_at,
                   sc.student_id, sc.course_id, sc.joined_at, sc.started_at, sc.finished_at,
                   sc.is_passed, sc.score
            FROM students_to_courses sc
            JOIN courses c ON c.id = sc.course_id
            WHERE sc.student_id = $1 AND ($2::text IS NULL OR c.name ILIKE $2)
            ORDER BY sc.joined_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(student.as_uuid())
        .bind(search.as_deref())
        .bind(i64::from(page.size()))
        .bind(page.offset() as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("enrolled_courses", e))?;

        let pairs = collect_rows(&rows, |r| Ok((course_from_row(r)?, enrollment_from_row(r)?)))?;
        let (courses, enrollments): (Vec<Course>, Vec<Enrollment>) = pairs.into_iter().unzip();
        let data = self
            .with_details(courses)
            .await?
            .into_iter()
            .zip(enrollments.iter())
            .map(|(details, enrollment)| CourseProgress::new(details, enrollment))
            .collect();
        Ok(Page::new(data, total as u64, page))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use scholar_courses::NewCourse;

    use super::*;
    use crate::bootstrap::seed;
    use crate::config::AdminSeed;
    use crate::services::Services;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some("rust")).as_deref(), Some("%rust%"));
        assert_eq!(
            like_pattern(Some(r"100%_\ok")).as_deref(),
            Some(r"%100\%\_\\ok%")
        );
    }

    #[test]
    fn oversized_test_duration_is_a_validation_error() {
        assert_eq!(test_duration_param(90).unwrap(), 90);
        assert!(matches!(
            test_duration_param(3_000_000_000),
            Err(StoreError::Rejected(DomainError::Validation(_)))
        ));
    }

    /// Runs the locked transitions and the answer upsert against a real
    /// database: `DATABASE_URL=... cargo test -p scholar-infra -- --ignored`.
    #[tokio::test]
    #[ignore = "needs DATABASE_URL pointing at a scratch Postgres database"]
    async fn enrollment_lifecycle_against_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = Arc::new(PostgresStore::connect(&url).await.unwrap());
        store.migrate().await.unwrap();
        let admin_seed = AdminSeed {
            name: "Admin".into(),
            email: "admin@example.com".into(),
            password: "admin-password".into(),
        };
        seed(&*store, &admin_seed).await.unwrap();
        let services = Services::new(store.clone(), Duration::hours(1));
        let run = Uuid::now_v7().simple().to_string();

        let issued = services
            .sessions
            .sign_in(&admin_seed.email, &admin_seed.password)
            .await
            .unwrap();
        let admin = services
            .access
            .authenticate(issued.token.as_str())
            .await
            .unwrap();

        let category = services
            .catalog
            .list_categories(&PageRequest::default())
            .await
            .unwrap()
            .data[0]
            .id;
        let course = services
            .catalog
            .create_course(
                &admin,
                NewCourse {
                    name: format!("Postgres {run}"),
                    image: None,
                    category_id: category,
                    test_duration: 20,
                    published_at: None,
                },
            )
            .await
            .unwrap()
            .course
            .id;
        let mut options = Vec::new();
        for i in 0..2 {
            let q = services
                .catalog
                .create_question(&admin, course, &format!("Question {i}"))
                .await
                .unwrap();
            let right = services
                .catalog
                .create_answer_option(&admin, course, q.id, "right", true)
                .await
                .unwrap();
            let wrong = services
                .catalog
                .create_answer_option(&admin, course, q.id, "wrong", false)
                .await
                .unwrap();
            options.push((q.id, right.id, wrong.id));
        }

        let email = format!("pg-{run}@example.com");
        services
            .sessions
            .sign_up("Pg Student", &email, "student-password")
            .await
            .unwrap();
        let issued = services
            .sessions
            .sign_in(&email, "student-password")
            .await
            .unwrap();
        let student = services
            .access
            .authenticate(issued.token.as_str())
            .await
            .unwrap();
        let progress = &services.progress;

        let err = progress.start(&student, course).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidStateTransition(_))));

        progress.join(&student, course).await.unwrap();
        let err = progress.join(&student, course).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
        progress.start(&student, course).await.unwrap();

        let (q0, right0, wrong0) = options[0];
        let (q1, right1, _) = options[1];
        progress.answer(&student, course, q0, wrong0).await.unwrap();
        progress.answer(&student, course, q0, right0).await.unwrap();
        progress.answer(&student, course, q1, right1).await.unwrap();

        let answers = progress.answers(&student, course).await.unwrap();
        assert_eq!(answers.len(), 2);
        assert!(answers.iter().any(|a| a.question_id == q0 && a.answer_id == right0));

        let (enrollment, report) = progress.finish(&student, course).await.unwrap();
        assert_eq!(report.score(), 2);
        assert!(report.is_passed());
        assert_eq!(enrollment.score, Some(2));

        let err = progress.finish(&student, course).await.unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::InvalidStateTransition(_))));
        assert_eq!(progress.report(&student, course).await.unwrap(), report);
    }
}
