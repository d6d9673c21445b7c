//! Service-level scenarios against the in-memory store.
//!
//! Tests: token → principal → guard → service → store
//!
//! Verifies:
//! - Permissions resolve per organization and guards require all keys
//! - The enrollment lifecycle rejects out-of-order transitions
//! - Answers upsert in place and reports score them correctly
//! - Catalog writes need both the permission and course ownership

use std::sync::Arc;

use chrono::{Duration, Utc};

use scholar_auth::permissions::keys;
use scholar_auth::{Organization, PermissionRecord, Principal, RoleKey, RoleRecord, Session, SessionToken};
use scholar_core::{
    CategoryId, CourseId, DomainError, OrganizationId, PageRequest, PermissionId, RoleId,
};
use scholar_courses::{EnrollmentState, NewCourse};

use crate::bootstrap::{SeedOutcome, seed};
use crate::config::AdminSeed;
use crate::error::ServiceError;
use crate::services::{PermissionResolver, Services, StorePermissionResolver};
use crate::store::{DirectoryStore, IdentityStore, InMemoryStore};

const PASSWORD: &str = "correct horse battery";

struct World {
    store: Arc<InMemoryStore>,
    services: Services,
}

fn admin_seed() -> AdminSeed {
    AdminSeed {
        name: "Admin".into(),
        email: "admin@example.com".into(),
        password: "admin-password".into(),
    }
}

fn domain(err: ServiceError) -> DomainError {
    match err {
        ServiceError::Domain(e) => e,
        other => panic!("unexpected service error: {other}"),
    }
}

async fn world() -> World {
    let store = Arc::new(InMemoryStore::new());
    seed(&*store, &admin_seed()).await.unwrap();
    World {
        services: Services::new(store.clone(), Duration::hours(1)),
        store,
    }
}

impl World {
    async fn sign_up(&self, name: &str, email: &str) -> String {
        self.services
            .sessions
            .sign_up(name, email, PASSWORD)
            .await
            .unwrap();
        self.token(email, PASSWORD).await
    }

    async fn token(&self, email: &str, password: &str) -> String {
        let issued = self.services.sessions.sign_in(email, password).await.unwrap();
        issued.token.as_str().to_string()
    }

    async fn principal(&self, token: &str) -> Principal {
        self.services.access.authenticate(token).await.unwrap()
    }

    async fn admin(&self) -> Principal {
        let token = self.token("admin@example.com", "admin-password").await;
        self.principal(&token).await
    }

    /// Signed-up user additionally holding the teacher role.
    async fn teacher(&self, email: &str) -> Principal {
        let token = self.sign_up("Teacher", email).await;
        let principal = self.principal(&token).await;
        let role = self.store.role_by_key(&RoleKey::TEACHER).await.unwrap().unwrap();
        self.store
            .assign_role(principal.user_id(), role.id, principal.organization_id)
            .await
            .unwrap();
        self.principal(&token).await
    }

    async fn student(&self, email: &str) -> Principal {
        let token = self.sign_up("Student", email).await;
        self.principal(&token).await
    }

    async fn category(&self) -> CategoryId {
        let page = self
            .services
            .catalog
            .list_categories(&PageRequest::default())
            .await
            .unwrap();
        page.data[0].id
    }

    /// A course with `count` questions, each with a right and a wrong option.
    async fn course_with_questions(&self, teacher: &Principal, name: &str, count: usize) -> CourseId {
        let input = NewCourse {
            name: name.into(),
            image: None,
            category_id: self.category().await,
            test_duration: 15,
            published_at: None,
        };
        let course = self
            .services
            .catalog
            .create_course(teacher, input)
            .await
            .unwrap()
            .course
            .id;
        for i in 0..count {
            let q = self
                .services
                .catalog
                .create_question(teacher, course, &format!("Question {i}"))
                .await
                .unwrap();
            for (value, is_correct) in [("right", true), ("wrong", false)] {
                self.services
                    .catalog
                    .create_answer_option(teacher, course, q.id, value, is_correct)
                    .await
                    .unwrap();
            }
        }
        course
    }
}

#[tokio::test]
async fn seeding_twice_changes_nothing() {
    let w = world().await;
    let again = seed(&*w.store, &admin_seed()).await.unwrap();
    assert_eq!(again, SeedOutcome::AlreadySeeded);
}

#[tokio::test]
async fn seeded_admin_passes_write_courses() {
    let w = world().await;
    let token = w.token("admin@example.com", "admin-password").await;
    let principal = w
        .services
        .access
        .require_permission(&token, &[keys::WRITE_COURSES, keys::WRITE_CATEGORIES])
        .await
        .unwrap();
    assert_eq!(principal.permissions.len(), keys::ALL.len());
}

#[tokio::test]
async fn user_without_roles_is_forbidden() {
    let w = world().await;
    let token = w.sign_up("Nobody", "nobody@example.com").await;
    let principal = w.principal(&token).await;
    assert!(principal.permissions.is_empty());

    let err = w
        .services
        .access
        .require_permission(&token, &[keys::WRITE_COURSES])
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Forbidden(_)));
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthenticated() {
    let w = world().await;
    for token in ["", "   ", "not-a-real-token"] {
        let err = w.services.access.authenticate(token).await.unwrap_err();
        assert_eq!(domain(err), DomainError::Unauthenticated);
    }
}

#[tokio::test]
async fn expired_session_resolves_to_nothing() {
    let w = world().await;
    let admin = w.admin().await;
    let token = SessionToken::generate();
    let session = Session::new(
        &token,
        admin.user_id(),
        Utc::now() - Duration::hours(3),
        Duration::hours(1),
    );
    w.store.insert_session(&session).await.unwrap();

    let user = w.services.sessions.resolve_user(token.as_str()).await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn sign_out_invalidates_the_token() {
    let w = world().await;
    let token = w.token("admin@example.com", "admin-password").await;
    w.services.sessions.sign_out(&token).await.unwrap();
    w.services.sessions.sign_out(&token).await.unwrap();
    assert!(w.services.sessions.resolve_user(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let w = world().await;
    let a = w.services.sessions.sign_in("admin@example.com", "nope-nope").await.unwrap_err();
    let b = w.services.sessions.sign_in("ghost@example.com", "nope-nope").await.unwrap_err();
    assert_eq!(domain(a), DomainError::Unauthenticated);
    assert_eq!(domain(b), DomainError::Unauthenticated);
}

#[tokio::test]
async fn duplicate_sign_up_is_a_conflict() {
    let w = world().await;
    w.sign_up("Ada", "ada@example.com").await;
    let err = w
        .services
        .sessions
        .sign_up("Ada again", " ADA@example.com ", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));
}

#[tokio::test]
async fn sign_up_without_a_default_organization_leaves_no_user() {
    let store = Arc::new(InMemoryStore::new());
    let services = Services::new(store.clone(), Duration::hours(1));

    let err = services
        .sessions
        .sign_up("Ann", "ann@example.com", PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));
    assert!(store.user_by_email("ann@example.com").await.unwrap().is_none());

    // Once seeded, the same sign-up goes through with its default roles.
    seed(&*store, &admin_seed()).await.unwrap();
    let user = services
        .sessions
        .sign_up("Ann", "ann@example.com", PASSWORD)
        .await
        .unwrap();
    let token = services.sessions.sign_in("ann@example.com", PASSWORD).await.unwrap();
    let principal = services
        .access
        .authenticate(token.token.as_str())
        .await
        .unwrap();
    assert_eq!(principal.user_id(), user.id);
}

#[tokio::test]
async fn role_grants_are_scoped_to_their_organization() {
    let w = world().await;
    let student = w.student("scoped@example.com").await;
    let home = student.organization_id;

    let other = Organization {
        id: OrganizationId::new(),
        name: "Elsewhere".into(),
        is_default: false,
        created_at: Utc::now(),
    };
    w.store.insert_organization(&other).await.unwrap();

    let permission = PermissionRecord {
        id: PermissionId::new(),
        name: "Grade".into(),
        key: scholar_auth::PermissionKey::new("grade:tests"),
        description: None,
        created_at: Utc::now(),
    };
    w.store.insert_permission(&permission).await.unwrap();
    let role = RoleRecord {
        id: RoleId::new(),
        name: "Grader".into(),
        key: RoleKey::new("grader"),
        description: None,
        assigned_on_sign_up: false,
        created_at: Utc::now(),
    };
    w.store.insert_role(&role).await.unwrap();
    w.store.grant_permission(role.id, permission.id).await.unwrap();
    w.store
        .assign_role(student.user_id(), role.id, other.id)
        .await
        .unwrap();

    let resolver = StorePermissionResolver::new(w.store.clone());
    let in_other = resolver
        .resolve_permissions(student.user_id(), other.id)
        .await
        .unwrap();
    let at_home = resolver
        .resolve_permissions(student.user_id(), home)
        .await
        .unwrap();
    assert!(in_other.contains(&permission.key));
    assert!(!at_home.contains(&permission.key));
}

#[tokio::test]
async fn holding_one_of_two_keys_is_not_enough() {
    let w = world().await;
    let teacher = w.teacher("half@example.com").await;
    assert!(teacher.has(&keys::WRITE_COURSES));

    let token = w.token("half@example.com", PASSWORD).await;
    let err = w
        .services
        .access
        .require_permission(&token, &[keys::WRITE_COURSES, keys::WRITE_CATEGORIES])
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Forbidden(msg) if msg.contains("write:categories")));
}

#[tokio::test]
async fn out_of_order_transitions_are_rejected() {
    let w = world().await;
    let teacher = w.teacher("t1@example.com").await;
    let student = w.student("s1@example.com").await;
    let course = w.course_with_questions(&teacher, "Order Matters", 1).await;
    let progress = &w.services.progress;

    let err = progress.start(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    progress.join(&student, course).await.unwrap();
    let err = progress.join(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));

    let err = progress.finish(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    progress.start(&student, course).await.unwrap();
    let err = progress.start(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    progress.finish(&student, course).await.unwrap();
    let err = progress.finish(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn joining_an_unknown_course_is_not_found() {
    let w = world().await;
    let student = w.student("lost@example.com").await;
    let err = w
        .services
        .progress
        .join(&student, CourseId::new())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));
}

#[tokio::test]
async fn full_test_flow_scores_and_upserts_answers() {
    let w = world().await;
    let teacher = w.teacher("t2@example.com").await;
    let student = w.student("s2@example.com").await;
    let course = w.course_with_questions(&teacher, "Three Questions", 3).await;
    let catalog = &w.services.catalog;
    let progress = &w.services.progress;

    let questions = catalog.questions(&teacher, course).await.unwrap();
    let right = |i: usize| {
        questions[i]
            .answer_options
            .iter()
            .find(|o| o.is_correct == Some(true))
            .unwrap()
            .id
    };
    let wrong = |i: usize| {
        questions[i]
            .answer_options
            .iter()
            .find(|o| o.is_correct == Some(false))
            .unwrap()
            .id
    };

    progress.join(&student, course).await.unwrap();
    let err = progress
        .answer(&student, course, questions[0].question.id, right(0))
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    progress.start(&student, course).await.unwrap();
    progress
        .answer(&student, course, questions[0].question.id, wrong(0))
        .await
        .unwrap();
    // Second answer to the same question replaces the first.
    progress
        .answer(&student, course, questions[0].question.id, right(0))
        .await
        .unwrap();
    progress
        .answer(&student, course, questions[1].question.id, right(1))
        .await
        .unwrap();
    progress
        .answer(&student, course, questions[2].question.id, wrong(2))
        .await
        .unwrap();

    let answers = progress.answers(&student, course).await.unwrap();
    assert_eq!(answers.len(), 3);
    let first = answers
        .iter()
        .find(|a| a.question_id == questions[0].question.id)
        .unwrap();
    assert_eq!(first.answer_id, right(0));

    let (enrollment, report) = progress.finish(&student, course).await.unwrap();
    assert_eq!(report.score(), 2);
    assert!(!report.is_passed());
    let flags: Vec<bool> = report.results.iter().map(|r| r.is_correct).collect();
    assert_eq!(flags, vec![true, true, false]);
    assert_eq!(enrollment.state(), EnrollmentState::Finished);
    assert_eq!(enrollment.score, Some(2));
    assert_eq!(enrollment.is_passed, Some(false));

    let err = progress
        .answer(&student, course, questions[2].question.id, right(2))
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    let mine = progress
        .enrolled_courses(&student, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(mine.total_count, 1);
    assert_eq!(mine.data[0].status, EnrollmentState::Finished);

    let roster = catalog
        .roster(&teacher, course, &PageRequest::default(), true)
        .await
        .unwrap();
    assert_eq!(roster.data.len(), 1);
    assert_eq!(roster.data[0].score, Some(2));
    assert_eq!(roster.data[0].is_passed, Some(false));
}

#[tokio::test]
async fn answers_must_match_course_and_question() {
    let w = world().await;
    let teacher = w.teacher("t3@example.com").await;
    let student = w.student("s3@example.com").await;
    let course = w.course_with_questions(&teacher, "Integrity", 2).await;
    let other_course = w.course_with_questions(&teacher, "Other", 1).await;
    let catalog = &w.services.catalog;
    let progress = &w.services.progress;

    progress.join(&student, course).await.unwrap();
    progress.start(&student, course).await.unwrap();

    let questions = catalog.questions(&teacher, course).await.unwrap();
    let foreign = catalog.questions(&teacher, other_course).await.unwrap();

    let err = progress
        .answer(
            &student,
            course,
            foreign[0].question.id,
            foreign[0].answer_options[0].id,
        )
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::NotFound(_)));

    let err = progress
        .answer(
            &student,
            course,
            questions[0].question.id,
            questions[1].answer_options[0].id,
        )
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[tokio::test]
async fn question_writes_need_ownership_as_well_as_permission() {
    let w = world().await;
    let owner = w.teacher("owner@example.com").await;
    let stranger = w.teacher("stranger@example.com").await;
    let student = w.student("s4@example.com").await;
    let course = w.course_with_questions(&owner, "Owned", 1).await;
    let catalog = &w.services.catalog;

    let err = catalog
        .create_question(&stranger, course, "Sneaky?")
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Forbidden(_)));

    let err = catalog
        .create_question(&student, course, "Sneaky?")
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Forbidden(_)));

    assert_eq!(catalog.questions(&owner, course).await.unwrap().len(), 1);
}

#[tokio::test]
async fn students_never_see_correct_flags() {
    let w = world().await;
    let teacher = w.teacher("t5@example.com").await;
    let student = w.student("s5@example.com").await;
    let course = w.course_with_questions(&teacher, "Hidden Keys", 2).await;

    let as_student = w.services.catalog.questions(&student, course).await.unwrap();
    assert!(
        as_student
            .iter()
            .flat_map(|q| &q.answer_options)
            .all(|o| o.is_correct.is_none())
    );

    let as_teacher = w.services.catalog.questions(&teacher, course).await.unwrap();
    assert!(
        as_teacher
            .iter()
            .flat_map(|q| &q.answer_options)
            .all(|o| o.is_correct.is_some())
    );
}

#[tokio::test]
async fn deleting_a_question_drops_its_answers() {
    let w = world().await;
    let teacher = w.teacher("t6@example.com").await;
    let student = w.student("s6@example.com").await;
    let course = w.course_with_questions(&teacher, "Shrinking", 2).await;
    let catalog = &w.services.catalog;
    let progress = &w.services.progress;

    let questions = catalog.questions(&teacher, course).await.unwrap();
    progress.join(&student, course).await.unwrap();
    progress.start(&student, course).await.unwrap();
    for q in &questions {
        let right = q
            .answer_options
            .iter()
            .find(|o| o.is_correct == Some(true))
            .unwrap();
        progress
            .answer(&student, course, q.question.id, right.id)
            .await
            .unwrap();
    }

    catalog
        .delete_question(&teacher, course, questions[0].question.id)
        .await
        .unwrap();

    let answers = progress.answers(&student, course).await.unwrap();
    assert_eq!(answers.len(), 1);
    progress.finish(&student, course).await.unwrap();
    let report = progress.report(&student, course).await.unwrap();
    assert_eq!(report.question_count(), 1);
    assert!(report.is_passed());
}

#[tokio::test]
async fn report_is_refused_until_the_test_is_finished() {
    let w = world().await;
    let teacher = w.teacher("t8@example.com").await;
    let student = w.student("s8@example.com").await;
    let course = w.course_with_questions(&teacher, "No Peeking", 1).await;
    let progress = &w.services.progress;

    let err = progress.report(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(_)));

    let as_student = w.services.catalog.questions(&student, course).await.unwrap();
    let question = &as_student[0];
    progress.join(&student, course).await.unwrap();
    progress.start(&student, course).await.unwrap();
    progress
        .answer(&student, course, question.question.id, question.answer_options[0].id)
        .await
        .unwrap();

    let err = progress.report(&student, course).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidStateTransition(msg) if msg.contains("not finished")));

    let (_, finished) = progress.finish(&student, course).await.unwrap();
    let report = progress.report(&student, course).await.unwrap();
    assert_eq!(report, finished);
}

#[tokio::test]
async fn duplicate_course_slug_is_a_conflict() {
    let w = world().await;
    let teacher = w.teacher("t7@example.com").await;
    w.course_with_questions(&teacher, "Intro to Rust", 0).await;

    let input = NewCourse {
        name: "Intro  to RUST".into(),
        image: None,
        category_id: w.category().await,
        test_duration: 0,
        published_at: None,
    };
    let err = w
        .services
        .catalog
        .create_course(&teacher, input)
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));
}

#[tokio::test]
async fn category_in_use_cannot_be_deleted() {
    let w = world().await;
    let admin = w.admin().await;
    let category = w.category().await;
    w.course_with_questions(&admin, "Keeps Category", 0).await;

    let err = w
        .services
        .catalog
        .delete_category(&admin, category)
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Conflict(_)));
}
