//! Read models joining enrollments with users and courses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholar_core::UserId;

use crate::catalog::CourseDetails;
use crate::enrollment::{Enrollment, EnrollmentState};

/// One row of a course roster, as seen by its teachers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProgress {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub status: EnrollmentState,
    pub joined_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_passed: Option<bool>,
}

impl StudentProgress {
    /// `with_result` controls whether score and pass flag are exposed.
    pub fn new(
        id: UserId,
        name: String,
        email: String,
        image: Option<String>,
        enrollment: &Enrollment,
        with_result: bool,
    ) -> Self {
        Self {
            id,
            name,
            email,
            image,
            status: enrollment.state(),
            joined_at: enrollment.joined_at,
            started_at: enrollment.started_at,
            finished_at: enrollment.finished_at,
            score: enrollment.score.filter(|_| with_result),
            is_passed: enrollment.is_passed.filter(|_| with_result),
        }
    }
}

/// A course from the enrolled student's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    #[serde(flatten)]
    pub course: CourseDetails,
    pub status: EnrollmentState,
    pub joined_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Advisory end of a running timed test.
    pub deadline: Option<DateTime<Utc>>,
    pub score: Option<u32>,
    pub is_passed: Option<bool>,
}

impl CourseProgress {
    pub fn new(course: CourseDetails, enrollment: &Enrollment) -> Self {
        let deadline = match enrollment.state() {
            EnrollmentState::Started => enrollment.deadline(course.course.test_duration),
            _ => None,
        };
        Self {
            status: enrollment.state(),
            joined_at: enrollment.joined_at,
            started_at: enrollment.started_at,
            finished_at: enrollment.finished_at,
            deadline,
            score: enrollment.score,
            is_passed: enrollment.is_passed,
            course,
        }
    }
}
