//! Per (student, course) test progress.
//!
//! ```text
//! NotJoined --join--> Joined --start--> Started --finish--> Finished
//!                                          ^  |
//!                                          answer (repeatable)
//! ```
//!
//! Timestamps only ever move forward and no transition is reversible.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use scholar_core::{CourseId, DomainError, UserId};

use crate::report::Report;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentState {
    NotJoined,
    Joined,
    Started,
    Finished,
}

impl core::fmt::Display for EnrollmentState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EnrollmentState::NotJoined => f.write_str("not joined"),
            EnrollmentState::Joined => f.write_str("joined"),
            EnrollmentState::Started => f.write_str("started"),
            EnrollmentState::Finished => f.write_str("finished"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("not joined to this course")]
    NotJoined,

    #[error("already joined this course")]
    AlreadyJoined,

    #[error("test already started")]
    AlreadyStarted,

    #[error("test not started")]
    NotStarted,

    #[error("test already finished")]
    AlreadyFinished,

    #[error("test not finished")]
    NotFinished,
}

impl From<TransitionError> for DomainError {
    fn from(value: TransitionError) -> Self {
        match value {
            // A second join collides with the composite key, not with the state machine.
            TransitionError::AlreadyJoined => DomainError::conflict(value.to_string()),
            other => DomainError::invalid_transition(other.to_string()),
        }
    }
}

/// The enrollment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: UserId,
    pub course_id: CourseId,
    pub joined_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub is_passed: Option<bool>,
    pub score: Option<u32>,
}

impl Enrollment {
    /// `NotJoined → Joined`.
    pub fn join(student_id: UserId, course_id: CourseId, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            course_id,
            joined_at: now,
            started_at: None,
            finished_at: None,
            is_passed: None,
            score: None,
        }
    }

    /// State of an optional row; `None` means the student never joined.
    pub fn state_of(enrollment: Option<&Enrollment>) -> EnrollmentState {
        enrollment.map_or(EnrollmentState::NotJoined, Enrollment::state)
    }

    pub fn state(&self) -> EnrollmentState {
        match (self.started_at, self.finished_at) {
            (_, Some(_)) => EnrollmentState::Finished,
            (Some(_), None) => EnrollmentState::Started,
            (None, None) => EnrollmentState::Joined,
        }
    }

    /// `Joined → Started`.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        match self.state() {
            EnrollmentState::Joined => {
                self.started_at = Some(now.max(self.joined_at));
                Ok(())
            }
            EnrollmentState::Started => Err(TransitionError::AlreadyStarted),
            EnrollmentState::Finished => Err(TransitionError::AlreadyFinished),
            EnrollmentState::NotJoined => Err(TransitionError::NotJoined),
        }
    }

    /// Answers may be recorded or changed only while the test is running.
    pub fn ensure_answerable(&self) -> Result<(), TransitionError> {
        match self.state() {
            EnrollmentState::Started => Ok(()),
            EnrollmentState::Finished => Err(TransitionError::AlreadyFinished),
            EnrollmentState::Joined | EnrollmentState::NotJoined => Err(TransitionError::NotStarted),
        }
    }

    /// `Started → Finished`, recording the score computed from `report`.
    pub fn finish(&mut self, now: DateTime<Utc>, report: &Report) -> Result<(), TransitionError> {
        match self.state() {
            EnrollmentState::Started => {
                let started_at = self.started_at.unwrap_or(self.joined_at);
                self.finished_at = Some(now.max(started_at));
                self.is_passed = Some(report.is_passed());
                self.score = Some(report.score());
                Ok(())
            }
            EnrollmentState::Joined | EnrollmentState::NotJoined => Err(TransitionError::NotStarted),
            EnrollmentState::Finished => Err(TransitionError::AlreadyFinished),
        }
    }

    /// Advisory end of the test window for timed courses.
    ///
    /// Only clients count down to this; nothing server-side cuts a test off.
    pub fn deadline(&self, test_duration_minutes: u32) -> Option<DateTime<Utc>> {
        if test_duration_minutes == 0 {
            return None;
        }
        self.started_at
            .map(|s| s + Duration::minutes(i64::from(test_duration_minutes)))
    }
}

/// Require an existing enrollment row.
pub fn require_joined(enrollment: Option<Enrollment>) -> Result<Enrollment, TransitionError> {
    enrollment.ok_or(TransitionError::NotJoined)
}

/// Require an enrollment whose test has been scored.
pub fn require_finished(enrollment: Option<Enrollment>) -> Result<Enrollment, TransitionError> {
    let enrollment = require_joined(enrollment)?;
    match enrollment.state() {
        EnrollmentState::Finished => Ok(enrollment),
        _ => Err(TransitionError::NotFinished),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::QuestionResult;
    use scholar_core::QuestionId;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn report(correct: &[bool]) -> Report {
        Report::new(
            correct
                .iter()
                .map(|&is_correct| QuestionResult {
                    question_id: QuestionId::new(),
                    question: "q".into(),
                    answer_id: None,
                    answer: None,
                    is_correct,
                })
                .collect(),
        )
    }

    #[test]
    fn join_creates_joined_row() {
        let e = Enrollment::join(UserId::new(), CourseId::new(), now());
        assert_eq!(e.state(), EnrollmentState::Joined);
        assert!(e.started_at.is_none());
        assert!(e.finished_at.is_none());
        assert_eq!(Enrollment::state_of(None), EnrollmentState::NotJoined);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), now());
        e.start(now()).unwrap();
        assert_eq!(e.state(), EnrollmentState::Started);
        assert_eq!(e.start(now()), Err(TransitionError::AlreadyStarted));
    }

    #[test]
    fn start_without_join_is_invalid() {
        let err = require_joined(None).unwrap_err();
        assert_eq!(err, TransitionError::NotJoined);
        assert!(matches!(
            DomainError::from(err),
            DomainError::InvalidStateTransition(_)
        ));
    }

    #[test]
    fn answers_only_while_started() {
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), now());
        assert_eq!(e.ensure_answerable(), Err(TransitionError::NotStarted));
        e.start(now()).unwrap();
        assert!(e.ensure_answerable().is_ok());
        e.finish(now(), &report(&[true])).unwrap();
        assert_eq!(e.ensure_answerable(), Err(TransitionError::AlreadyFinished));
    }

    #[test]
    fn finish_requires_start() {
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), now());
        assert_eq!(e.finish(now(), &report(&[])), Err(TransitionError::NotStarted));
        assert!(e.finished_at.is_none());
    }

    #[test]
    fn only_finished_enrollments_have_a_report() {
        assert_eq!(require_finished(None), Err(TransitionError::NotJoined));

        let mut e = Enrollment::join(UserId::new(), CourseId::new(), now());
        e.start(now()).unwrap();
        assert_eq!(
            require_finished(Some(e.clone())),
            Err(TransitionError::NotFinished)
        );

        e.finish(now(), &report(&[true])).unwrap();
        assert!(require_finished(Some(e)).is_ok());
    }

    #[test]
    fn finish_records_score_and_is_terminal() {
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), now());
        e.start(now()).unwrap();
        e.finish(now(), &report(&[true, true, false])).unwrap();
        assert_eq!(e.state(), EnrollmentState::Finished);
        assert_eq!(e.score, Some(2));
        assert_eq!(e.is_passed, Some(false));

        let before = e.clone();
        assert_eq!(e.finish(now(), &report(&[true])), Err(TransitionError::AlreadyFinished));
        assert_eq!(e, before);
        assert_eq!(e.start(now()), Err(TransitionError::AlreadyFinished));
    }

    #[test]
    fn timestamps_never_go_backwards() {
        let t0 = now();
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), t0);
        e.start(t0 - Duration::seconds(5)).unwrap();
        assert_eq!(e.started_at, Some(t0));
        e.finish(t0 - Duration::seconds(10), &report(&[])).unwrap();
        assert_eq!(e.finished_at, Some(t0));
    }

    #[test]
    fn deadline_only_for_timed_started_tests() {
        let t0 = now();
        let mut e = Enrollment::join(UserId::new(), CourseId::new(), t0);
        assert_eq!(e.deadline(30), None);
        e.start(t0).unwrap();
        assert_eq!(e.deadline(0), None);
        assert_eq!(e.deadline(30), Some(t0 + Duration::minutes(30)));
    }

    #[test]
    fn duplicate_join_maps_to_conflict() {
        assert!(matches!(
            DomainError::from(TransitionError::AlreadyJoined),
            DomainError::Conflict(_)
        ));
    }
}
