//! `scholar-courses` — course catalog and test-progress domain.
//!
//! Pure rules only: the store decides *where* state lives, this crate decides
//! which transitions are legal and how a test is scored.

pub mod catalog;
pub mod enrollment;
pub mod report;
pub mod roster;

pub use catalog::{
    AnswerOption, Category, Course, CourseDetails, MAX_TEST_DURATION, NewCourse, OptionView,
    Question, QuestionView, StudentAnswer, TeacherSummary, slugify,
};
pub use enrollment::{
    Enrollment, EnrollmentState, TransitionError, require_finished, require_joined,
};
pub use report::{QuestionResult, Report, compute_report};
pub use roster::{CourseProgress, StudentProgress};
