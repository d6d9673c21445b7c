//! Teacher-authored course content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use scholar_core::{
    AnswerOptionId, CategoryId, CourseId, DomainError, QuestionId, UserId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
}

impl Category {
    pub fn new(name: &str) -> Result<Self, DomainError> {
        let name = required_text("category name", name)?;
        Ok(Self {
            id: CategoryId::new(),
            slug: slugify(&name)?,
            name,
        })
    }
}

/// Longest test a course may set, in minutes (one week).
pub const MAX_TEST_DURATION: u32 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub category_id: CategoryId,
    /// Test duration in minutes; 0 means untimed.
    pub test_duration: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub published_at: DateTime<Utc>,
}

/// Input for creating a course.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCourse {
    pub name: String,
    pub image: Option<String>,
    pub category_id: CategoryId,
    pub test_duration: u32,
    pub published_at: Option<DateTime<Utc>>,
}

impl Course {
    pub fn create(input: NewCourse, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let name = required_text("course name", &input.name)?;
        Ok(Self {
            id: CourseId::new(),
            slug: slugify(&name)?,
            name,
            image: input.image,
            category_id: input.category_id,
            test_duration: checked_test_duration(input.test_duration)?,
            created_at: now,
            updated_at: now,
            published_at: input.published_at.unwrap_or(now),
        })
    }

    /// Rename the course; the slug follows the name.
    pub fn rename(&mut self, name: &str, now: DateTime<Utc>) -> Result<(), DomainError> {
        let name = required_text("course name", name)?;
        self.slug = slugify(&name)?;
        self.name = name;
        self.updated_at = now;
        Ok(())
    }

    pub fn set_test_duration(&mut self, minutes: u32) -> Result<(), DomainError> {
        self.test_duration = checked_test_duration(minutes)?;
        Ok(())
    }

    pub fn is_timed(&self) -> bool {
        self.test_duration > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherSummary {
    pub id: UserId,
    pub name: String,
    pub image: Option<String>,
}

/// A course with its teachers and enrollment count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDetails {
    #[serde(flatten)]
    pub course: Course,
    pub teachers: Vec<TeacherSummary>,
    pub total_students: u64,
}

impl CourseDetails {
    pub fn teacher_ids(&self) -> Vec<UserId> {
        self.teachers.iter().map(|t| t.id).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub course_id: CourseId,
    pub question: String,
}

impl Question {
    pub fn new(course_id: CourseId, text: &str) -> Result<Self, DomainError> {
        Ok(Self {
            id: QuestionId::new(),
            course_id,
            question: required_text("question", text)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: AnswerOptionId,
    pub question_id: QuestionId,
    pub value: String,
    pub is_correct: bool,
}

impl AnswerOption {
    pub fn new(question_id: QuestionId, value: &str, is_correct: bool) -> Result<Self, DomainError> {
        Ok(Self {
            id: AnswerOptionId::new(),
            question_id,
            value: required_text("answer option", value)?,
            is_correct,
        })
    }
}

/// A question together with its options, as shown to a client.
///
/// `is_correct` is stripped for students so the key is never leaked before
/// the test is scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    pub answer_options: Vec<OptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionView {
    pub id: AnswerOptionId,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

impl QuestionView {
    pub fn new(question: Question, options: &[AnswerOption], include_correct: bool) -> Self {
        let answer_options = options
            .iter()
            .filter(|o| o.question_id == question.id)
            .map(|o| OptionView {
                id: o.id,
                value: o.value.clone(),
                is_correct: include_correct.then_some(o.is_correct),
            })
            .collect();
        Self {
            question,
            answer_options,
        }
    }
}

/// A student's recorded choice for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAnswer {
    pub student_id: UserId,
    pub question_id: QuestionId,
    pub answer_id: AnswerOptionId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn checked_test_duration(minutes: u32) -> Result<u32, DomainError> {
    if minutes > MAX_TEST_DURATION {
        return Err(DomainError::validation(format!(
            "test duration must be at most {MAX_TEST_DURATION} minutes"
        )));
    }
    Ok(minutes)
}

fn required_text(what: &str, value: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        Err(DomainError::validation(format!("{what} must not be empty")))
    } else {
        Ok(value.to_string())
    }
}

/// Derive a URL slug: lowercase ASCII alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> Result<String, DomainError> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        return Err(DomainError::validation(format!(
            "cannot derive a slug from '{name}'"
        )));
    }
    Ok(slug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Intro to   Rust!! (2024) ").unwrap(), "intro-to-rust-2024");
        assert_eq!(slugify("C++ & Go").unwrap(), "c-go");
    }

    #[test]
    fn slugify_rejects_symbol_only_names() {
        assert!(slugify("!!!").is_err());
    }

    #[test]
    fn renaming_updates_slug() {
        let now = Utc::now();
        let mut course = Course::create(
            NewCourse {
                name: "Algebra".into(),
                image: None,
                category_id: CategoryId::new(),
                test_duration: 30,
                published_at: None,
            },
            now,
        )
        .unwrap();
        assert_eq!(course.published_at, now);
        course.rename("Linear Algebra", now).unwrap();
        assert_eq!(course.slug, "linear-algebra");
    }

    #[test]
    fn test_duration_is_bounded() {
        let input = |minutes| NewCourse {
            name: "Timed".into(),
            image: None,
            category_id: CategoryId::new(),
            test_duration: minutes,
            published_at: None,
        };
        let now = Utc::now();
        assert!(matches!(
            Course::create(input(3_000_000_000), now),
            Err(DomainError::Validation(_))
        ));

        let mut course = Course::create(input(MAX_TEST_DURATION), now).unwrap();
        assert!(course.set_test_duration(MAX_TEST_DURATION + 1).is_err());
        assert_eq!(course.test_duration, MAX_TEST_DURATION);
        course.set_test_duration(0).unwrap();
        assert!(!course.is_timed());
    }

    #[test]
    fn student_view_hides_correct_flags() {
        let q = Question::new(CourseId::new(), "2 + 2?").unwrap();
        let options = vec![
            AnswerOption::new(q.id, "4", true).unwrap(),
            AnswerOption::new(q.id, "5", false).unwrap(),
            AnswerOption::new(QuestionId::new(), "unrelated", true).unwrap(),
        ];
        let view = QuestionView::new(q.clone(), &options, false);
        assert_eq!(view.answer_options.len(), 2);
        assert!(view.answer_options.iter().all(|o| o.is_correct.is_none()));

        let view = QuestionView::new(q, &options, true);
        assert_eq!(view.answer_options[0].is_correct, Some(true));
    }
}
