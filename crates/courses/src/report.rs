//! Test scoring ("rapport").
//!
//! A question counts as correct iff the student's chosen option is one of that
//! question's options flagged correct. Unanswered questions are incorrect.
//! The test is passed only when every question is correct; there is no
//! percentage threshold.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use scholar_core::{AnswerOptionId, QuestionId};

use crate::catalog::{AnswerOption, Question, StudentAnswer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub question: String,
    pub answer_id: Option<AnswerOptionId>,
    /// Text of the chosen option; `None` when unanswered.
    pub answer: Option<String>,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<QuestionResult>,
}

impl Report {
    pub fn new(results: Vec<QuestionResult>) -> Self {
        Self { results }
    }

    /// Number of correctly answered questions.
    pub fn score(&self) -> u32 {
        self.results.iter().filter(|r| r.is_correct).count() as u32
    }

    /// All questions correct. A course without questions is trivially passed.
    pub fn is_passed(&self) -> bool {
        self.results.iter().all(|r| r.is_correct)
    }

    pub fn question_count(&self) -> usize {
        self.results.len()
    }
}

/// Join the course's questions with a student's answers.
///
/// `questions` defines the result order. Answers to questions outside the list
/// and options belonging to other questions are ignored.
pub fn compute_report(
    questions: &[Question],
    options: &[AnswerOption],
    answers: &[StudentAnswer],
) -> Report {
    let options_by_id: HashMap<AnswerOptionId, &AnswerOption> =
        options.iter().map(|o| (o.id, o)).collect();
    let answer_by_question: HashMap<QuestionId, &StudentAnswer> =
        answers.iter().map(|a| (a.question_id, a)).collect();

    let results = questions
        .iter()
        .map(|q| {
            let chosen = answer_by_question
                .get(&q.id)
                .and_then(|a| options_by_id.get(&a.answer_id))
                .filter(|o| o.question_id == q.id);

            QuestionResult {
                question_id: q.id,
                question: q.question.clone(),
                answer_id: answer_by_question.get(&q.id).map(|a| a.answer_id),
                answer: chosen.map(|o| o.value.clone()),
                is_correct: chosen.is_some_and(|o| o.is_correct),
            }
        })
        .collect();

    Report::new(results)
}
