// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::exam::ExamPart;

/// Every MCQ carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

/// Where a delivered question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOrigin {
    Curated,
    Synthesized,
}

/// A multiple-choice question as delivered to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqQuestion {
    pub id: String,
    pub question: String,
    /// Always `OPTION_COUNT` entries.
    pub options: Vec<String>,
    pub correct_option: usize,
    pub explanation: Option<String>,
    pub part: ExamPart,
    pub section: String,
    pub origin: QuestionOrigin,
}

/// An essay scenario as delivered to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EssayQuestion {
    pub id: String,
    pub scenario: String,
    pub task: String,
    pub guidance: Option<String>,
    pub part: ExamPart,
    pub section: String,
    pub origin: QuestionOrigin,
}

/// DTO for sending an MCQ to the client (excludes the answer key and explanation).
#[derive(Debug, Clone, Serialize)]
pub struct PublicMcq {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub section: String,
}

impl From<&McqQuestion> for PublicMcq {
    fn from(q: &McqQuestion) -> Self {
        Self {
            id: q.id.clone(),
            question: q.question.clone(),
            options: q.options.clone(),
            section: q.section.clone(),
        }
    }
}

/// DTO for sending an essay prompt to the client (excludes grading guidance).
#[derive(Debug, Clone, Serialize)]
pub struct PublicEssay {
    pub id: String,
    pub scenario: String,
    pub task: String,
    pub section: String,
}

impl From<&EssayQuestion> for PublicEssay {
    fn from(q: &EssayQuestion) -> Self {
        Self {
            id: q.id.clone(),
            scenario: q.scenario.clone(),
            task: q.task.clone(),
            section: q.section.clone(),
        }
    }
}

/// Represents the 'mcq_questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct McqRow {
    pub id: i64,
    pub part: String,
    pub section: String,
    pub question: String,
    /// Stored as a JSON array in the database.
    pub options: Json<Vec<String>>,
    pub correct_option: i32,
    pub explanation: Option<String>,
}

impl McqRow {
    /// Converts a bank row into a deliverable question.
    /// Returns `None` for rows that do not carry exactly four options or a usable answer key.
    pub fn into_question(self) -> Option<McqQuestion> {
        let part = ExamPart::parse(&self.part)?;
        let correct_option = usize::try_from(self.correct_option).ok()?;
        if self.options.0.len() != OPTION_COUNT || correct_option >= OPTION_COUNT {
            return None;
        }
        Some(McqQuestion {
            id: format!("mcq-{}", self.id),
            question: self.question,
            options: self.options.0,
            correct_option,
            explanation: self.explanation,
            part,
            section: self.section,
            origin: QuestionOrigin::Curated,
        })
    }
}

/// Represents the 'essay_questions' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct EssayRow {
    pub id: i64,
    pub part: String,
    pub section: String,
    pub scenario: String,
    pub task: String,
    pub guidance: Option<String>,
}

impl EssayRow {
    pub fn into_question(self) -> Option<EssayQuestion> {
        Some(EssayQuestion {
            id: format!("essay-{}", self.id),
            part: ExamPart::parse(&self.part)?,
            section: self.section,
            scenario: self.scenario,
            task: self.task,
            guidance: self.guidance,
            origin: QuestionOrigin::Curated,
        })
    }
}

/// DTO for adding an MCQ to the curated bank.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateMcqRequest {
    pub part: ExamPart,
    #[validate(length(min = 1, max = 100))]
    pub section: String,
    #[validate(length(min = 1, max = 2000))]
    pub question: String,
    #[validate(custom(function = validate_options))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_option: u8,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

/// DTO for adding an essay scenario to the curated bank.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEssayRequest {
    pub part: ExamPart,
    #[validate(length(min = 1, max = 100))]
    pub section: String,
    #[validate(length(min = 1, max = 10000))]
    pub scenario: String,
    #[validate(length(min = 1, max = 2000))]
    pub task: String,
    #[validate(length(max = 4000))]
    pub guidance: Option<String>,
}

fn validate_options(options: &[String]) -> Result<(), validator::ValidationError> {
    if options.len() != OPTION_COUNT {
        return Err(validator::ValidationError::new("exactly_four_options"));
    }
    for opt in options {
        if opt.trim().is_empty() {
            return Err(validator::ValidationError::new("option_cannot_be_empty"));
        }
        if opt.len() > 500 {
            return Err(validator::ValidationError::new("option_too_long"));
        }
    }
    Ok(())
}
