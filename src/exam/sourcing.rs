// src/exam/sourcing.rs

//! Hybrid question sourcing.
//!
//! A configured share of MCQs comes from the curated bank and the rest is
//! synthesized, so a caller always receives exactly the number it asked for.
//! Essays are sampled from the bank and padded the same way.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use sqlx::PgPool;

use super::{ExamPart, store::StoreError};
use crate::models::question::{
    EssayQuestion, EssayRow, McqQuestion, McqRow, OPTION_COUNT, QuestionOrigin,
};

/// Source of curated questions.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Returns up to `limit` random MCQs for `part`.
    async fn sample_mcqs(&self, part: ExamPart, limit: usize)
    -> Result<Vec<McqQuestion>, StoreError>;

    /// Returns up to `limit` random essays for `part`, without replacement.
    async fn sample_essays(
        &self,
        part: ExamPart,
        limit: usize,
    ) -> Result<Vec<EssayQuestion>, StoreError>;
}

/// Curated bank backed by the `mcq_questions` / `essay_questions` tables.
#[derive(Clone)]
pub struct PgQuestionBank {
    pool: PgPool,
}

impl PgQuestionBank {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionBank for PgQuestionBank {
    async fn sample_mcqs(
        &self,
        part: ExamPart,
        limit: usize,
    ) -> Result<Vec<McqQuestion>, StoreError> {
        let rows = sqlx::query_as::<_, McqRow>(
            r#"
            SELECT id, part, section, question, options, correct_option, explanation
            FROM mcq_questions
            WHERE part = $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(part.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(McqRow::into_question).collect())
    }

    async fn sample_essays(
        &self,
        part: ExamPart,
        limit: usize,
    ) -> Result<Vec<EssayQuestion>, StoreError> {
        let rows = sqlx::query_as::<_, EssayRow>(
            r#"
            SELECT id, part, section, scenario, task, guidance
            FROM essay_questions
            WHERE part = $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(part.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(EssayRow::into_question).collect())
    }
}

/// In-process bank, used when running without a database and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuestionBank {
    mcqs: Vec<McqQuestion>,
    essays: Vec<EssayQuestion>,
    unavailable: bool,
}

impl MemoryQuestionBank {
    pub fn new(mcqs: Vec<McqQuestion>, essays: Vec<EssayQuestion>) -> Self {
        Self {
            mcqs,
            essays,
            unavailable: false,
        }
    }

    /// A bank whose every call fails, as if the database were unreachable.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl QuestionBank for MemoryQuestionBank {
    async fn sample_mcqs(
        &self,
        part: ExamPart,
        limit: usize,
    ) -> Result<Vec<McqQuestion>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("question bank offline".to_string()));
        }
        let pool: Vec<&McqQuestion> = self.mcqs.iter().filter(|q| q.part == part).collect();
        Ok(pool
            .choose_multiple(&mut rand::thread_rng(), limit)
            .map(|q| (*q).clone())
            .collect())
    }

    async fn sample_essays(
        &self,
        part: ExamPart,
        limit: usize,
    ) -> Result<Vec<EssayQuestion>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("question bank offline".to_string()));
        }
        let pool: Vec<&EssayQuestion> = self.essays.iter().filter(|q| q.part == part).collect();
        Ok(pool
            .choose_multiple(&mut rand::thread_rng(), limit)
            .map(|q| (*q).clone())
            .collect())
    }
}

/// Number of MCQs to request from the curated bank.
fn curated_share(count: usize, hybrid_ratio: f64) -> usize {
    let ratio = if hybrid_ratio.is_nan() {
        0.0
    } else {
        hybrid_ratio.clamp(0.0, 1.0)
    };
    ((count as f64 * ratio).round() as usize).min(count)
}

/// Produces exactly `count` MCQs, shuffled.
///
/// `round(count * hybrid_ratio)` items are requested from the bank; the remainder,
/// plus any shortfall when the bank runs dry or fails, is synthesized.
pub async fn fetch_mcqs(
    bank: &dyn QuestionBank,
    count: usize,
    hybrid_ratio: f64,
    part: ExamPart,
) -> Vec<McqQuestion> {
    if count == 0 {
        return Vec::new();
    }

    let target = curated_share(count, hybrid_ratio);
    let mut questions = if target > 0 {
        match bank.sample_mcqs(part, target).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, part = part.as_str(), "MCQ bank unavailable, synthesizing");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    questions.truncate(target);

    if questions.len() < target {
        tracing::info!(
            requested = target,
            found = questions.len(),
            part = part.as_str(),
            "curated MCQ pool short, padding with synthesized items"
        );
    }

    let missing = count - questions.len();
    questions.extend(synthesize_mcqs(part, missing));
    questions.shuffle(&mut rand::thread_rng());
    questions
}

/// Produces exactly `count` essays: a random sample from the bank, padded with
/// synthesized scenarios if the pool is smaller than requested.
pub async fn fetch_essays(
    bank: &dyn QuestionBank,
    count: usize,
    part: ExamPart,
) -> Vec<EssayQuestion> {
    if count == 0 {
        return Vec::new();
    }

    let mut essays = match bank.sample_essays(part, count).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, part = part.as_str(), "essay bank unavailable, synthesizing");
            Vec::new()
        }
    };
    essays.truncate(count);

    if essays.len() < count {
        tracing::info!(
            requested = count,
            found = essays.len(),
            part = part.as_str(),
            "curated essay pool short, padding with synthesized items"
        );
    }

    let missing = count - essays.len();
    essays.extend(synthesize_essays(part, missing));
    essays
}

fn topics(part: ExamPart) -> &'static [&'static str] {
    match part {
        ExamPart::Part1 => &[
            "External Financial Reporting Decisions",
            "Planning, Budgeting, and Forecasting",
            "Performance Management",
            "Cost Management",
            "Internal Controls",
            "Technology and Analytics",
        ],
        ExamPart::Part2 => &[
            "Financial Statement Analysis",
            "Corporate Finance",
            "Decision Analysis",
            "Risk Management",
            "Investment Decisions",
            "Professional Ethics",
        ],
    }
}

fn synthesize_mcqs(part: ExamPart, count: usize) -> Vec<McqQuestion> {
    let topics = topics(part);
    (0..count)
        .map(|n| {
            let topic = topics[n % topics.len()];
            let correct_option = n % OPTION_COUNT;
            let mut options = vec![
                format!("Evaluate the figures against the stated {} objective before acting", topic.to_lowercase()),
                "Rely on the prior period's conclusion without further review".to_string(),
                "Defer the decision until all uncertainty is eliminated".to_string(),
                "Select the alternative with the lowest reported cost regardless of context".to_string(),
            ];
            options.rotate_right(correct_option);
            McqQuestion {
                id: format!("gen-mcq-{}-{}", part.as_str(), n + 1),
                question: format!(
                    "A management accountant is reviewing a situation in {}. Which approach is most appropriate?",
                    topic
                ),
                options,
                correct_option,
                explanation: Some(format!(
                    "Decisions in {} should be grounded in the relevant objective and current evidence.",
                    topic
                )),
                part,
                section: topic.to_string(),
                origin: QuestionOrigin::Synthesized,
            }
        })
        .collect()
}

fn synthesize_essays(part: ExamPart, count: usize) -> Vec<EssayQuestion> {
    let topics = topics(part);
    (0..count)
        .map(|n| {
            let topic = topics[(n * 2 + 1) % topics.len()];
            EssayQuestion {
                id: format!("gen-essay-{}-{}", part.as_str(), n + 1),
                scenario: format!(
                    "Harbor Components Inc. is a mid-sized manufacturer preparing for its annual planning cycle. \
                     The CFO has asked the finance team to review recent results with a focus on {}.",
                    topic.to_lowercase()
                ),
                task: format!(
                    "Identify two key issues related to {} that the finance team should raise, \
                     and recommend an action for each with supporting reasoning.",
                    topic.to_lowercase()
                ),
                guidance: None,
                part,
                section: topic.to_string(),
                origin: QuestionOrigin::Synthesized,
            }
        })
        .collect()
}
