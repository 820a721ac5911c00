// src/exam/catalog.rs

use serde::{Deserialize, Serialize};

use super::ExamError;

/// Exam variant family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestType {
    Standard,
    /// Essays unlock only when the MCQ score reaches the pass threshold.
    Challenge,
    Practice,
}

/// Which part of the CMA exam the questions are drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExamPart {
    #[default]
    Part1,
    Part2,
}

impl ExamPart {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamPart::Part1 => "part1",
            ExamPart::Part2 => "part2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "part1" => Some(ExamPart::Part1),
            "part2" => Some(ExamPart::Part2),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExamPart::Part1 => "Part 1: Financial Planning, Performance, and Analytics",
            ExamPart::Part2 => "Part 2: Strategic Financial Management",
        }
    }
}

/// The two timed sections of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Mcq,
    Essay,
}

/// Immutable description of one exam variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExamConfig {
    pub key: &'static str,
    pub title: &'static str,
    pub test_type: TestType,
    pub part: ExamPart,
    pub mcq_count: usize,
    pub essay_count: usize,
    pub mcq_duration_minutes: u32,
    pub essay_duration_minutes: u32,
    /// Fraction of MCQs drawn from the curated bank (0.0 ..= 1.0).
    pub hybrid_ratio: f64,
    /// Minimum MCQ percentage to unlock essays. Only set for `Challenge`.
    pub mcq_pass_threshold: Option<u32>,
}

impl ExamConfig {
    pub fn total_minutes(&self) -> u32 {
        let mcq = if self.mcq_count > 0 { self.mcq_duration_minutes } else { 0 };
        let essay = if self.essay_count > 0 { self.essay_duration_minutes } else { 0 };
        mcq + essay
    }

    pub fn has_gate(&self) -> bool {
        self.test_type == TestType::Challenge && self.mcq_pass_threshold.is_some()
    }

    pub fn phase_duration(&self, phase: Phase) -> chrono::Duration {
        let minutes = match phase {
            Phase::Mcq => self.mcq_duration_minutes,
            Phase::Essay => self.essay_duration_minutes,
        };
        chrono::Duration::minutes(i64::from(minutes))
    }
}

static CATALOG: [ExamConfig; 5] = [
    ExamConfig {
        key: "full-standard",
        title: "Standard Simulation",
        test_type: TestType::Standard,
        part: ExamPart::Part1,
        mcq_count: 100,
        essay_count: 2,
        mcq_duration_minutes: 180,
        essay_duration_minutes: 60,
        hybrid_ratio: 0.8,
        mcq_pass_threshold: None,
    },
    ExamConfig {
        key: "full-challenge",
        title: "Challenge Simulation",
        test_type: TestType::Challenge,
        part: ExamPart::Part1,
        mcq_count: 100,
        essay_count: 2,
        mcq_duration_minutes: 180,
        essay_duration_minutes: 60,
        hybrid_ratio: 0.8,
        mcq_pass_threshold: Some(50),
    },
    ExamConfig {
        key: "mcq-practice",
        title: "MCQ Practice",
        test_type: TestType::Practice,
        part: ExamPart::Part1,
        mcq_count: 50,
        essay_count: 0,
        mcq_duration_minutes: 90,
        essay_duration_minutes: 0,
        hybrid_ratio: 0.8,
        mcq_pass_threshold: None,
    },
    ExamConfig {
        key: "essay-practice",
        title: "Essay Practice",
        test_type: TestType::Practice,
        part: ExamPart::Part1,
        mcq_count: 0,
        essay_count: 2,
        mcq_duration_minutes: 0,
        essay_duration_minutes: 60,
        hybrid_ratio: 1.0,
        mcq_pass_threshold: None,
    },
    ExamConfig {
        key: "quick-10",
        title: "Quick Drill",
        test_type: TestType::Practice,
        part: ExamPart::Part1,
        mcq_count: 10,
        essay_count: 0,
        mcq_duration_minutes: 15,
        essay_duration_minutes: 0,
        hybrid_ratio: 1.0,
        mcq_pass_threshold: None,
    },
];

/// All catalog entries, in display order.
pub fn all() -> &'static [ExamConfig] {
    &CATALOG
}

/// Looks up an exam variant by key.
///
/// An unknown key is a configuration error; callers must not fall back to a default.
pub fn get_config(key: &str) -> Result<&'static ExamConfig, ExamError> {
    CATALOG
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| ExamError::UnknownExam(key.to_string()))
}
