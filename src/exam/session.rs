// src/exam/session.rs

//! State machine for a single exam attempt.
//!
//! ```text
//! NOT_STARTED -> MCQ_IN_PROGRESS -> ESSAY_LOCKED      (challenge, score below gate)
//!                                -> ESSAY_IN_PROGRESS -> COMPLETED
//!                                -> COMPLETED         (no essays)
//! ```
//!
//! Every phase-ending transition goes through one guarded method per phase,
//! whether it was triggered by the user or by the countdown, so a second
//! trigger after the phase has moved on is a no-op.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    ExamConfig, ExamError, ExamPart, Phase,
    intro::{IntroPage, IntroPaginator, IntroStep, render_page},
    store::SessionRecord,
};
use crate::models::question::{EssayQuestion, McqQuestion, OPTION_COUNT, PublicEssay, PublicMcq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    NotStarted,
    McqInProgress,
    /// Challenge attempt that missed the gate. Terminal.
    EssayLocked,
    EssayInProgress,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "NOT_STARTED",
            SessionStatus::McqInProgress => "MCQ_IN_PROGRESS",
            SessionStatus::EssayLocked => "ESSAY_LOCKED",
            SessionStatus::EssayInProgress => "ESSAY_IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::EssayLocked | SessionStatus::Completed)
    }

    /// The timed phase this status belongs to, if any.
    pub fn active_phase(&self) -> Option<Phase> {
        match self {
            SessionStatus::McqInProgress => Some(Phase::Mcq),
            SessionStatus::EssayInProgress => Some(Phase::Essay),
            _ => None,
        }
    }
}

/// What caused a phase to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    User,
    Timer,
}

/// Outcome of a guarded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Transition {
    Advanced {
        from: SessionStatus,
        to: SessionStatus,
    },
    Unchanged,
}

impl Transition {
    pub fn is_advanced(&self) -> bool {
        matches!(self, Transition::Advanced { .. })
    }
}

/// Recorded state of one MCQ. Flags never influence scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqResponse {
    pub selected: Option<usize>,
    pub flagged: bool,
}

/// Result of pressing "Next" in the tutorial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroOutcome {
    Page(u8),
    Started(Transition),
}

#[derive(Debug, Clone)]
pub struct ExamSession {
    id: Uuid,
    user_id: String,
    config: &'static ExamConfig,
    part: ExamPart,
    status: SessionStatus,
    mcqs: Vec<McqQuestion>,
    essays: Vec<EssayQuestion>,
    mcq_answers: HashMap<String, McqResponse>,
    essay_answers: HashMap<String, String>,
    mcq_score: Option<u32>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    phase_deadline: Option<DateTime<Utc>>,
    intro: Option<IntroPaginator>,
    revision: u64,
}

impl ExamSession {
    /// Builds a session from fully sourced question sets.
    ///
    /// Delivered counts must match the config exactly.
    pub fn new(
        config: &'static ExamConfig,
        user_id: impl Into<String>,
        part: ExamPart,
        mcqs: Vec<McqQuestion>,
        essays: Vec<EssayQuestion>,
        with_tutorial: bool,
    ) -> Result<Self, ExamError> {
        if mcqs.len() != config.mcq_count {
            return Err(ExamError::QuestionCountMismatch {
                kind: "MCQ",
                expected: config.mcq_count,
                actual: mcqs.len(),
            });
        }
        if essays.len() != config.essay_count {
            return Err(ExamError::QuestionCountMismatch {
                kind: "essay",
                expected: config.essay_count,
                actual: essays.len(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            config,
            part,
            status: SessionStatus::NotStarted,
            mcqs,
            essays,
            mcq_answers: HashMap::new(),
            essay_answers: HashMap::new(),
            mcq_score: None,
            started_at: None,
            completed_at: None,
            phase_deadline: None,
            intro: with_tutorial.then(IntroPaginator::default),
            revision: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn mcq_score(&self) -> Option<u32> {
        self.mcq_score
    }

    pub fn mcqs(&self) -> &[McqQuestion] {
        &self.mcqs
    }

    pub fn essays(&self) -> &[EssayQuestion] {
        &self.essays
    }

    pub fn mcq_answers(&self) -> &HashMap<String, McqResponse> {
        &self.mcq_answers
    }

    pub fn essay_answers(&self) -> &HashMap<String, String> {
        &self.essay_answers
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn phase_deadline(&self) -> Option<DateTime<Utc>> {
        self.phase_deadline
    }

    /// Bumped on every state change; persistence drops snapshots older than the stored one.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn require(&self, expected: SessionStatus) -> Result<(), ExamError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(ExamError::WrongPhase {
                expected,
                actual: self.status,
            })
        }
    }

    // ------------------------------------------------------------------
    // Tutorial
    // ------------------------------------------------------------------

    fn pager(&self) -> Result<IntroPaginator, ExamError> {
        self.require(SessionStatus::NotStarted)?;
        self.intro.ok_or(ExamError::WrongPhase {
            expected: SessionStatus::NotStarted,
            actual: self.status,
        })
    }

    pub fn intro_page(&self) -> Result<IntroPage, ExamError> {
        let pager = self.pager()?;
        render_page(pager.page(), self.config, self.mcqs.len(), self.essays.len())
    }

    pub fn intro_next(&mut self, now: DateTime<Utc>) -> Result<IntroOutcome, ExamError> {
        let mut pager = self.pager()?;
        match pager.next() {
            IntroStep::Page(n) => {
                self.intro = Some(pager);
                Ok(IntroOutcome::Page(n))
            }
            IntroStep::StartTest => Ok(IntroOutcome::Started(self.start(now))),
        }
    }

    pub fn intro_back(&mut self) -> Result<u8, ExamError> {
        let mut pager = self.pager()?;
        let page = pager.back();
        self.intro = Some(pager);
        Ok(page)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Begins the attempt. Sessions without MCQs open straight into the essay phase.
    pub fn start(&mut self, now: DateTime<Utc>) -> Transition {
        if self.status != SessionStatus::NotStarted {
            return Transition::Unchanged;
        }
        let from = self.status;
        self.intro = None;
        self.started_at = Some(now);
        let phase = if self.mcqs.is_empty() {
            self.status = SessionStatus::EssayInProgress;
            Phase::Essay
        } else {
            self.status = SessionStatus::McqInProgress;
            Phase::Mcq
        };
        self.phase_deadline = Some(now + self.config.phase_duration(phase));
        self.touch();
        Transition::Advanced {
            from,
            to: self.status,
        }
    }

    fn mcq_index(&self, question_id: &str) -> Result<usize, ExamError> {
        self.mcqs
            .iter()
            .position(|q| q.id == question_id)
            .ok_or_else(|| ExamError::UnknownQuestion(question_id.to_string()))
    }

    pub fn answer_mcq(&mut self, question_id: &str, option: usize) -> Result<(), ExamError> {
        self.require(SessionStatus::McqInProgress)?;
        self.mcq_index(question_id)?;
        if option >= OPTION_COUNT {
            return Err(ExamError::InvalidOption(option));
        }
        self.mcq_answers
            .entry(question_id.to_string())
            .or_default()
            .selected = Some(option);
        self.touch();
        Ok(())
    }

    pub fn clear_mcq(&mut self, question_id: &str) -> Result<(), ExamError> {
        self.require(SessionStatus::McqInProgress)?;
        self.mcq_index(question_id)?;
        if let Some(response) = self.mcq_answers.get_mut(question_id) {
            response.selected = None;
            self.touch();
        }
        Ok(())
    }

    pub fn set_flag(&mut self, question_id: &str, flagged: bool) -> Result<(), ExamError> {
        self.require(SessionStatus::McqInProgress)?;
        self.mcq_index(question_id)?;
        self.mcq_answers
            .entry(question_id.to_string())
            .or_default()
            .flagged = flagged;
        self.touch();
        Ok(())
    }

    pub fn correct_count(&self) -> usize {
        self.mcqs
            .iter()
            .filter(|q| {
                self.mcq_answers
                    .get(&q.id)
                    .and_then(|r| r.selected)
                    .is_some_and(|selected| selected == q.correct_option)
            })
            .count()
    }

    fn compute_score(&self) -> u32 {
        if self.mcqs.is_empty() {
            return 0;
        }
        (self.correct_count() as f64 / self.mcqs.len() as f64 * 100.0).round() as u32
    }

    /// Ends the MCQ section. No-op unless the session is in `McqInProgress`.
    pub fn finish_mcq(&mut self, now: DateTime<Utc>, trigger: Trigger) -> Transition {
        if self.status != SessionStatus::McqInProgress {
            return Transition::Unchanged;
        }
        let from = self.status;
        let score = self.compute_score();
        self.mcq_score = Some(score);

        let locked = self.config.has_gate()
            && self
                .config
                .mcq_pass_threshold
                .is_some_and(|threshold| score < threshold);

        if self.essays.is_empty() {
            self.status = SessionStatus::Completed;
            self.completed_at = Some(now);
            self.phase_deadline = None;
        } else if locked {
            self.status = SessionStatus::EssayLocked;
            self.completed_at = Some(now);
            self.phase_deadline = None;
        } else {
            self.status = SessionStatus::EssayInProgress;
            self.phase_deadline = Some(now + self.config.phase_duration(Phase::Essay));
        }
        self.touch();

        tracing::info!(
            session_id = %self.id,
            score,
            ?trigger,
            status = self.status.as_str(),
            "MCQ section finished"
        );
        Transition::Advanced {
            from,
            to: self.status,
        }
    }

    pub fn answer_essay(&mut self, question_id: &str, text: String) -> Result<(), ExamError> {
        if self.status == SessionStatus::EssayLocked {
            return Err(ExamError::PhaseClosed);
        }
        self.require(SessionStatus::EssayInProgress)?;
        if !self.essays.iter().any(|q| q.id == question_id) {
            return Err(ExamError::UnknownQuestion(question_id.to_string()));
        }
        self.essay_answers.insert(question_id.to_string(), text);
        self.touch();
        Ok(())
    }

    /// Ends the essay section. Unanswered essays are recorded as empty.
    pub fn finish_essay(&mut self, now: DateTime<Utc>, trigger: Trigger) -> Transition {
        if self.status != SessionStatus::EssayInProgress {
            return Transition::Unchanged;
        }
        let from = self.status;
        for essay in &self.essays {
            self.essay_answers.entry(essay.id.clone()).or_default();
        }
        self.status = SessionStatus::Completed;
        self.completed_at = Some(now);
        self.phase_deadline = None;
        self.touch();

        tracing::info!(session_id = %self.id, ?trigger, "essay section finished");
        Transition::Advanced {
            from,
            to: self.status,
        }
    }

    /// Ends `phase` if it is the one currently running.
    pub fn finish_phase(&mut self, phase: Phase, now: DateTime<Utc>, trigger: Trigger) -> Transition {
        match phase {
            Phase::Mcq => self.finish_mcq(now, trigger),
            Phase::Essay => self.finish_essay(now, trigger),
        }
    }

    /// Applies every countdown that has run out by `now`.
    ///
    /// Each expiry is stamped at its own deadline, so an essay phase opened by a
    /// late-observed MCQ expiry starts counting from the MCQ deadline.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> Transition {
        let from = self.status;
        while let (Some(phase), Some(deadline)) = (self.status.active_phase(), self.phase_deadline) {
            if deadline > now {
                break;
            }
            if !self.finish_phase(phase, deadline, Trigger::Timer).is_advanced() {
                break;
            }
        }
        if self.status == from {
            Transition::Unchanged
        } else {
            Transition::Advanced {
                from,
                to: self.status,
            }
        }
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.phase_deadline
            .map(|deadline| (deadline - now).max(Duration::zero()))
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Client-facing snapshot. Answer keys are never included.
    pub fn view(&self, now: DateTime<Utc>) -> SessionView {
        let essays_visible = matches!(
            self.status,
            SessionStatus::EssayInProgress | SessionStatus::Completed
        );
        SessionView {
            id: self.id,
            config_key: self.config.key,
            title: self.config.title,
            part: self.part,
            status: self.status,
            intro_page: self.intro.map(|p| p.page()),
            mcq_score: self.mcq_score,
            started_at: self.started_at,
            completed_at: self.completed_at,
            remaining_seconds: self.remaining(now).map(|d| d.num_seconds()),
            answered_count: self
                .mcq_answers
                .values()
                .filter(|r| r.selected.is_some())
                .count(),
            flagged_count: self.mcq_answers.values().filter(|r| r.flagged).count(),
            mcqs: if self.status == SessionStatus::NotStarted {
                Vec::new()
            } else {
                self.mcqs.iter().map(PublicMcq::from).collect()
            },
            essays: if essays_visible {
                self.essays.iter().map(PublicEssay::from).collect()
            } else {
                Vec::new()
            },
            mcq_answers: self.mcq_answers.clone(),
            essay_answers: self.essay_answers.clone(),
            persistence_warning: None,
        }
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            user_id: self.user_id.clone(),
            config_key: self.config.key.to_string(),
            part: self.part.as_str().to_string(),
            status: self.status.as_str().to_string(),
            mcq_score: self.mcq_score.map(|s| s as i32),
            mcq_answers: sqlx::types::Json(self.mcq_answers.clone()),
            essay_answers: sqlx::types::Json(self.essay_answers.clone()),
            started_at: self.started_at,
            completed_at: self.completed_at,
            revision: self.revision as i64,
        }
    }
}

/// Snapshot of a session as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub config_key: &'static str,
    pub title: &'static str,
    pub part: ExamPart,
    pub status: SessionStatus,
    pub intro_page: Option<u8>,
    pub mcq_score: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
    pub answered_count: usize,
    pub flagged_count: usize,
    pub mcqs: Vec<PublicMcq>,
    pub essays: Vec<PublicEssay>,
    pub mcq_answers: HashMap<String, McqResponse>,
    pub essay_answers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}
