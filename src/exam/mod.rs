// src/exam/mod.rs

//! Mock-exam engine: catalog, question sourcing, tutorial pages, and the
//! per-attempt session state machine with its timers and persistence.

pub mod catalog;
pub mod events;
pub mod intro;
pub mod service;
pub mod session;
pub mod sourcing;
pub mod store;
pub mod timer;

use uuid::Uuid;

pub use catalog::{ExamConfig, ExamPart, Phase, TestType, get_config};
pub use service::ExamService;
pub use session::{ExamSession, SessionStatus, Transition, Trigger};

/// Errors raised by the exam engine.
#[derive(Debug, thiserror::Error)]
pub enum ExamError {
    #[error("invalid exam configuration: {0}")]
    UnknownExam(String),

    #[error("exam session {0} not found")]
    SessionNotFound(Uuid),

    #[error("action requires {expected:?} but session is {actual:?}")]
    WrongPhase {
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("essay section is locked for this attempt")]
    PhaseClosed,

    #[error("question {0} is not part of this session")]
    UnknownQuestion(String),

    #[error("option {0} is out of range")]
    InvalidOption(usize),

    #[error("tutorial page {0} does not exist")]
    IntroPageOutOfRange(u8),

    #[error("expected {expected} {kind} questions, got {actual}")]
    QuestionCountMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}
