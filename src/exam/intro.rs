// src/exam/intro.rs

//! Pre-exam tutorial, walked page by page the way a testing-center
//! onboarding screen is.

use serde::Serialize;

use super::{ExamConfig, ExamError};

pub const TUTORIAL_PAGES: u8 = 16;

/// One rendered tutorial page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntroPage {
    pub number: u8,
    pub total: u8,
    pub title: &'static str,
    pub body: String,
}

/// Result of pressing "Next".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroStep {
    Page(u8),
    /// "Start test" on the last page; the caller leaves tutorial mode.
    StartTest,
}

/// Current position in the tutorial. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntroPaginator {
    page: u8,
}

impl Default for IntroPaginator {
    fn default() -> Self {
        Self { page: 1 }
    }
}

impl IntroPaginator {
    pub fn page(&self) -> u8 {
        self.page
    }

    pub fn next(&mut self) -> IntroStep {
        if self.page >= TUTORIAL_PAGES {
            return IntroStep::StartTest;
        }
        self.page += 1;
        IntroStep::Page(self.page)
    }

    pub fn back(&mut self) -> u8 {
        self.page = self.page.saturating_sub(1).max(1);
        self.page
    }
}

const STATIC_PAGES: [(&str, &str); 15] = [
    (
        "Testing Center Rules",
        "Personal items, including phones, watches, notes, and bags, must be stored in your assigned locker. \
         Only the materials provided on screen may be used during the exam.",
    ),
    (
        "Identification and Check-In",
        "A real test session begins with identity verification. In this simulation you are already checked in; \
         your attempt is recorded against your account, or as anonymous if you are not signed in.",
    ),
    (
        "Screen Layout",
        "The top bar shows the exam title, your position in the section, and the time remaining. \
         The question appears in the main panel and navigation buttons sit along the bottom.",
    ),
    (
        "Navigating Questions",
        "Use Next and Previous to move through the section. You may revisit any question in the current section; \
         answers you have entered are kept when you move away and come back.",
    ),
    (
        "Answering Multiple-Choice Questions",
        "Each multiple-choice question has four options. Select one option to record your answer. \
         Selecting a different option replaces your previous choice.",
    ),
    (
        "Flagging for Review",
        "Use the Flag button to mark a question you want to revisit. Flags are reminders only; \
         they do not change your answer or your score.",
    ),
    (
        "The Review Screen",
        "At any point in the multiple-choice section you can open the review screen to see which questions \
         are answered, unanswered, or flagged, and jump directly to any of them.",
    ),
    (
        "Calculator",
        "An on-screen calculator is available for both sections. Your own calculator is not permitted \
         at the testing center.",
    ),
    (
        "Time Remaining",
        "Each section has its own countdown. When the countdown reaches zero the section ends automatically \
         and the answers entered at that moment are final.",
    ),
    (
        "Moving Between Sections",
        "Once you finish the multiple-choice section you cannot return to it. In some exam variants the essay \
         section opens only if your multiple-choice score meets the required threshold.",
    ),
    (
        "Essay Section Layout",
        "Each essay presents a scenario followed by one or more written tasks. Read the whole scenario before \
         you start writing; the tasks often depend on details given early on.",
    ),
    (
        "Writing Your Responses",
        "Type your response in the answer area below each task. Basic editing such as cut, copy, and paste is \
         available. Unanswered essays are submitted as blank when the section ends.",
    ),
    (
        "Breaks",
        "The countdown keeps running during unscheduled breaks. Plan your time so that you can finish \
         both sections within the allotted duration.",
    ),
    (
        "Confidentiality",
        "Exam content is confidential. By continuing you agree not to copy, record, or share any question \
         you see during this attempt.",
    ),
    (
        "Ready to Begin",
        "This is the end of the tutorial. Select Start Test to begin. Your countdown starts immediately \
         and cannot be paused.",
    ),
];

fn overview(config: &ExamConfig, mcq_count: usize, essay_count: usize) -> String {
    let mut sections = Vec::new();
    if mcq_count > 0 {
        sections.push(format!(
            "{} multiple-choice questions ({} minutes)",
            mcq_count, config.mcq_duration_minutes
        ));
    }
    if essay_count > 0 {
        sections.push(format!(
            "{} essay {} ({} minutes)",
            essay_count,
            if essay_count == 1 { "scenario" } else { "scenarios" },
            config.essay_duration_minutes
        ));
    }
    format!(
        "Welcome to the {}. This attempt covers {}. Total time: {} minutes. It consists of {}.",
        config.title,
        config.part.label(),
        config.total_minutes(),
        sections.join(" followed by ")
    )
}

/// Renders tutorial page `number` (1-based).
///
/// Page 1 summarises the active exam; every other page is static.
pub fn render_page(
    number: u8,
    config: &ExamConfig,
    mcq_count: usize,
    essay_count: usize,
) -> Result<IntroPage, ExamError> {
    match number {
        1 => Ok(IntroPage {
            number,
            total: TUTORIAL_PAGES,
            title: "Exam Overview",
            body: overview(config, mcq_count, essay_count),
        }),
        2..=TUTORIAL_PAGES => {
            let (title, body) = STATIC_PAGES[usize::from(number) - 2];
            Ok(IntroPage {
                number,
                total: TUTORIAL_PAGES,
                title,
                body: body.to_string(),
            })
        }
        _ => Err(ExamError::IntroPageOutOfRange(number)),
    }
}
