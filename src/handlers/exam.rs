// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    exam::{ExamConfig, ExamPart, ExamService, catalog},
    utils::jwt::Identity,
};

/// Catalog entry as shown in the exam picker.
#[derive(Debug, Serialize)]
pub struct ExamSummary {
    #[serde(flatten)]
    pub config: ExamConfig,
    pub total_minutes: u32,
}

impl From<&ExamConfig> for ExamSummary {
    fn from(config: &ExamConfig) -> Self {
        Self {
            config: *config,
            total_minutes: config.total_minutes(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StartExamRequest {
    /// Overrides the catalog's default part.
    pub part: Option<ExamPart>,
    /// Walk through the tutorial first (default: true).
    pub tutorial: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct McqAnswerRequest {
    /// Selected option index, or null to clear.
    pub option: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub flagged: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EssayAnswerRequest {
    #[validate(length(max = 20000, message = "Essay response is limited to 20000 characters"))]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

/// Lists the exam catalog.
pub async fn list_exams() -> impl IntoResponse {
    let exams: Vec<ExamSummary> = catalog::all().iter().map(ExamSummary::from).collect();
    Json(exams)
}

/// Returns one exam variant, or 400 "invalid exam configuration".
pub async fn get_exam(Path(key): Path<String>) -> Result<impl IntoResponse, AppError> {
    let config = catalog::get_config(&key)?;
    Ok(Json(ExamSummary::from(config)))
}

/// Starts a new attempt.
///
/// Questions are sourced before the session exists; an unknown key creates nothing.
pub async fn start_session(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(key): Path<String>,
    payload: Option<Json<StartExamRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload.unwrap_or_default();
    let view = exams
        .create_session(
            &key,
            &identity.user_key(),
            req.part,
            req.tutorial.unwrap_or(true),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_session(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.view(id, &identity.user_key()).await?))
}

/// Current tutorial page.
pub async fn intro_page(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.intro_page(id, &identity.user_key()).await?))
}

/// "Next" in the tutorial. On the last page this starts the exam.
pub async fn intro_next(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.intro_next(id, &identity.user_key()).await?))
}

pub async fn intro_back(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.intro_back(id, &identity.user_key()).await?))
}

pub async fn answer_mcq(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path((id, question_id)): Path<(Uuid, String)>,
    Json(req): Json<McqAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = exams
        .answer_mcq(id, &identity.user_key(), &question_id, req.option)
        .await?;
    Ok(Json(view))
}

pub async fn flag_mcq(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path((id, question_id)): Path<(Uuid, String)>,
    Json(req): Json<FlagRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = exams
        .flag_mcq(id, &identity.user_key(), &question_id, req.flagged)
        .await?;
    Ok(Json(view))
}

/// Ends the MCQ section. Calling it again after the section ended changes nothing.
pub async fn finish_mcq(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.finish_mcq(id, &identity.user_key()).await?))
}

pub async fn answer_essay(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path((id, question_id)): Path<(Uuid, String)>,
    Json(req): Json<EssayAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let view = exams
        .answer_essay(id, &identity.user_key(), &question_id, req.text)
        .await?;
    Ok(Json(view))
}

pub async fn finish_essay(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(exams.finish_essay(id, &identity.user_key()).await?))
}

/// Leaves the exam flow, discarding timers and the in-memory attempt.
pub async fn exit_session(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    exams.exit(id, &identity.user_key()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Recent attempts of the signed-in user (status, score and dates only).
pub async fn history(
    State(exams): State<ExamService>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, AppError> {
    let entries = exams
        .history(&identity.user_key(), params.limit.unwrap_or(20))
        .await
        .map_err(|e| {
            tracing::error!("Failed to load exam history: {:?}", e);
            AppError::from(e)
        })?;
    Ok(Json(entries))
}
