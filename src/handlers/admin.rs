// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::question::{CreateEssayRequest, CreateMcqRequest},
    utils::html::{clean_html, clean_text},
};

/// Adds a multiple-choice question to the curated bank.
/// Admin only.
pub async fn create_mcq(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateMcqRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let options: Vec<String> = payload.options.iter().map(|o| clean_html(o)).collect();

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO mcq_questions
        (part, section, question, options, correct_option, explanation)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(payload.part.as_str())
    .bind(clean_text(&payload.section))
    .bind(clean_html(&payload.question))
    .bind(sqlx::types::Json(options))
    .bind(i32::from(payload.correct_option))
    .bind(payload.explanation.as_deref().map(clean_html))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create mcq: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(id, part = payload.part.as_str(), "curated mcq added");
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": format!("mcq-{}", id)}))))
}

/// Adds an essay scenario to the curated bank.
/// Admin only.
pub async fn create_essay(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateEssayRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO essay_questions
        (part, section, scenario, task, guidance)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(payload.part.as_str())
    .bind(clean_text(&payload.section))
    .bind(clean_html(&payload.scenario))
    .bind(clean_html(&payload.task))
    .bind(payload.guidance.as_deref().map(clean_html))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create essay: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tracing::info!(id, part = payload.part.as_str(), "curated essay added");
    Ok((StatusCode::CREATED, Json(serde_json::json!({"id": format!("essay-{}", id)}))))
}

/// Deletes a curated MCQ by ID.
/// Admin only. Sessions already holding the question keep their copy.
pub async fn delete_mcq(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM mcq_questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete mcq: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a curated essay scenario by ID.
/// Admin only.
pub async fn delete_essay(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("DELETE FROM essay_questions WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete essay: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
