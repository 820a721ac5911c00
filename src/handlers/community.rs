use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        comment::{CommentResponse, CreateCommentRequest},
        post::{CreatePostRequest, Post, PostListParams, PostRow},
    },
    utils::{
        html::{clean_html, clean_text},
        jwt::Identity,
    },
};

const POST_COLUMNS: &str = "id, user_id, title, kind, payload, comments_count, created_at";

fn signed_in(identity: &Identity) -> Result<i64, AppError> {
    identity
        .user_id()
        .ok_or(AppError::AuthError("Login required".to_string()))
}

/// Create a new post.
/// Requires: Login.
///
/// The body is decoded by hand so an unknown or mismatched content kind is a
/// 400 like any other invalid post.
pub async fn create_post(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let payload: CreatePostRequest = serde_json::from_value(body)?;
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    let user_id = signed_in(&identity)?;

    let mut content = payload.content;
    content.sanitize();

    let post_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO posts (user_id, title, kind, payload)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(clean_text(&payload.title))
    .bind(content.kind())
    .bind(content.payload())
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create post: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": post_id})),
    ))
}

/// List posts (Recent first).
/// Filter out soft-deleted posts.
/// Supports cursor-based pagination and filtering by kind.
pub async fn list_posts(
    State(pool): State<PgPool>,
    Query(params): Query<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let rows = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE deleted_at IS NULL
          AND ($1::TIMESTAMPTZ IS NULL OR created_at < $1)
          AND ($2::TEXT IS NULL OR kind = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#
    ))
    .bind(params.cursor)
    .bind(params.kind.as_deref())
    .bind(limit)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list posts: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let posts = rows
        .into_iter()
        .map(Post::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(posts))
}

/// Get a single post by ID.
pub async fn get_post(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Post not found".to_string()))?;

    Ok(Json(Post::try_from(row)?))
}

/// Delete a post (Soft Delete).
/// Requires: Login + (Author OR Admin).
pub async fn delete_post(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = signed_in(&identity)?;

    let author: i64 =
        sqlx::query_scalar("SELECT user_id FROM posts WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Post not found".to_string()))?;

    if author != user_id && !identity.is_admin() {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this post".to_string(),
        ));
    }

    sqlx::query("UPDATE posts SET deleted_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete post: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Create a new comment, optionally as a reply.
pub async fn create_comment(
    State(pool): State<PgPool>,
    Extension(identity): Extension<Identity>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = signed_in(&identity)?;

    let mut tx = pool.begin().await?;

    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 AND deleted_at IS NULL")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    // A reply hangs under its parent's root, or under the parent itself when
    // the parent is top-level.
    let mut root_id: Option<i64> = None;
    if let Some(pid) = payload.parent_id {
        let (parent_id, parent_root): (i64, Option<i64>) = sqlx::query_as(
            "SELECT id, root_id FROM comments WHERE id = $1 AND post_id = $2",
        )
        .bind(pid)
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("Parent comment not found".to_string()))?;

        root_id = Some(parent_root.unwrap_or(parent_id));
    }

    let new_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO comments (post_id, user_id, content, root_id, parent_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(post_id)
    .bind(user_id)
    .bind(clean_html(&payload.content))
    .bind(root_id)
    .bind(payload.parent_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": new_id })),
    ))
}

/// List all comments for a post, threads grouped under their root.
pub async fn list_comments(
    State(pool): State<PgPool>,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comments = sqlx::query_as::<_, CommentResponse>(
        r#"
        SELECT
            c.id, c.post_id, c.user_id, u.username, c.content,
            c.root_id, c.parent_id, c.created_at
        FROM comments c
        JOIN users u ON c.user_id = u.id
        WHERE c.post_id = $1 AND c.deleted_at IS NULL
        ORDER BY COALESCE(c.root_id, c.id), c.root_id IS NOT NULL, c.created_at ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(comments))
}
