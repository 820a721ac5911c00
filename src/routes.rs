// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, auth, community, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, identity_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, exams, sessions, posts, admin).
/// * Exam routes accept anonymous callers; history, writes to the community
///   and the admin bank require a token.
/// * Applies global middleware (Trace, CORS) and injects the shared state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let identity = middleware::from_fn_with_state(state.clone(), identity_middleware);
    let auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let exam_routes = Router::new()
        .route("/", get(exam::list_exams))
        .route("/{key}", get(exam::get_exam))
        .route("/{key}/sessions", post(exam::start_session))
        .layer(identity.clone())
        .merge(
            Router::new()
                .route("/history", get(exam::history))
                .layer(auth()),
        );

    let session_routes = Router::new()
        .route(
            "/{id}",
            get(exam::get_session).delete(exam::exit_session),
        )
        .route("/{id}/intro", get(exam::intro_page))
        .route("/{id}/intro/next", post(exam::intro_next))
        .route("/{id}/intro/back", post(exam::intro_back))
        .route("/{id}/mcq/finish", post(exam::finish_mcq))
        .route("/{id}/mcq/{question_id}", put(exam::answer_mcq))
        .route("/{id}/mcq/{question_id}/flag", put(exam::flag_mcq))
        .route("/{id}/essays/finish", post(exam::finish_essay))
        .route("/{id}/essays/{question_id}", put(exam::answer_essay))
        .layer(identity);

    let post_routes = Router::new()
        .route("/", get(community::list_posts))
        .route("/{id}", get(community::get_post))
        .route("/{id}/comments", get(community::list_comments))
        // Protected community routes
        .merge(
            Router::new()
                .route("/", post(community::create_post))
                .route("/{id}", delete(community::delete_post))
                .route("/{id}/comments", post(community::create_comment))
                .layer(auth()),
        );

    let admin_routes = Router::new()
        .route("/questions/mcq", post(admin::create_mcq))
        .route("/questions/mcq/{id}", delete(admin::delete_mcq))
        .route("/questions/essay", post(admin::create_essay))
        .route("/questions/essay/{id}", delete(admin::delete_essay))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth());

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/exams", exam_routes)
        .nest("/api/sessions", session_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
