// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

use cma_prep::{
    config::Config,
    exam::{
        ExamPart, ExamService,
        events::EventBus,
        sourcing::MemoryQuestionBank,
        store::{MemorySessionStore, SessionStore},
    },
    models::question::{McqQuestion, QuestionOrigin},
    routes,
    state::AppState,
};
use sqlx::{PgPool, postgres::PgPoolOptions};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

/// Prefix of the correct option text in every question the tests use.
pub const CORRECT_PREFIX: &str = "Evaluate the figures";

pub struct TestApp {
    pub address: String,
    pub exams: ExamService,
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/cma_prep_unused".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        bind_addr: ([127, 0, 0, 1], 0).into(),
        event_buffer: 64,
        session_retention: 900,
        idle_session_ttl: 7_200,
    }
}

/// Curated part 1 questions whose correct option starts with `CORRECT_PREFIX`.
pub fn curated_mcqs(n: usize) -> Vec<McqQuestion> {
    (0..n)
        .map(|i| {
            let correct_option = (i + 1) % 4;
            let mut options = vec![
                format!("{} in the variance report", CORRECT_PREFIX),
                "Ignore the variance".to_string(),
                "Restate the budget".to_string(),
                "Escalate without analysis".to_string(),
            ];
            options.rotate_right(correct_option);
            McqQuestion {
                id: format!("mcq-{}", i + 1),
                question: format!("Curated variance question {}", i + 1),
                options,
                correct_option,
                explanation: None,
                part: ExamPart::Part1,
                section: "Cost Management".to_string(),
                origin: QuestionOrigin::Curated,
            }
        })
        .collect()
}

/// Spawns the app on a random port.
///
/// Exam routes run against in-memory collaborators; the pool connects lazily
/// and is never touched by them.
pub async fn spawn_app(bank: MemoryQuestionBank, store: Arc<dyn SessionStore>) -> TestApp {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&test_config().database_url)
        .expect("lazy pool");
    spawn_app_with_pool(pool, bank, store).await
}

pub async fn spawn_app_with_pool(
    pool: PgPool,
    bank: MemoryQuestionBank,
    store: Arc<dyn SessionStore>,
) -> TestApp {
    let config = test_config();
    let exams = ExamService::new(Arc::new(bank), store, EventBus::new(config.event_buffer));
    let state = AppState {
        pool,
        config,
        exams: exams.clone(),
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp { address, exams }
}

/// Connects to and migrates the database named by `DATABASE_URL`.
/// Returns `None` when it is not set, so database tests skip themselves.
pub async fn live_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");
    Some(pool)
}

pub async fn spawn_default_app() -> TestApp {
    spawn_app(
        MemoryQuestionBank::new(curated_mcqs(120), Vec::new()),
        Arc::new(MemorySessionStore::new()),
    )
    .await
}

/// Option index a view shows as correct for the given public question.
pub fn correct_index(mcq: &serde_json::Value) -> usize {
    mcq["options"]
        .as_array()
        .unwrap()
        .iter()
        .position(|o| o.as_str().unwrap().starts_with(CORRECT_PREFIX))
        .unwrap()
}
