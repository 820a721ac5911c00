// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use cma_prep::config::Config;
use cma_prep::exam::{
    ExamService,
    events::{EventBus, spawn_logger},
    service::Retention,
    sourcing::PgQuestionBank,
    store::PgSessionStore,
};
use cma_prep::routes;
use cma_prep::state::AppState;
use cma_prep::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return;
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    tracing::info!("Running migrations...");
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Failed to run database migrations: {}", e);
        return;
    }
    tracing::info!("Migrations applied successfully.");

    if let Err(e) = seed_admin_user(&pool, &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let events = EventBus::new(config.event_buffer);
    let _event_log = spawn_logger(&events);
    let exams = ExamService::new(
        Arc::new(PgQuestionBank::new(pool.clone())),
        Arc::new(PgSessionStore::new(pool.clone())),
        events,
    )
    .with_retention(Retention {
        finished: Duration::from_secs(config.session_retention),
        idle: Duration::from_secs(config.idle_session_ttl),
    });

    let state = AppState {
        pool,
        config: config.clone(),
        exams,
    };

    let app = routes::create_router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            return;
        }
    };
    tracing::info!("Listening on {}", config.bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

async fn seed_admin_user(pool: &PgPool, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) {
        let user_exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(pool)
            .await?;

        if user_exists.is_none() {
            tracing::info!("Seeding admin user: {}", username);
            let hashed_password = hash_password(password)?;

            sqlx::query("INSERT INTO users (username, password, role) VALUES ($1, $2, 'admin')")
                .bind(username)
                .bind(hashed_password)
                .execute(pool)
                .await?;
            tracing::info!("Admin user created successfully.");
        }
    }
    Ok(())
}
