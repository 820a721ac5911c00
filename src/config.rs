// src/config.rs

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub bind_addr: SocketAddr,
    /// Per-subscriber buffer of the exam event stream.
    pub event_buffer: usize,
    /// Seconds a finished attempt stays in memory.
    pub session_retention: u64,
    /// Seconds an attempt may sit on the tutorial untouched.
    pub idle_session_ttl: u64,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;
        let jwt_expiration = parsed("JWT_EXPIRATION", 86_400u64)?;
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let bind_addr = parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let event_buffer = parsed("EVENT_BUFFER", 256usize)?;
        let session_retention = parsed("SESSION_RETENTION_SECS", 900u64)?;
        let idle_session_ttl = parsed("IDLE_SESSION_TTL_SECS", 7_200u64)?;

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            admin_username: env::var("ADMIN_USERNAME").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            bind_addr,
            event_buffer,
            session_retention,
            idle_session_ttl,
        })
    }
}
