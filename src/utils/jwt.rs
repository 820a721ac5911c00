// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, exam::service::ANONYMOUS};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    /// User's role (e.g., 'user', 'admin').
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Who is making the request.
///
/// Populated per request from the bearer token; absent or empty means anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User { id: i64, role: String },
    Anonymous,
}

impl Identity {
    pub fn from_claims(claims: &Claims) -> Option<Self> {
        let id = claims.sub.parse::<i64>().ok()?;
        Some(Identity::User {
            id,
            role: claims.role.clone(),
        })
    }

    /// Key under which this identity's exam sessions are recorded.
    pub fn user_key(&self) -> String {
        match self {
            Identity::User { id, .. } => id.to_string(),
            Identity::Anonymous => ANONYMOUS.to_string(),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::User { id, .. } => Some(*id),
            Identity::Anonymous => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::User { role, .. } if role == "admin")
    }
}

/// Signs a new JWT for the user.
pub fn sign_jwt(id: i64, role: &str, secret: &str, expiration_seconds: u64) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

fn resolve(token: &str, config: &Config) -> Result<(Claims, Identity), StatusCode> {
    let claims = verify_jwt(token, &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    let identity = Identity::from_claims(&claims).ok_or(StatusCode::UNAUTHORIZED)?;
    Ok((claims, identity))
}

/// Axum Middleware: Authentication.
///
/// Requires a valid 'Authorization: Bearer <token>' header and injects both
/// `Claims` and `Identity` into the request extensions.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = bearer_token(&req).ok_or(StatusCode::UNAUTHORIZED)?;
    let (claims, identity) = resolve(token, &config)?;
    req.extensions_mut().insert(claims);
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Axum Middleware: optional authentication.
///
/// No header yields `Identity::Anonymous`; a header with a bad token is still rejected.
pub async fn identity_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let identity = match bearer_token(&req) {
        Some(token) => resolve(token, &config)?.1,
        None => Identity::Anonymous,
    };
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Axum Middleware: Admin Authorization.
///
/// Must be used AFTER `auth_middleware`.
pub async fn admin_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !identity.is_admin() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}
