//! User JWT authentication
//!
//! Tokens are accepted from `Authorization: Bearer <token>` or from the
//! `jwt` cookie set at login.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

pub const AUTH_COOKIE: &str = "jwt";

const JWT_EXPIRY_HOURS: i64 = 24;

/// JWT claims for user authentication
#[derive(Debug, Serialize, Deserialize)]
pub struct UserClaims {
    /// User ID
    pub sub: String,
    pub login: String,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated user extracted from JWT
#[derive(Debug, Clone)]
pub struct UserIdentity {
    pub user_id: i64,
    pub login: String,
}

pub fn create_token(
    user_id: i64,
    login: &str,
    secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let claims = UserClaims {
        sub: user_id.to_string(),
        login: login.to_string(),
        exp: (now + chrono::Duration::hours(JWT_EXPIRY_HOURS)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<UserIdentity, AppError> {
    let token_data = jsonwebtoken::decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("JWT validation failed: {e}");
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired),
            _ => AppError::new(ErrorCode::TokenInvalid),
        }
    })?;

    let user_id = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| AppError::new(ErrorCode::TokenInvalid))?;

    Ok(UserIdentity {
        user_id,
        login: token_data.claims.login,
    })
}

/// `Set-Cookie` value carrying the token
pub fn auth_cookie(token: &str) -> String {
    format!(
        "{AUTH_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        JWT_EXPIRY_HOURS * 3600
    )
}

fn extract_token(request: &Request) -> Option<&str> {
    let headers = request.headers();
    if let Some(bearer) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.trim());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == AUTH_COOKIE).then_some(value)
        })
}

/// Middleware that verifies the user JWT and injects [`UserIdentity`]
pub async fn user_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_token(&request)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::not_authenticated().into_response())?;

    let identity =
        verify_token(token, &state.jwt_secret).map_err(IntoResponse::into_response)?;

    tracing::debug!(user_id = identity.user_id, login = %identity.login, "Request authenticated");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
