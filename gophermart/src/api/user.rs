//! Registration and login

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use shared::error::{AppError, ErrorCode};
use shared::models::{AuthResponse, Credentials};

use crate::auth::{auth_cookie, create_token};
use crate::state::AppState;

/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(credentials) = payload.map_err(|e| AppError::invalid_request(e.body_text()))?;
    let user = state.users.register(&credentials).await?;
    issue_token(&state, user.id, &user.login)
}

/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(credentials) = payload.map_err(|e| AppError::invalid_request(e.body_text()))?;
    let user = state.users.login(&credentials).await?;
    tracing::info!(user_id = user.id, "User logged in");
    issue_token(&state, user.id, &user.login)
}

/// Token goes out as a bearer header, an HttpOnly cookie and the JSON body
fn issue_token(state: &AppState, user_id: i64, login: &str) -> Result<Response, AppError> {
    let token = create_token(user_id, login, &state.jwt_secret).map_err(|e| {
        tracing::error!("JWT creation failed: {e}");
        AppError::new(ErrorCode::InternalError)
    })?;

    Ok((
        [
            (header::AUTHORIZATION, format!("Bearer {token}")),
            (header::SET_COOKIE, auth_cookie(&token)),
        ],
        Json(AuthResponse { token }),
    )
        .into_response())
}
