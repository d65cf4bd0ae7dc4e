//! Balance and withdrawals

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use shared::error::{ApiResponse, AppError};
use shared::models::{BalanceResponse, WithdrawRequest};

use super::ApiResult;
use crate::auth::UserIdentity;
use crate::state::AppState;

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<BalanceResponse> {
    let balance = state.orders.get_balance(identity.user_id).await?;
    Ok(Json(balance.into()))
}

/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> ApiResult<ApiResponse<()>> {
    let Json(req) = payload.map_err(|e| AppError::invalid_request(e.body_text()))?;
    state
        .orders
        .withdraw(identity.user_id, &req.order, req.sum)
        .await?;
    Ok(Json(ApiResponse::ok()))
}

/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<Response, AppError> {
    let withdrawals = state.orders.list_withdrawals(identity.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(withdrawals).into_response())
}
