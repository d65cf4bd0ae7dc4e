//! Order submission and listing

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use shared::error::{ApiResponse, AppError};
use shared::models::OrderAccrualResponse;

use super::ApiResult;
use crate::auth::UserIdentity;
use crate::services::SubmitOutcome;
use crate::state::AppState;

/// POST /api/user/orders (plain-text order number)
pub async fn submit_order(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    body: String,
) -> Result<Response, AppError> {
    let outcome = state.orders.submit_order(identity.user_id, &body).await?;
    let response = match outcome {
        SubmitOutcome::Accepted => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::ok_with_message("Order accepted for processing")),
        ),
        SubmitOutcome::AlreadyUploaded => (
            StatusCode::OK,
            Json(ApiResponse::ok_with_message("Order already uploaded")),
        ),
    };
    Ok(response.into_response())
}

/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> Result<Response, AppError> {
    let orders = state.orders.list_orders(identity.user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(orders).into_response())
}

/// GET /api/user/orders/{number}/accrual
pub async fn get_order_accrual(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(number): Path<String>,
) -> ApiResult<OrderAccrualResponse> {
    let accrual = state
        .orders
        .get_accrual_for_order(identity.user_id, &number)
        .await?;
    Ok(Json(accrual))
}
