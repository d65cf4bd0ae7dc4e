//! HTTP API

pub mod balance;
pub mod health;
pub mod logging;
pub mod orders;
pub mod user;

use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::error::AppError;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;

use crate::auth::user_auth_middleware;
use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

pub fn create_router(state: AppState) -> Router {
    // Authenticated user API
    let user = Router::new()
        .route(
            "/api/user/orders",
            post(orders::submit_order).get(orders::list_orders),
        )
        .route(
            "/api/user/orders/{number}/accrual",
            get(orders::get_order_accrual),
        )
        .route("/api/user/balance", get(balance::get_balance))
        .route("/api/user/balance/withdraw", post(balance::withdraw))
        .route("/api/user/withdrawals", get(balance::list_withdrawals))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    // Registration and login (no auth)
    let account = Router::new()
        .route("/api/user/register", post(user::register))
        .route("/api/user/login", post(user::login));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(account)
        .merge(user)
        .layer(middleware::from_fn(logging::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            XRequestId,
        ))
        .with_state(state)
}
