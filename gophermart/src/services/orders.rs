//! Order lifecycle: submission, listing, balance and withdrawals
//!
//! The service never advances an order's status; that is the accrual
//! worker's job. Each rejection is a distinct [`ErrorCode`].

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::error::{AppError, AppResult, ErrorCode};
use shared::models::{
    Balance, BalanceTransaction, OrderAccrualResponse, OrderResponse, WithdrawalResponse,
};
use shared::util::{millis_to_rfc3339, now_millis};

use super::luhn;
use crate::db::{CreateOrderOutcome, Store, WithdrawOutcome};
use crate::error::ServiceResult;

/// Successful order submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New order created in `NEW`
    Accepted,
    /// The same user already submitted this number
    AlreadyUploaded,
}

/// Trim and validate a submitted order number
pub fn parse_order_number(raw: &str) -> AppResult<&str> {
    let number = raw.trim();
    if number.is_empty() {
        return Err(AppError::with_message(
            ErrorCode::OrderNumberFormat,
            "Order number is empty",
        ));
    }
    if !luhn::is_valid(number) {
        return Err(AppError::new(ErrorCode::OrderNumberInvalid).with_detail("order", number));
    }
    Ok(number)
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
}

impl OrderService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn submit_order(&self, user_id: i64, raw: &str) -> ServiceResult<SubmitOutcome> {
        let number = parse_order_number(raw)?;

        match self
            .store
            .create_order(user_id, number, now_millis())
            .await?
        {
            CreateOrderOutcome::Created(order) => {
                tracing::info!(order_number = %order.number, user_id, "Order accepted");
                Ok(SubmitOutcome::Accepted)
            }
            CreateOrderOutcome::Existing(order) if order.user_id == user_id => {
                Ok(SubmitOutcome::AlreadyUploaded)
            }
            CreateOrderOutcome::Existing(order) => {
                tracing::warn!(
                    order_number = %order.number,
                    user_id,
                    "Order number already claimed by another user"
                );
                Err(ErrorCode::OrderClaimedByAnotherUser.into())
            }
        }
    }

    /// The user's orders, newest first, with the accrual credited so far
    pub async fn list_orders(&self, user_id: i64) -> ServiceResult<Vec<OrderResponse>> {
        let orders = self.store.list_orders_for_user(user_id).await?;
        let mut out = Vec::with_capacity(orders.len());
        for order in orders {
            let accrual = self.store.get_accrual_for_order(order.id).await?;
            out.push(OrderResponse {
                number: order.number,
                status: order.status,
                accrual,
                uploaded_at: millis_to_rfc3339(order.created_at),
            });
        }
        Ok(out)
    }

    pub async fn get_balance(&self, user_id: i64) -> ServiceResult<Balance> {
        self.store.get_user_balance(user_id).await
    }

    pub async fn list_withdrawals(&self, user_id: i64) -> ServiceResult<Vec<WithdrawalResponse>> {
        let records = self.store.list_withdrawals_for_user(user_id).await?;
        Ok(records
            .into_iter()
            .map(|r| WithdrawalResponse {
                order: r.order_number,
                sum: r.amount,
                processed_at: millis_to_rfc3339(r.created_at),
            })
            .collect())
    }

    /// Spend `sum` points against `order_number`.
    ///
    /// The balance check and the ledger write happen atomically in the store;
    /// an insufficient balance writes nothing.
    pub async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> ServiceResult<BalanceTransaction> {
        let number = parse_order_number(order_number)?;

        // Amounts are stored with two decimal places
        if sum <= Decimal::ZERO || sum.normalize().scale() > 2 {
            return Err(AppError::new(ErrorCode::InvalidWithdrawalAmount)
                .with_detail("sum", sum.to_string())
                .into());
        }

        match self
            .store
            .withdraw(user_id, number, sum, now_millis())
            .await?
        {
            WithdrawOutcome::Recorded(entry) => {
                tracing::info!(order_number = %number, user_id, sum = %sum, "Withdrawal recorded");
                Ok(entry)
            }
            WithdrawOutcome::InsufficientFunds { current } => {
                tracing::debug!(user_id, sum = %sum, current = %current, "Insufficient funds");
                Err(AppError::new(ErrorCode::InsufficientFunds)
                    .with_detail("current", current.to_string())
                    .into())
            }
        }
    }

    /// Accrual credited to one of the user's orders
    pub async fn get_accrual_for_order(
        &self,
        user_id: i64,
        order_number: &str,
    ) -> ServiceResult<OrderAccrualResponse> {
        let number = order_number.trim();
        let order = self
            .store
            .get_order_by_number_for_user(number, user_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound).with_detail("order", number))?;
        let accrual = self.store.get_accrual_for_order(order.id).await?;
        Ok(OrderAccrualResponse {
            order: order.number,
            status: order.status,
            accrual,
        })
    }
}
