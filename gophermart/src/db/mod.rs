//! Database access layer
//!
//! [`Store`] is the seam between the loyalty logic and PostgreSQL. The
//! production implementation, [`PgStore`], delegates to the per-table query
//! functions in [`users`], [`orders`] and [`ledger`]. The two compound
//! operations, [`Store::withdraw`] and [`Store::apply_accrual`], each run in a
//! single transaction holding a row lock on the affected user or order.

pub mod ledger;
pub mod orders;
pub mod users;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{Balance, BalanceTransaction, LedgerEntryType, Order, OrderStatus, User};
use sqlx::PgPool;

use crate::error::{ServiceError, ServiceResult};

pub use ledger::WithdrawalRecord;

/// Result of an insert-or-fetch on `orders.order_number`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOrderOutcome {
    Created(Order),
    /// The number was already taken; carries the existing row untouched
    Existing(Order),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithdrawOutcome {
    Recorded(BalanceTransaction),
    /// Nothing was written
    InsufficientFunds { current: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Status moved forward; `credited` is the ACCRUAL appended, if any
    Applied {
        status: OrderStatus,
        credited: Option<Decimal>,
    },
    /// Terminal order, backward transition or same status: nothing written
    Skipped { current: OrderStatus },
}

#[async_trait]
pub trait Store: Send + Sync {
    /// `None` if the login is taken
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        now: i64,
    ) -> ServiceResult<Option<User>>;

    async fn find_user_by_login(&self, login: &str) -> ServiceResult<Option<User>>;

    /// Atomic insert-or-fetch keyed by order number
    async fn create_order(
        &self,
        user_id: i64,
        order_number: &str,
        now: i64,
    ) -> ServiceResult<CreateOrderOutcome>;

    async fn get_order_by_number_for_user(
        &self,
        order_number: &str,
        user_id: i64,
    ) -> ServiceResult<Option<Order>>;

    /// Newest first
    async fn list_orders_for_user(&self, user_id: i64) -> ServiceResult<Vec<Order>>;

    /// `NEW` and `PROCESSING` orders of all users, oldest first
    async fn list_non_terminal_orders(&self) -> ServiceResult<Vec<Order>>;

    async fn get_accrual_for_order(&self, order_id: i64) -> ServiceResult<Option<Decimal>>;

    async fn get_user_balance(&self, user_id: i64) -> ServiceResult<Balance>;

    /// Newest first
    async fn list_withdrawals_for_user(&self, user_id: i64)
    -> ServiceResult<Vec<WithdrawalRecord>>;

    /// Check the balance and append a WITHDRAWAL in one serialized step.
    ///
    /// The order is resolved by number, or created in `NEW` for the user when
    /// the number was never submitted.
    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: Decimal,
        now: i64,
    ) -> ServiceResult<WithdrawOutcome>;

    /// Move an order forward and credit its owner when it reaches
    /// `PROCESSED` with an amount. An order is credited at most once.
    async fn apply_accrual(
        &self,
        order_id: i64,
        next: OrderStatus,
        accrual: Option<Decimal>,
        now: i64,
    ) -> ServiceResult<ApplyOutcome>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        now: i64,
    ) -> ServiceResult<Option<User>> {
        Ok(users::create(&self.pool, login, password_hash, now).await?)
    }

    async fn find_user_by_login(&self, login: &str) -> ServiceResult<Option<User>> {
        Ok(users::find_by_login(&self.pool, login).await?)
    }

    async fn create_order(
        &self,
        user_id: i64,
        order_number: &str,
        now: i64,
    ) -> ServiceResult<CreateOrderOutcome> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::insert_or_get(&mut conn, user_id, order_number, now).await?)
    }

    async fn get_order_by_number_for_user(
        &self,
        order_number: &str,
        user_id: i64,
    ) -> ServiceResult<Option<Order>> {
        Ok(orders::find_by_number_for_user(&self.pool, order_number, user_id).await?)
    }

    async fn list_orders_for_user(&self, user_id: i64) -> ServiceResult<Vec<Order>> {
        Ok(orders::list_for_user(&self.pool, user_id).await?)
    }

    async fn list_non_terminal_orders(&self) -> ServiceResult<Vec<Order>> {
        Ok(orders::list_non_terminal(&self.pool).await?)
    }

    async fn get_accrual_for_order(&self, order_id: i64) -> ServiceResult<Option<Decimal>> {
        Ok(ledger::accrual_for_order(&self.pool, order_id).await?)
    }

    async fn get_user_balance(&self, user_id: i64) -> ServiceResult<Balance> {
        Ok(ledger::balance_for_user(&self.pool, user_id).await?)
    }

    async fn list_withdrawals_for_user(
        &self,
        user_id: i64,
    ) -> ServiceResult<Vec<WithdrawalRecord>> {
        Ok(ledger::withdrawals_for_user(&self.pool, user_id).await?)
    }

    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: Decimal,
        now: i64,
    ) -> ServiceResult<WithdrawOutcome> {
        let mut tx = self.pool.begin().await?;

        // Per-user serialization point for concurrent withdrawals
        if !users::lock(&mut *tx, user_id).await? {
            return Err(ServiceError::App(AppError::not_found("User")));
        }

        let balance = ledger::balance_for_user(&mut *tx, user_id).await?;
        if amount > balance.current() {
            tx.rollback().await?;
            return Ok(WithdrawOutcome::InsufficientFunds {
                current: balance.current(),
            });
        }

        let order = match orders::insert_or_get(&mut tx, user_id, order_number, now).await? {
            CreateOrderOutcome::Created(order) | CreateOrderOutcome::Existing(order) => order,
        };
        let entry = ledger::append_entry(
            &mut *tx,
            user_id,
            Some(order.id),
            amount,
            LedgerEntryType::Withdrawal,
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(WithdrawOutcome::Recorded(entry))
    }

    async fn apply_accrual(
        &self,
        order_id: i64,
        next: OrderStatus,
        accrual: Option<Decimal>,
        now: i64,
    ) -> ServiceResult<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        let order = orders::lock(&mut *tx, order_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;

        if !order.status.can_advance_to(next) {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Skipped {
                current: order.status,
            });
        }

        orders::update_status(&mut *tx, order_id, next).await?;

        let mut credited = None;
        if let (OrderStatus::Processed, Some(amount)) = (next, accrual) {
            // false when an ACCRUAL already exists for this order
            if ledger::append_accrual(&mut *tx, order.user_id, order_id, amount, now).await? {
                credited = Some(amount);
            }
        }

        tx.commit().await?;
        Ok(ApplyOutcome::Applied {
            status: next,
            credited,
        })
    }
}
