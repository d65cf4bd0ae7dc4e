//! In-memory [`Store`] for tests
//!
//! A single mutex guards all tables, so `withdraw` and `apply_accrual` are
//! atomic here in the same way the row-locked transactions are in Postgres.

use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{Balance, BalanceTransaction, LedgerEntryType, Order, OrderStatus, User};
use tokio::sync::Mutex;

use super::{ApplyOutcome, CreateOrderOutcome, Store, WithdrawOutcome, WithdrawalRecord};
use crate::error::{ServiceError, ServiceResult};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    orders: Vec<Order>,
    entries: Vec<BalanceTransaction>,
}

impl Tables {
    fn insert_or_get(&mut self, user_id: i64, number: &str, now: i64) -> CreateOrderOutcome {
        if let Some(existing) = self.orders.iter().find(|o| o.number == number) {
            return CreateOrderOutcome::Existing(existing.clone());
        }
        let order = Order {
            id: self.orders.len() as i64 + 1,
            number: number.to_string(),
            user_id,
            status: OrderStatus::New,
            created_at: now,
        };
        self.orders.push(order.clone());
        CreateOrderOutcome::Created(order)
    }

    fn append(
        &mut self,
        user_id: i64,
        order_id: Option<i64>,
        amount: Decimal,
        entry_type: LedgerEntryType,
        now: i64,
    ) -> BalanceTransaction {
        let entry = BalanceTransaction {
            id: self.entries.len() as i64 + 1,
            user_id,
            order_id,
            amount,
            entry_type,
            created_at: now,
        };
        self.entries.push(entry.clone());
        entry
    }

    fn balance(&self, user_id: i64) -> Balance {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .fold(Balance::default(), |mut balance, e| {
                balance.apply(e.entry_type, e.amount);
                balance
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a ledger entry directly, bypassing the lifecycle checks
    pub async fn seed_entry(
        &self,
        user_id: i64,
        order_id: Option<i64>,
        amount: Decimal,
        entry_type: LedgerEntryType,
    ) -> BalanceTransaction {
        let mut tables = self.tables.lock().await;
        let now = shared::util::now_millis();
        tables.append(user_id, order_id, amount, entry_type, now)
    }

    pub async fn entries(&self) -> Vec<BalanceTransaction> {
        self.tables.lock().await.entries.clone()
    }

    pub async fn order(&self, order_number: &str) -> Option<Order> {
        let tables = self.tables.lock().await;
        tables.orders.iter().find(|o| o.number == order_number).cloned()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(
        &self,
        login: &str,
        password_hash: &str,
        now: i64,
    ) -> ServiceResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.login == login) {
            return Ok(None);
        }
        let user = User {
            id: tables.users.len() as i64 + 1,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        tables.users.push(user.clone());
        Ok(Some(user))
    }

    async fn find_user_by_login(&self, login: &str) -> ServiceResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.login == login).cloned())
    }

    async fn create_order(
        &self,
        user_id: i64,
        order_number: &str,
        now: i64,
    ) -> ServiceResult<CreateOrderOutcome> {
        let mut tables = self.tables.lock().await;
        Ok(tables.insert_or_get(user_id, order_number, now))
    }

    async fn get_order_by_number_for_user(
        &self,
        order_number: &str,
        user_id: i64,
    ) -> ServiceResult<Option<Order>> {
        Ok(self
            .order(order_number)
            .await
            .filter(|o| o.user_id == user_id))
    }

    async fn list_orders_for_user(&self, user_id: i64) -> ServiceResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        let mut orders: Vec<Order> = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(orders)
    }

    async fn list_non_terminal_orders(&self) -> ServiceResult<Vec<Order>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .iter()
            .filter(|o| OrderStatus::NON_TERMINAL.contains(&o.status))
            .cloned()
            .collect())
    }

    async fn get_accrual_for_order(&self, order_id: i64) -> ServiceResult<Option<Decimal>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.order_id == Some(order_id) && e.entry_type == LedgerEntryType::Accrual)
            .map(|e| e.amount)
            .reduce(|a, b| a + b))
    }

    async fn get_user_balance(&self, user_id: i64) -> ServiceResult<Balance> {
        Ok(self.tables.lock().await.balance(user_id))
    }

    async fn list_withdrawals_for_user(
        &self,
        user_id: i64,
    ) -> ServiceResult<Vec<WithdrawalRecord>> {
        let tables = self.tables.lock().await;
        let mut records: Vec<(i64, WithdrawalRecord)> = tables
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.entry_type == LedgerEntryType::Withdrawal)
            .map(|e| {
                let order_number = e
                    .order_id
                    .and_then(|id| tables.orders.iter().find(|o| o.id == id))
                    .map(|o| o.number.clone())
                    .unwrap_or_default();
                let record = WithdrawalRecord {
                    order_number,
                    amount: e.amount,
                    created_at: e.created_at,
                };
                (e.id, record)
            })
            .collect();
        records.sort_by(|(a_id, a), (b_id, b)| (b.created_at, b_id).cmp(&(a.created_at, a_id)));
        Ok(records.into_iter().map(|(_, r)| r).collect())
    }

    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: Decimal,
        now: i64,
    ) -> ServiceResult<WithdrawOutcome> {
        let mut tables = self.tables.lock().await;
        if !tables.users.iter().any(|u| u.id == user_id) {
            return Err(ServiceError::App(AppError::not_found("User")));
        }

        let current = tables.balance(user_id).current();
        if amount > current {
            return Ok(WithdrawOutcome::InsufficientFunds { current });
        }

        let order = match tables.insert_or_get(user_id, order_number, now) {
            CreateOrderOutcome::Created(order) | CreateOrderOutcome::Existing(order) => order,
        };
        let entry = tables.append(
            user_id,
            Some(order.id),
            amount,
            LedgerEntryType::Withdrawal,
            now,
        );
        Ok(WithdrawOutcome::Recorded(entry))
    }

    async fn apply_accrual(
        &self,
        order_id: i64,
        next: OrderStatus,
        accrual: Option<Decimal>,
        now: i64,
    ) -> ServiceResult<ApplyOutcome> {
        let mut tables = self.tables.lock().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))?;

        if !order.status.can_advance_to(next) {
            return Ok(ApplyOutcome::Skipped {
                current: order.status,
            });
        }

        let user_id = order.user_id;
        order.status = next;

        let mut credited = None;
        if let (OrderStatus::Processed, Some(amount)) = (next, accrual) {
            let already = tables
                .entries
                .iter()
                .any(|e| e.order_id == Some(order_id) && e.entry_type == LedgerEntryType::Accrual);
            if !already {
                tables.append(
                    user_id,
                    Some(order_id),
                    amount,
                    LedgerEntryType::Accrual,
                    now,
                );
                credited = Some(amount);
            }
        }

        Ok(ApplyOutcome::Applied {
            status: next,
            credited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_order_is_insert_or_fetch() {
        let store = MemoryStore::new();
        let first = store.create_order(1, "79927398713", 10).await.unwrap();
        let CreateOrderOutcome::Created(created) = first else {
            panic!("expected a new order");
        };
        assert_eq!(created.status, OrderStatus::New);

        let second = store.create_order(2, "79927398713", 20).await.unwrap();
        assert_eq!(second, CreateOrderOutcome::Existing(created));
    }

    #[tokio::test]
    async fn test_accrual_is_credited_once() {
        let store = MemoryStore::new();
        store.create_order(1, "79927398713", 10).await.unwrap();

        let first = store
            .apply_accrual(1, OrderStatus::Processed, Some(dec("500")), 20)
            .await
            .unwrap();
        assert!(matches!(
            first,
            ApplyOutcome::Applied {
                credited: Some(_),
                ..
            }
        ));

        let second = store
            .apply_accrual(1, OrderStatus::Processed, Some(dec("500")), 30)
            .await
            .unwrap();
        assert_eq!(
            second,
            ApplyOutcome::Skipped {
                current: OrderStatus::Processed
            }
        );
        assert_eq!(store.get_user_balance(1).await.unwrap().accrued, dec("500"));
    }
}
