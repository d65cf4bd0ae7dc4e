//! Append-only balance ledger queries

use rust_decimal::Decimal;
use shared::models::{Balance, BalanceTransaction, LedgerEntryType};
use sqlx::PgExecutor;

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: i64,
    user_id: i64,
    order_id: Option<i64>,
    amount: Decimal,
    entry_type: String,
    created_at: i64,
}

impl TryFrom<EntryRow> for BalanceTransaction {
    type Error = sqlx::Error;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let entry_type = LedgerEntryType::from_db(&row.entry_type).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown ledger entry type: {}", row.entry_type).into())
        })?;
        Ok(BalanceTransaction {
            id: row.id,
            user_id: row.user_id,
            order_id: row.order_id,
            amount: row.amount,
            entry_type,
            created_at: row.created_at,
        })
    }
}

/// A withdrawal resolved to the order number it was made against
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WithdrawalRecord {
    pub order_number: String,
    pub amount: Decimal,
    pub created_at: i64,
}

pub async fn append_entry<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: i64,
    order_id: Option<i64>,
    amount: Decimal,
    entry_type: LedgerEntryType,
    now: i64,
) -> Result<BalanceTransaction, sqlx::Error> {
    let row: EntryRow = sqlx::query_as(
        "INSERT INTO balance_transactions (user_id, order_id, amount, type, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, user_id, order_id, amount, type AS entry_type, created_at",
    )
    .bind(user_id)
    .bind(order_id)
    .bind(amount)
    .bind(entry_type.as_str())
    .bind(now)
    .fetch_one(db)
    .await?;
    row.try_into()
}

/// Credit an order's owner. Returns `false` if the order already has an
/// ACCRUAL entry (unique partial index).
pub async fn append_accrual<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: i64,
    order_id: i64,
    amount: Decimal,
    now: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO balance_transactions (user_id, order_id, amount, type, created_at)
         VALUES ($1, $2, $3, 'ACCRUAL', $4)
         ON CONFLICT (order_id) WHERE type = 'ACCRUAL' DO NOTHING",
    )
    .bind(user_id)
    .bind(order_id)
    .bind(amount)
    .bind(now)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn accrual_for_order<'e, E: PgExecutor<'e>>(
    db: E,
    order_id: i64,
) -> Result<Option<Decimal>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT SUM(amount) FROM balance_transactions
         WHERE order_id = $1 AND type = 'ACCRUAL'",
    )
    .bind(order_id)
    .fetch_one(db)
    .await
}

pub async fn balance_for_user<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: i64,
) -> Result<Balance, sqlx::Error> {
    let (accrued, withdrawn): (Decimal, Decimal) = sqlx::query_as(
        "SELECT
             COALESCE(SUM(amount) FILTER (WHERE type = 'ACCRUAL'), 0),
             COALESCE(SUM(amount) FILTER (WHERE type = 'WITHDRAWAL'), 0)
         FROM balance_transactions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(db)
    .await?;
    Ok(Balance { accrued, withdrawn })
}

pub async fn withdrawals_for_user<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: i64,
) -> Result<Vec<WithdrawalRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT COALESCE(o.order_number, '') AS order_number, t.amount, t.created_at
         FROM balance_transactions t
         LEFT JOIN orders o ON o.id = t.order_id
         WHERE t.user_id = $1 AND t.type = 'WITHDRAWAL'
         ORDER BY t.created_at DESC, t.id DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}
