use shared::models::{Order, OrderStatus};
use sqlx::{PgConnection, PgExecutor};

use super::CreateOrderOutcome;

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    user_id: i64,
    status: String,
    created_at: i64,
}

impl TryFrom<OrderRow> for Order {
    type Error = sqlx::Error;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_db(&row.status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown order status: {}", row.status).into())
        })?;
        Ok(Order {
            id: row.id,
            number: row.order_number,
            user_id: row.user_id,
            status,
            created_at: row.created_at,
        })
    }
}

fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, sqlx::Error> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Insert a `NEW` order, or return the row that already owns the number.
pub async fn insert_or_get(
    conn: &mut PgConnection,
    user_id: i64,
    order_number: &str,
    now: i64,
) -> Result<CreateOrderOutcome, sqlx::Error> {
    let created: Option<OrderRow> = sqlx::query_as(
        "INSERT INTO orders (order_number, user_id, status, created_at)
         VALUES ($1, $2, 'NEW', $3)
         ON CONFLICT (order_number) DO NOTHING
         RETURNING id, order_number, user_id, status, created_at",
    )
    .bind(order_number)
    .bind(user_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = created {
        return Ok(CreateOrderOutcome::Created(row.try_into()?));
    }

    let existing = find_by_number(&mut *conn, order_number)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(CreateOrderOutcome::Existing(existing))
}

pub async fn find_by_number<'e, E: PgExecutor<'e>>(
    db: E,
    order_number: &str,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT id, order_number, user_id, status, created_at
         FROM orders WHERE order_number = $1",
    )
    .bind(order_number)
    .fetch_optional(db)
    .await?;
    row.map(Order::try_from).transpose()
}

pub async fn find_by_number_for_user<'e, E: PgExecutor<'e>>(
    db: E,
    order_number: &str,
    user_id: i64,
) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT id, order_number, user_id, status, created_at
         FROM orders WHERE order_number = $1 AND user_id = $2",
    )
    .bind(order_number)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    row.map(Order::try_from).transpose()
}

pub async fn list_for_user<'e, E: PgExecutor<'e>>(
    db: E,
    user_id: i64,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        "SELECT id, order_number, user_id, status, created_at
         FROM orders WHERE user_id = $1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    into_orders(rows)
}

pub async fn list_non_terminal<'e, E: PgExecutor<'e>>(db: E) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        "SELECT id, order_number, user_id, status, created_at
         FROM orders WHERE status IN ('NEW', 'PROCESSING')
         ORDER BY created_at, id",
    )
    .fetch_all(db)
    .await?;
    into_orders(rows)
}

/// Fetch and lock an order row for the rest of the transaction
pub async fn lock<'e, E: PgExecutor<'e>>(
    db: E,
    order_id: i64,
) -> Result<Option<Order>, sqlx::Error> {
    // Ledger inserts referencing this order only need KEY SHARE
    let row: Option<OrderRow> = sqlx::query_as(
        "SELECT id, order_number, user_id, status, created_at
         FROM orders WHERE id = $1 FOR NO KEY UPDATE",
    )
    .bind(order_id)
    .fetch_optional(db)
    .await?;
    row.map(Order::try_from).transpose()
}

pub async fn update_status<'e, E: PgExecutor<'e>>(
    db: E,
    order_id: i64,
    status: OrderStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(status.as_str())
        .bind(order_id)
        .execute(db)
        .await?;
    Ok(())
}
