use shared::models::User;
use sqlx::PgExecutor;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    password_hash: String,
    created_at: i64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            login: row.login,
            password_hash: row.password_hash,
            created_at: row.created_at,
        }
    }
}

/// Insert a user; `None` if the login is already taken
pub async fn create<'e, E: PgExecutor<'e>>(
    db: E,
    login: &str,
    password_hash: &str,
    now: i64,
) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as(
        "INSERT INTO users (login, password_hash, created_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (login) DO NOTHING
         RETURNING id, login, password_hash, created_at",
    )
    .bind(login)
    .bind(password_hash)
    .bind(now)
    .fetch_optional(db)
    .await?;
    Ok(row.map(User::from))
}

pub async fn find_by_login<'e, E: PgExecutor<'e>>(
    db: E,
    login: &str,
) -> Result<Option<User>, sqlx::Error> {
    let row: Option<UserRow> = sqlx::query_as(
        "SELECT id, login, password_hash, created_at FROM users WHERE login = $1",
    )
    .bind(login)
    .fetch_optional(db)
    .await?;
    Ok(row.map(User::from))
}

/// Lock the user row for the rest of the transaction. `false` if no such user.
pub async fn lock<'e, E: PgExecutor<'e>>(db: E, user_id: i64) -> Result<bool, sqlx::Error> {
    // NO KEY UPDATE serializes withdrawals but leaves the FK KEY SHARE locks
    // taken by concurrent order and ledger inserts unblocked.
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1 FOR NO KEY UPDATE")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}
