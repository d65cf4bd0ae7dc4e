//! User Model

use serde::{Deserialize, Serialize};

/// Registered account. Password hash never leaves the server.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
    /// Unix millis
    pub created_at: i64,
}

/// POST /api/user/register, POST /api/user/login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}
