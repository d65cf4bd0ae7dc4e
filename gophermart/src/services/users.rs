//! Account registration and credential checks

use std::sync::Arc;

use shared::error::{AppError, ErrorCode};
use shared::models::{Credentials, User};

use crate::db::Store;
use crate::error::ServiceResult;
use crate::util::{hash_password, verify_password};

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn register(&self, credentials: &Credentials) -> ServiceResult<User> {
        let login = credentials.login.trim();
        if login.is_empty() || credentials.password.is_empty() {
            return Err(AppError::validation("Login and password are required").into());
        }

        let password_hash = hash_password(&credentials.password).map_err(|e| {
            tracing::error!("Password hashing failed: {e}");
            AppError::new(ErrorCode::InternalError)
        })?;

        let user = self
            .store
            .create_user(login, &password_hash, shared::util::now_millis())
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::LoginTaken).with_detail("login", login))?;

        tracing::info!(user_id = user.id, login = %user.login, "User registered");
        Ok(user)
    }

    pub async fn login(&self, credentials: &Credentials) -> ServiceResult<User> {
        let login = credentials.login.trim();
        if login.is_empty() || credentials.password.is_empty() {
            return Err(AppError::validation("Login and password are required").into());
        }

        let user = self
            .store
            .find_user_by_login(login)
            .await?
            .ok_or_else(AppError::invalid_credentials)?;

        if !verify_password(&credentials.password, &user.password_hash) {
            return Err(AppError::invalid_credentials().into());
        }
        Ok(user)
    }
}
