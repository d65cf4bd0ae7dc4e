//! Application state

use std::sync::Arc;

use crate::db::Store;
use crate::services::{OrderService, UserService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub users: UserService,
    /// JWT secret for user authentication
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt_secret: &str) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            users: UserService::new(store),
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}
