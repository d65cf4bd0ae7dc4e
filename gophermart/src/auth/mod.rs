//! Authentication

pub mod user_auth;

pub use user_auth::{UserIdentity, auth_cookie, create_token, user_auth_middleware};
