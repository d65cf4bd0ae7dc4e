//! Shared types for the loyalty service
//!
//! Error codes, API response structures, and the order/ledger data model
//! used by the server and anything that talks to it.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
