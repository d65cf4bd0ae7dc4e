//! External accrual service
//!
//! [`AccrualClient`] is the only way the service talks to the accrual oracle.
//! [`HttpAccrualClient`] is the production implementation; the
//! [`AccrualWorker`] drives local order state from its answers.

mod client;
mod worker;

pub use client::HttpAccrualClient;
pub use worker::{AccrualWorker, CycleReport};

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use shared::models::OrderStatus;

/// Order state as reported by the accrual service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccrualReport {
    pub order: String,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: OrderStatus,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub accrual: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccrualLookup {
    Registered(AccrualReport),
    /// The accrual service does not know the order (HTTP 204)
    NotRegistered,
}

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
}

#[async_trait]
pub trait AccrualClient: Send + Sync {
    async fn fetch_accrual_status(&self, order_number: &str)
    -> Result<AccrualLookup, AccrualError>;
}

/// `REGISTERED` is the accrual service's name for an order it has queued
/// but not started.
fn deserialize_status<'de, D>(deserializer: D) -> Result<OrderStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "REGISTERED" | "NEW" => Ok(OrderStatus::New),
        "PROCESSING" => Ok(OrderStatus::Processing),
        "PROCESSED" => Ok(OrderStatus::Processed),
        "INVALID" => Ok(OrderStatus::Invalid),
        other => Err(serde::de::Error::custom(format!(
            "unknown accrual status: {other}"
        ))),
    }
}
