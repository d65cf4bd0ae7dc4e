//! Order Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status
///
/// `NEW` → `PROCESSING` → `PROCESSED` | `INVALID`. Only the accrual worker
/// moves an order out of `NEW`/`PROCESSING`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderStatus {
    /// Statuses the accrual worker still polls for
    pub const NON_TERMINAL: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Processed => "PROCESSED",
            Self::Invalid => "INVALID",
        }
    }

    /// Parse the value stored in the `orders.status` column
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(Self::New),
            "PROCESSING" => Some(Self::Processing),
            "PROCESSED" => Some(Self::Processed),
            "INVALID" => Some(Self::Invalid),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Invalid)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Processing => 1,
            Self::Processed | Self::Invalid => 2,
        }
    }

    /// Whether a local order in `self` may move to `next`.
    ///
    /// Terminal orders never move; otherwise the status may only go forward.
    /// Re-reporting the current status is not a transition.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db(s).ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// A submitted purchase reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: i64,
    /// Luhn-valid decimal digits, unique across all users
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    /// Submission time (Unix millis)
    pub created_at: i64,
}

/// Order list entry returned to the owner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
    /// RFC 3339
    pub uploaded_at: String,
}

/// Accrual credited to a single order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderAccrualResponse {
    pub order: String,
    pub status: OrderStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
}
