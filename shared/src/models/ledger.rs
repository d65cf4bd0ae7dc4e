//! Balance ledger model
//!
//! The ledger is append-only. A user's balance is never stored, it is
//! always derived from the entries:
//! `current = Σ ACCRUAL - Σ WITHDRAWAL`, `withdrawn = Σ WITHDRAWAL`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger entry kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    Accrual,
    Withdrawal,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accrual => "ACCRUAL",
            Self::Withdrawal => "WITHDRAWAL",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "ACCRUAL" => Some(Self::Accrual),
            "WITHDRAWAL" => Some(Self::Withdrawal),
            _ => None,
        }
    }
}

impl fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceTransaction {
    pub id: i64,
    pub user_id: i64,
    /// Accruals always reference an order; withdrawals reference the
    /// order number they were made against.
    pub order_id: Option<i64>,
    /// Non-negative
    pub amount: Decimal,
    pub entry_type: LedgerEntryType,
    /// Unix millis
    pub created_at: i64,
}

/// Aggregated balance of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub accrued: Decimal,
    pub withdrawn: Decimal,
}

impl Balance {
    pub fn current(&self) -> Decimal {
        self.accrued - self.withdrawn
    }

    /// Fold one entry into the running totals
    pub fn apply(&mut self, entry_type: LedgerEntryType, amount: Decimal) {
        match entry_type {
            LedgerEntryType::Accrual => self.accrued += amount,
            LedgerEntryType::Withdrawal => self.withdrawn += amount,
        }
    }
}

/// GET /api/user/balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current(),
            withdrawn: balance.withdrawn,
        }
    }
}

/// POST /api/user/balance/withdraw
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawRequest {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
}

/// A withdrawal as seen by its owner, newest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalResponse {
    /// Order number the withdrawal was made against
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    /// RFC 3339
    pub processed_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_balance_is_derived_without_drift() {
        let mut balance = Balance::default();
        for _ in 0..1000 {
            balance.apply(LedgerEntryType::Accrual, dec("0.10"));
        }
        for _ in 0..300 {
            balance.apply(LedgerEntryType::Withdrawal, dec("0.10"));
        }
        assert_eq!(balance.accrued, dec("100.00"));
        assert_eq!(balance.withdrawn, dec("30.00"));
        assert_eq!(balance.current(), dec("70.00"));
    }

    #[test]
    fn test_balance_response_from_balance() {
        let balance = Balance {
            accrued: dec("729.5"),
            withdrawn: dec("229.00"),
        };
        let resp = BalanceResponse::from(balance);
        assert_eq!(resp.current, dec("500.5"));
        assert_eq!(resp.withdrawn, dec("229.00"));

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["current"].as_f64(), Some(500.5));
        assert_eq!(json["withdrawn"].as_f64(), Some(229.0));
    }

    #[test]
    fn test_withdraw_request_accepts_integer_and_float_sums() {
        let req: WithdrawRequest =
            serde_json::from_str(r#"{"order":"2377225624","sum":751}"#).unwrap();
        assert_eq!(req.sum, dec("751"));

        let req: WithdrawRequest =
            serde_json::from_str(r#"{"order":"2377225624","sum":12.5}"#).unwrap();
        assert_eq!(req.sum, dec("12.5"));
    }

    #[test]
    fn test_entry_type_db_names() {
        assert_eq!(
            LedgerEntryType::from_db("ACCRUAL"),
            Some(LedgerEntryType::Accrual)
        );
        assert_eq!(
            LedgerEntryType::from_db(LedgerEntryType::Withdrawal.as_str()),
            Some(LedgerEntryType::Withdrawal)
        );
        assert_eq!(LedgerEntryType::from_db("REFUND"), None);
    }
}
