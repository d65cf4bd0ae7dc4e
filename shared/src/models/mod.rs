//! Loyalty data models shared by the server and its clients

pub mod ledger;
pub mod order;
pub mod user;

pub use ledger::{
    Balance, BalanceResponse, BalanceTransaction, LedgerEntryType, WithdrawRequest,
    WithdrawalResponse,
};
pub use order::{Order, OrderAccrualResponse, OrderResponse, OrderStatus};
pub use user::{AuthResponse, Credentials, User};
