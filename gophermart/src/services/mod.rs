//! Loyalty business logic

pub mod luhn;
pub mod orders;
pub mod users;

pub use orders::{OrderService, SubmitOutcome};
pub use users::UserService;
