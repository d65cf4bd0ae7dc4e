//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound | Self::OrderNotFound => StatusCode::NOT_FOUND,

            Self::LoginTaken | Self::OrderClaimedByAnotherUser => StatusCode::CONFLICT,

            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,

            Self::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,

            Self::OrderNumberInvalid | Self::InvalidWithdrawalAmount => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            Self::ValidationFailed | Self::InvalidRequest | Self::OrderNumberFormat => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}
