//! Payment error types.

use std::time::Duration;

use domain::Money;
use engine::EngineError;
use thiserror::Error;

/// Errors that can occur while talking to the payment provider or
/// applying its callbacks.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The callback signature does not match the shared secret.
    #[error("Payment callback signature does not match")]
    SignatureMismatch,

    /// The shared secret cannot be used as an HMAC key.
    #[error("Payment secret is not a usable HMAC key")]
    InvalidKey,

    /// The requested amount cannot be charged.
    #[error("Cannot create a provider order over {0}")]
    InvalidAmount(Money),

    /// The provider rejected or failed the request.
    #[error("Payment provider error: {0}")]
    Gateway(String),

    /// The provider did not answer within the bound.
    #[error("Payment provider did not answer within {0:?}")]
    GatewayTimeout(Duration),

    /// Order engine error.
    #[error("Order engine error: {0}")]
    Engine(#[from] EngineError),
}

impl PaymentError {
    /// Returns true if the caller may retry the operation.
    ///
    /// Signature and amount failures are fatal; only provider timeouts
    /// and retryable engine errors are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::GatewayTimeout(_) => true,
            PaymentError::Engine(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
