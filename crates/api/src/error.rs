//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use engine::EngineError;
use market_store::StoreError;
use payment::PaymentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Engine operation error.
    Engine(EngineError),
    /// Payment flow error.
    Payment(PaymentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(err) => engine_error_to_response(&err),
            ApiError::Payment(err) => payment_error_to_response(&err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn engine_error_to_response(err: &EngineError) -> (StatusCode, String) {
    let status = match err {
        EngineError::ProductNotFound(_)
        | EngineError::OrderNotFound(_)
        | EngineError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::EmptyCart
        | EngineError::Validation(_)
        | EngineError::NotAParticipant { .. }
        | EngineError::OrderNotInThread { .. } => StatusCode::BAD_REQUEST,
        EngineError::MixedVendorCart { .. }
        | EngineError::InsufficientStock { .. }
        | EngineError::AlreadyConfirmed { .. }
        | EngineError::Store(StoreError::Conflict { .. }) => StatusCode::CONFLICT,
        EngineError::Domain(DomainError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        EngineError::Domain(_) => StatusCode::BAD_REQUEST,
        EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        EngineError::Store(store_err) => {
            tracing::error!(error = %store_err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

fn payment_error_to_response(err: &PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::SignatureMismatch => (StatusCode::UNAUTHORIZED, err.to_string()),
        PaymentError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        PaymentError::Gateway(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
        PaymentError::GatewayTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        PaymentError::InvalidKey => {
            tracing::error!("payment secret rejected as HMAC key");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        PaymentError::Engine(engine_err) => engine_error_to_response(engine_err),
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError::Engine(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
