//! Payment confirmation adapter.
//!
//! The provider is an opaque external service: we create a provider
//! order before presenting a checkout, and later receive a callback
//! naming the payment. The callback signature MUST verify against the
//! shared secret before any order is touched; only then does the
//! confirmation reach the order engine.

pub mod error;
pub mod gateway;
pub mod service;
pub mod signature;

pub use error::{PaymentError, Result};
pub use gateway::{GatewayOrder, MockGateway, PaymentGateway};
pub use service::PaymentService;
pub use signature::CallbackSignature;
