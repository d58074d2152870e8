//! Engine error types.

use std::time::Duration;

use common::{OrderId, ProductId, ThreadId, VendorId};
use domain::{DomainError, Party};
use market_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Checkout was attempted on a cart with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart lines span more than one vendor; checkout needs exactly one.
    #[error("Cart spans {} vendors; checkout requires exactly one", vendors.len())]
    MixedVendorCart { vendors: Vec<VendorId> },

    /// Not enough stock to cover a reservation.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Thread not found.
    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    /// The sender is not one of the thread's two participants.
    #[error("Sender {sender} is not a participant of thread {thread_id}")]
    NotAParticipant { thread_id: ThreadId, sender: Party },

    /// The order was not created from this thread.
    #[error("Order {order_id} does not belong to thread {thread_id}")]
    OrderNotInThread {
        thread_id: ThreadId,
        order_id: OrderId,
    },

    /// Malformed input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The order is already confirmed under a different transaction.
    #[error("Order {order_id} already confirmed with transaction {existing}")]
    AlreadyConfirmed { order_id: OrderId, existing: String },

    /// Domain rule violation (state machine, line validation, overflow).
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    /// Returns true if retrying the same call may succeed.
    ///
    /// Timeouts and store conflicts are transient. Everything else is a
    /// property of the request and will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout(_) | EngineError::Store(StoreError::Conflict { .. })
        )
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
