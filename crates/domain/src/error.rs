//! Domain error types.

use thiserror::Error;

use common::ProductId;

use crate::chat::MessageKind;
use crate::order::OrderStatus;

/// Errors raised by domain rules and constructors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Quantity must be at least one.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// An order must carry at least one line.
    #[error("Order has no lines")]
    NoLines,

    /// An order may reference each product at most once.
    #[error("Duplicate order line for product {product_id}")]
    DuplicateLine { product_id: ProductId },

    /// The order total does not fit in the money range.
    #[error("Order total overflows the representable amount")]
    AmountOverflow,

    /// Text messages must have a non-empty body.
    #[error("Message body is empty")]
    EmptyMessageBody,

    /// Estimation and invoice messages must reference an order.
    #[error("{kind} messages must reference an order")]
    OrderRefRequired { kind: MessageKind },

    /// The requested status change is not allowed by the lifecycle.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

/// Error returned when decoding a closed enum from its string tag.
///
/// Unknown tags are rejected at the boundary instead of being mapped
/// to a fallback variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} tag: {value}")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownTag {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
