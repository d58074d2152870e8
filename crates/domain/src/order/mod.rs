//! Orders and their lifecycle.

mod status;

pub use status::OrderStatus;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};

use crate::error::{DomainError, UnknownTag};
use crate::money::Money;

/// How an order came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOrigin {
    /// Checked out directly from the shopkeeper's cart.
    Direct,

    /// Created from an estimation inside a negotiation thread.
    ChatBased,
}

impl OrderOrigin {
    /// Returns the origin name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderOrigin::Direct => "Direct",
            OrderOrigin::ChatBased => "ChatBased",
        }
    }
}

impl std::fmt::Display for OrderOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderOrigin {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Direct" => Ok(OrderOrigin::Direct),
            "ChatBased" => Ok(OrderOrigin::ChatBased),
            other => Err(UnknownTag::new("order origin", other)),
        }
    }
}

/// One line of an order.
///
/// The unit price is captured from the product at order creation and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Returns quantity times unit price, or None on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// An order placed by a shopkeeper with a single vendor.
///
/// The parties and lines are fixed at creation; only `status` and
/// `transaction_id` change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub shopkeeper_id: ShopkeeperId,
    pub vendor_id: VendorId,
    pub lines: Vec<OrderLine>,
    pub total: Money,
    pub status: OrderStatus,
    pub origin: OrderOrigin,
    /// Set iff the order originated from a negotiation thread.
    pub thread_id: Option<ThreadId>,
    /// External payment transaction reference, set on payment confirmation.
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending order from a direct cart checkout.
    pub fn direct(
        shopkeeper_id: ShopkeeperId,
        vendor_id: VendorId,
        lines: Vec<OrderLine>,
    ) -> Result<Self, DomainError> {
        Self::build(shopkeeper_id, vendor_id, lines, OrderOrigin::Direct, None)
    }

    /// Creates a pending order from an estimation in a thread.
    pub fn chat_based(
        shopkeeper_id: ShopkeeperId,
        vendor_id: VendorId,
        thread_id: ThreadId,
        lines: Vec<OrderLine>,
    ) -> Result<Self, DomainError> {
        Self::build(
            shopkeeper_id,
            vendor_id,
            lines,
            OrderOrigin::ChatBased,
            Some(thread_id),
        )
    }

    fn build(
        shopkeeper_id: ShopkeeperId,
        vendor_id: VendorId,
        lines: Vec<OrderLine>,
        origin: OrderOrigin,
        thread_id: Option<ThreadId>,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::NoLines);
        }
        for (i, line) in lines.iter().enumerate() {
            if line.quantity == 0 {
                return Err(DomainError::InvalidQuantity {
                    quantity: line.quantity,
                });
            }
            if lines[..i].iter().any(|l| l.product_id == line.product_id) {
                return Err(DomainError::DuplicateLine {
                    product_id: line.product_id,
                });
            }
        }
        let total = Self::total_of(&lines)?;

        Ok(Self {
            id: OrderId::new(),
            shopkeeper_id,
            vendor_id,
            lines,
            total,
            status: OrderStatus::Pending,
            origin,
            thread_id,
            transaction_id: None,
            created_at: Utc::now(),
        })
    }

    /// Sums the line totals with overflow checking.
    pub fn total_of(lines: &[OrderLine]) -> Result<Money, DomainError> {
        lines.iter().try_fold(Money::zero(), |acc, line| {
            let line_total = line.line_total().ok_or(DomainError::AmountOverflow)?;
            acc.checked_add(line_total)
                .ok_or(DomainError::AmountOverflow)
        })
    }

    /// Moves the order to `next`, enforcing the lifecycle.
    pub fn advance(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}
