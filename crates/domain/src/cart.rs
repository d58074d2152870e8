//! Shopkeeper cart lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{ProductId, ShopkeeperId};

/// One line of a shopkeeper's cart.
///
/// A cart holds at most one line per product; adding the same product
/// again increases the quantity of the existing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub shopkeeper_id: ShopkeeperId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    /// Creates a new cart line stamped with the current time.
    pub fn new(shopkeeper_id: ShopkeeperId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            shopkeeper_id,
            product_id,
            quantity,
            added_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_roundtrip() {
        let line = CartLine::new(ShopkeeperId::new(), ProductId::new(), 3);
        let json = serde_json::to_string(&line).unwrap();
        let back: CartLine = serde_json::from_str(&json).unwrap();
        assert_eq!(line, back);
    }
}
