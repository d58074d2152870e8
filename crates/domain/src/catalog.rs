//! Catalog products offered by vendors.

use serde::{Deserialize, Serialize};

use common::{ProductId, VendorId};

use crate::money::Money;

/// A product listed by a vendor, with its current stock level.
///
/// Stock is unsigned by construction: the ledger can never record a
/// negative quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub vendor_id: VendorId,
    pub name: String,
    /// Current list price per unit. Orders capture this value at
    /// creation time, so later price changes do not rewrite history.
    pub unit_price: Money,
    pub stock: u32,
}

impl Product {
    /// Creates a new product with a fresh ID.
    pub fn new(vendor_id: VendorId, name: impl Into<String>, unit_price: Money, stock: u32) -> Self {
        Self {
            id: ProductId::new(),
            vendor_id,
            name: name.into(),
            unit_price,
            stock,
        }
    }

    /// Returns true if the current stock covers the requested quantity.
    pub fn can_cover(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}
