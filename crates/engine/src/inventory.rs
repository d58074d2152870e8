//! Inventory ledger: the stock mutation guard.

use common::ProductId;
use domain::Product;
use market_store::StoreTx;

use crate::error::{EngineError, Result};

/// Serialized stock mutation inside one open unit of work.
///
/// The ledger borrows the transaction, so a reservation can only happen
/// in the same unit of work that persists the order consuming it. Both
/// commit together or neither does.
pub struct InventoryLedger<'a> {
    tx: &'a mut dyn StoreTx,
}

impl<'a> InventoryLedger<'a> {
    /// Wraps an open unit of work.
    pub fn new(tx: &'a mut dyn StoreTx) -> Self {
        Self { tx }
    }

    /// Atomically checks and decrements stock for one product.
    ///
    /// The product row is locked first, so two concurrent reservations
    /// for the same product serialize instead of both passing a stale
    /// check. Returns the product as it was at reservation time, which
    /// is where callers capture the unit price.
    pub async fn reserve(&mut self, product_id: ProductId, quantity: u32) -> Result<Product> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Reservation quantity must be at least 1".to_string(),
            ));
        }

        let product = self
            .tx
            .product_for_update(product_id)
            .await?
            .ok_or(EngineError::ProductNotFound(product_id))?;

        if !self.tx.deduct_stock(product_id, quantity).await? {
            return Err(EngineError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock,
            });
        }

        metrics::counter!("stock_reservations_total").increment(1);
        Ok(product)
    }

    /// Returns previously reserved quantity to stock.
    pub async fn release(&mut self, product_id: ProductId, quantity: u32) -> Result<()> {
        self.tx.restore_stock(product_id, quantity).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::VendorId;
    use domain::Money;
    use market_store::{MarketStore, MemoryStore};

    async fn store_with_product(stock: u32) -> (MemoryStore, Product) {
        let store = MemoryStore::new();
        let product = Product::new(VendorId::new(), "Pallet of rice", Money::from_dollars(40), stock);
        store.insert_product(&product).await.unwrap();
        (store, product)
    }

    #[tokio::test]
    async fn reserve_decrements_and_returns_snapshot() {
        let (store, product) = store_with_product(10).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(tx.as_mut());
        let snapshot = ledger.reserve(product.id, 4).await.unwrap();
        assert_eq!(snapshot.unit_price, product.unit_price);
        assert_eq!(snapshot.stock, 10);
        tx.commit().await.unwrap();

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 6);
    }

    #[tokio::test]
    async fn reserve_reports_available_on_shortage() {
        let (store, product) = store_with_product(3).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(tx.as_mut());
        let err = ledger.reserve(product.id, 4).await.unwrap_err();

        match err {
            EngineError::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                assert_eq!(product_id, product.id);
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            other => panic!("expected insufficient stock, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reserve_rejects_zero_quantity() {
        let (store, product) = store_with_product(3).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(tx.as_mut());
        let err = ledger.reserve(product.id, 0).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn reserve_unknown_product_is_not_found() {
        let (store, _) = store_with_product(3).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(tx.as_mut());
        let err = ledger.reserve(ProductId::new(), 1).await.unwrap_err();
        assert!(matches!(err, EngineError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn release_restores_stock() {
        let (store, product) = store_with_product(5).await;

        let mut tx = store.begin().await.unwrap();
        let mut ledger = InventoryLedger::new(tx.as_mut());
        ledger.reserve(product.id, 5).await.unwrap();
        ledger.release(product.id, 2).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 2);
    }
}
