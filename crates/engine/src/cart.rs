//! Cart aggregate operations.

use std::sync::Arc;

use common::{ProductId, ShopkeeperId};
use domain::CartLine;
use market_store::MarketStore;

use crate::config::{EngineConfig, bounded};
use crate::error::{EngineError, Result};

/// Per-shopkeeper staging area for order lines.
///
/// Availability is deliberately not checked here; stock is validated
/// once, at checkout, inside the checkout's unit of work.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn MarketStore>,
    config: EngineConfig,
}

impl CartService {
    /// Creates a new cart service over the shared store.
    pub fn new(store: Arc<dyn MarketStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Adds a line to the cart, merging with an existing line for the
    /// same product.
    #[tracing::instrument(skip(self))]
    pub async fn add_line(
        &self,
        shopkeeper_id: ShopkeeperId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartLine> {
        if quantity == 0 {
            return Err(EngineError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        bounded(self.config.op_timeout, async {
            let mut tx = self.store.begin().await?;

            // Carts must not hold dangling product references.
            if tx.product(product_id).await?.is_none() {
                return Err(EngineError::ProductNotFound(product_id));
            }

            let line = tx
                .upsert_cart_line(CartLine::new(shopkeeper_id, product_id, quantity))
                .await?;
            tx.commit().await?;

            metrics::counter!("cart_lines_added_total").increment(1);
            Ok(line)
        })
        .await
    }

    /// Current snapshot of the shopkeeper's cart.
    pub async fn lines(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.cart_lines(shopkeeper_id).await?)
        })
        .await
    }

    /// Deletes every line in the shopkeeper's cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, shopkeeper_id: ShopkeeperId) -> Result<()> {
        bounded(self.config.op_timeout, async {
            let mut tx = self.store.begin().await?;
            tx.clear_cart(shopkeeper_id).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
