//! Order engine: creation from both origins and the status lifecycle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use common::{OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
use domain::{Message, MessageKind, Money, Order, OrderLine, OrderStatus, Party};
use market_store::MarketStore;

use crate::config::{EngineConfig, bounded};
use crate::error::{EngineError, Result};
use crate::feed::MessageFeed;
use crate::inventory::InventoryLedger;

/// One proposed line of an estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimationLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// The state machine owning order creation and status transitions.
///
/// Every mutation runs as one unit of work: stock reservation, the
/// order insert and any message append commit together or not at all.
#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn MarketStore>,
    feed: MessageFeed,
    config: EngineConfig,
}

impl OrderEngine {
    /// Creates a new order engine over the shared store.
    pub fn new(store: Arc<dyn MarketStore>, feed: MessageFeed, config: EngineConfig) -> Self {
        Self {
            store,
            feed,
            config,
        }
    }

    /// Converts the shopkeeper's cart into a pending direct order.
    ///
    /// Every cart line must belong to the same vendor and be coverable
    /// by current stock. On success the cart is cleared; on any failure
    /// nothing is persisted and no stock is lost.
    #[tracing::instrument(skip(self))]
    pub async fn create_from_cart(&self, shopkeeper_id: ShopkeeperId) -> Result<Order> {
        metrics::counter!("checkouts_total").increment(1);
        let started = std::time::Instant::now();

        bounded(self.config.op_timeout, async {
            let mut tx = self.store.begin().await?;

            let cart = tx.cart_lines(shopkeeper_id).await?;
            if cart.is_empty() {
                return Err(EngineError::EmptyCart);
            }

            // 1. Resolve the vendor and insist the cart has exactly one.
            let mut vendors: Vec<VendorId> = Vec::new();
            for cart_line in &cart {
                let product = tx
                    .product(cart_line.product_id)
                    .await?
                    .ok_or(EngineError::ProductNotFound(cart_line.product_id))?;
                if !vendors.contains(&product.vendor_id) {
                    vendors.push(product.vendor_id);
                }
            }
            if vendors.len() > 1 {
                return Err(EngineError::MixedVendorCart { vendors });
            }
            let vendor_id = vendors[0];

            // 2. Reserve stock line by line, capturing unit prices.
            let mut ledger = InventoryLedger::new(tx.as_mut());
            let mut lines = Vec::with_capacity(cart.len());
            for cart_line in &cart {
                let product = ledger
                    .reserve(cart_line.product_id, cart_line.quantity)
                    .await?;
                lines.push(OrderLine::new(
                    product.id,
                    cart_line.quantity,
                    product.unit_price,
                ));
            }

            // 3. Persist the order and drain the cart in the same commit.
            let order = Order::direct(shopkeeper_id, vendor_id, lines)?;
            tx.insert_order(&order).await?;
            tx.clear_cart(shopkeeper_id).await?;
            tx.commit().await?;

            metrics::counter!("orders_created_total", "origin" => "direct").increment(1);
            metrics::histogram!("checkout_duration_seconds")
                .record(started.elapsed().as_secs_f64());
            tracing::info!(order_id = %order.id, total = %order.total, "order created from cart");
            Ok(order)
        })
        .await
    }

    /// Creates a pending order from an estimation inside a thread.
    ///
    /// The vendor and shopkeeper are resolved from the thread. Stock is
    /// reserved here, at estimation time; the later invoice only
    /// confirms. The estimation message referencing the new order is
    /// appended in the same unit of work and published after commit.
    #[tracing::instrument(skip(self, lines, body))]
    pub async fn create_from_estimation(
        &self,
        thread_id: ThreadId,
        sender: Party,
        lines: Vec<EstimationLine>,
        body: String,
    ) -> Result<Order> {
        bounded(self.config.op_timeout, async move {
            let mut tx = self.store.begin().await?;

            let thread = tx
                .thread(thread_id)
                .await?
                .ok_or(EngineError::ThreadNotFound(thread_id))?;
            if !thread.includes(sender) {
                return Err(EngineError::NotAParticipant { thread_id, sender });
            }
            if lines.is_empty() {
                return Err(EngineError::Validation(
                    "Estimation needs at least one line".to_string(),
                ));
            }

            let mut ledger = InventoryLedger::new(tx.as_mut());
            let mut order_lines: Vec<OrderLine> = Vec::with_capacity(lines.len());
            for line in &lines {
                // One line per product; orders key their lines by product id.
                if order_lines.iter().any(|l| l.product_id == line.product_id) {
                    return Err(EngineError::Validation(format!(
                        "Estimation repeats product {}",
                        line.product_id
                    )));
                }
                let product = ledger.reserve(line.product_id, line.quantity).await?;
                order_lines.push(OrderLine::new(product.id, line.quantity, product.unit_price));
            }

            let order = Order::chat_based(
                thread.shopkeeper_id,
                thread.vendor_id,
                thread_id,
                order_lines,
            )?;
            tx.insert_order(&order).await?;

            let message = Message::new(
                thread_id,
                sender,
                MessageKind::Estimation,
                body,
                Some(order.id),
            )?;
            tx.insert_message(&message).await?;
            tx.commit().await?;

            self.feed.publish(&message);
            metrics::counter!("orders_created_total", "origin" => "chat").increment(1);
            tracing::info!(order_id = %order.id, %thread_id, "order created from estimation");
            Ok(order)
        })
        .await
    }

    /// Moves an order to `new_status`, enforcing the lifecycle.
    ///
    /// Cancelling returns every line's quantity to stock inside the
    /// same unit of work.
    #[tracing::instrument(skip(self))]
    pub async fn advance_status(&self, order_id: OrderId, new_status: OrderStatus) -> Result<Order> {
        bounded(self.config.op_timeout, async move {
            let mut tx = self.store.begin().await?;

            let mut order = tx
                .order_for_update(order_id)
                .await?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            order.advance(new_status)?;

            if new_status == OrderStatus::Cancelled {
                let mut ledger = InventoryLedger::new(tx.as_mut());
                for line in &order.lines {
                    ledger.release(line.product_id, line.quantity).await?;
                }
                metrics::counter!("orders_cancelled_total").increment(1);
            }

            tx.update_order(&order).await?;
            tx.commit().await?;

            tracing::info!(%order_id, status = %order.status, "order status advanced");
            Ok(order)
        })
        .await
    }

    /// Confirms an order through an invoice message on its thread.
    ///
    /// A pending order transitions to confirmed; an already confirmed
    /// order keeps its status. Either way the invoice message is
    /// appended and published. Stock is never touched here.
    #[tracing::instrument(skip(self, body))]
    pub async fn confirm_via_invoice(
        &self,
        thread_id: ThreadId,
        sender: Party,
        order_id: OrderId,
        body: String,
    ) -> Result<Order> {
        bounded(self.config.op_timeout, async move {
            let mut tx = self.store.begin().await?;

            let thread = tx
                .thread(thread_id)
                .await?
                .ok_or(EngineError::ThreadNotFound(thread_id))?;
            if !thread.includes(sender) {
                return Err(EngineError::NotAParticipant { thread_id, sender });
            }

            let mut order = tx
                .order_for_update(order_id)
                .await?
                .ok_or(EngineError::OrderNotFound(order_id))?;
            if order.thread_id != Some(thread_id) {
                return Err(EngineError::OrderNotInThread {
                    thread_id,
                    order_id,
                });
            }

            if order.status != OrderStatus::Confirmed {
                order.advance(OrderStatus::Confirmed)?;
                tx.update_order(&order).await?;
            }

            let message = Message::new(
                thread_id,
                sender,
                MessageKind::Invoice,
                body,
                Some(order_id),
            )?;
            tx.insert_message(&message).await?;
            tx.commit().await?;

            self.feed.publish(&message);
            metrics::counter!("invoices_sent_total").increment(1);
            tracing::info!(%order_id, %thread_id, "order confirmed via invoice");
            Ok(order)
        })
        .await
    }

    /// Applies a verified payment result to an order.
    ///
    /// Pending orders transition to confirmed and record the
    /// transaction id. Re-confirming with the same transaction id is an
    /// idempotent no-op; a different id against a confirmed order is
    /// refused.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_via_payment(&self, order_id: OrderId, transaction_id: &str) -> Result<Order> {
        bounded(self.config.op_timeout, async move {
            let mut tx = self.store.begin().await?;

            let mut order = tx
                .order_for_update(order_id)
                .await?
                .ok_or(EngineError::OrderNotFound(order_id))?;

            if order.status == OrderStatus::Confirmed {
                match order.transaction_id.as_deref() {
                    Some(existing) if existing == transaction_id => {
                        metrics::counter!("payment_confirmations_total", "outcome" => "repeat")
                            .increment(1);
                        return Ok(order);
                    }
                    Some(existing) => {
                        return Err(EngineError::AlreadyConfirmed {
                            order_id,
                            existing: existing.to_string(),
                        });
                    }
                    None => {
                        // Confirmed earlier via invoice; stamp the
                        // payment reference now.
                        order.transaction_id = Some(transaction_id.to_string());
                    }
                }
            } else {
                order.advance(OrderStatus::Confirmed)?;
                order.transaction_id = Some(transaction_id.to_string());
            }

            tx.update_order(&order).await?;
            tx.commit().await?;

            metrics::counter!("payment_confirmations_total", "outcome" => "confirmed").increment(1);
            tracing::info!(%order_id, "order confirmed via payment");
            Ok(order)
        })
        .await
    }

    /// Looks up one order.
    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        bounded(self.config.op_timeout, async {
            self.store
                .order(order_id)
                .await?
                .ok_or(EngineError::OrderNotFound(order_id))
        })
        .await
    }

    /// Orders placed by a shopkeeper.
    pub async fn orders_for_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<Order>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.orders_for_shopkeeper(shopkeeper_id).await?)
        })
        .await
    }

    /// Orders billed by a vendor.
    pub async fn orders_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.orders_for_vendor(vendor_id).await?)
        })
        .await
    }

    /// Every order in the system.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.all_orders().await?)
        })
        .await
    }

    /// Sum of order totals placed by a shopkeeper.
    pub async fn total_spent_by_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Money> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.total_spent_by_shopkeeper(shopkeeper_id).await?)
        })
        .await
    }

    /// Sum of order totals billed by a vendor.
    pub async fn total_billed_by_vendor(&self, vendor_id: VendorId) -> Result<Money> {
        bounded(self.config.op_timeout, async {
            Ok(self.store.total_billed_by_vendor(vendor_id).await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::Product;
    use market_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: OrderEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let engine = OrderEngine::new(
            store.clone(),
            MessageFeed::new(16),
            EngineConfig::default(),
        );
        Fixture { store, engine }
    }

    async fn seed(fixture: &Fixture, vendor: VendorId, price: Money, stock: u32) -> Product {
        let product = Product::new(vendor, "Canned tomatoes", price, stock);
        fixture.store.insert_product(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_checkout_of_empty_cart_fails() {
        let fixture = fixture();

        let err = fixture
            .engine
            .create_from_cart(ShopkeeperId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyCart));
        assert!(fixture.engine.all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_advance_unknown_order_is_not_found() {
        let fixture = fixture();

        let err = fixture
            .engine
            .advance_status(OrderId::new(), OrderStatus::Confirmed)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_estimation_rejects_empty_lines() {
        let fixture = fixture();
        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();
        let thread = domain::NegotiationThread::new(vendor, shopkeeper);
        {
            let mut tx = fixture.store.begin().await.unwrap();
            tx.insert_thread(&thread).await.unwrap();
            tx.commit().await.unwrap();
        }

        let err = fixture
            .engine
            .create_from_estimation(
                thread.id,
                Party::Vendor(vendor),
                vec![],
                "empty quote".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn test_estimation_rejects_repeated_product() {
        let fixture = fixture();
        let vendor = VendorId::new();
        let product = seed(&fixture, vendor, Money::from_dollars(10), 5).await;
        let thread = domain::NegotiationThread::new(vendor, ShopkeeperId::new());
        {
            let mut tx = fixture.store.begin().await.unwrap();
            tx.insert_thread(&thread).await.unwrap();
            tx.commit().await.unwrap();
        }

        let lines = vec![
            EstimationLine {
                product_id: product.id,
                quantity: 1,
            },
            EstimationLine {
                product_id: product.id,
                quantity: 2,
            },
        ];
        let err = fixture
            .engine
            .create_from_estimation(
                thread.id,
                Party::Vendor(vendor),
                lines,
                "double quote".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // The first line's reservation rolled back with the rest.
        let stored = fixture.store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
        assert!(fixture.engine.all_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_estimation_rejects_outsider_sender() {
        let fixture = fixture();
        let vendor = VendorId::new();
        let product = seed(&fixture, vendor, Money::from_dollars(10), 5).await;
        let thread = domain::NegotiationThread::new(vendor, ShopkeeperId::new());
        {
            let mut tx = fixture.store.begin().await.unwrap();
            tx.insert_thread(&thread).await.unwrap();
            tx.commit().await.unwrap();
        }

        let lines = vec![EstimationLine {
            product_id: product.id,
            quantity: 1,
        }];
        let err = fixture
            .engine
            .create_from_estimation(
                thread.id,
                Party::Shopkeeper(ShopkeeperId::new()),
                lines,
                "quote".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAParticipant { .. }));

        // The refused estimation must not have reserved anything.
        let stored = fixture.store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn test_invoice_requires_matching_thread() {
        let fixture = fixture();
        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();
        let product = seed(&fixture, vendor, Money::from_dollars(10), 5).await;

        let thread = domain::NegotiationThread::new(vendor, shopkeeper);
        let other = domain::NegotiationThread::new(vendor, ShopkeeperId::new());
        {
            let mut tx = fixture.store.begin().await.unwrap();
            tx.insert_thread(&thread).await.unwrap();
            tx.insert_thread(&other).await.unwrap();
            tx.commit().await.unwrap();
        }

        let lines = vec![EstimationLine {
            product_id: product.id,
            quantity: 1,
        }];
        let order = fixture
            .engine
            .create_from_estimation(thread.id, Party::Vendor(vendor), lines, "quote".to_string())
            .await
            .unwrap();

        let err = fixture
            .engine
            .confirm_via_invoice(
                other.id,
                Party::Vendor(vendor),
                order.id,
                "invoice".to_string(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderNotInThread { .. }));
    }

    #[tokio::test]
    async fn test_payment_on_unknown_order_is_not_found() {
        let fixture = fixture();

        let err = fixture
            .engine
            .confirm_via_payment(OrderId::new(), "TXN-1")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::OrderNotFound(_)));
    }
}
