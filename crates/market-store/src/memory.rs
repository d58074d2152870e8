use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use common::{OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
use domain::{CartLine, Message, Money, NegotiationThread, Order, Product};

use crate::{
    Result, StoreError,
    store::{MarketStore, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    cart_lines: Vec<CartLine>,
    orders: Vec<Order>,
    threads: Vec<NegotiationThread>,
    messages: Vec<Message>,
}

/// In-memory market store implementation for testing and local runs.
///
/// Units of work hold the single state lock from `begin` to `commit`,
/// so they serialize completely. A transaction mutates a working copy
/// of the state; committing swaps it in, dropping discards it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryStoreTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        // The state lock is already exclusive; a plain read suffices.
        Ok(self.work.products.get(&id).cloned())
    }

    async fn deduct_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        match self.work.products.get_mut(&id) {
            Some(product) if product.stock >= quantity => {
                product.stock -= quantity;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        if let Some(product) = self.work.products.get_mut(&id) {
            product.stock += quantity;
        }
        Ok(())
    }

    async fn cart_lines(&mut self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>> {
        Ok(self
            .work
            .cart_lines
            .iter()
            .filter(|l| l.shopkeeper_id == shopkeeper_id)
            .cloned()
            .collect())
    }

    async fn upsert_cart_line(&mut self, line: CartLine) -> Result<CartLine> {
        if let Some(existing) = self
            .work
            .cart_lines
            .iter_mut()
            .find(|l| l.shopkeeper_id == line.shopkeeper_id && l.product_id == line.product_id)
        {
            existing.quantity += line.quantity;
            return Ok(existing.clone());
        }
        self.work.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn clear_cart(&mut self, shopkeeper_id: ShopkeeperId) -> Result<()> {
        self.work
            .cart_lines
            .retain(|l| l.shopkeeper_id != shopkeeper_id);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.work.orders.push(order.clone());
        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.work.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        if let Some(slot) = self.work.orders.iter_mut().find(|o| o.id == order.id) {
            *slot = order.clone();
        }
        Ok(())
    }

    async fn thread(&mut self, id: ThreadId) -> Result<Option<NegotiationThread>> {
        Ok(self.work.threads.iter().find(|t| t.id == id).cloned())
    }

    async fn thread_for_pair(
        &mut self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>> {
        Ok(self
            .work
            .threads
            .iter()
            .find(|t| t.vendor_id == vendor_id && t.shopkeeper_id == shopkeeper_id)
            .cloned())
    }

    async fn insert_thread(&mut self, thread: &NegotiationThread) -> Result<()> {
        if self
            .work
            .threads
            .iter()
            .any(|t| t.vendor_id == thread.vendor_id && t.shopkeeper_id == thread.shopkeeper_id)
        {
            return Err(StoreError::Conflict {
                constraint: "thread_pair_unique".to_string(),
            });
        }
        self.work.threads.push(thread.clone());
        Ok(())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        self.work.messages.push(message.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryStoreTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryStoreTx { guard, work }))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.lock().await;
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn cart_lines(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>> {
        Ok(self
            .state
            .lock()
            .await
            .cart_lines
            .iter()
            .filter(|l| l.shopkeeper_id == shopkeeper_id)
            .cloned()
            .collect())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn orders_for_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| o.shopkeeper_id == shopkeeper_id)
            .cloned()
            .collect())
    }

    async fn orders_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| o.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        Ok(self.state.lock().await.orders.clone())
    }

    async fn thread(&self, id: ThreadId) -> Result<Option<NegotiationThread>> {
        Ok(self
            .state
            .lock()
            .await
            .threads
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn thread_for_pair(
        &self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>> {
        Ok(self
            .state
            .lock()
            .await
            .threads
            .iter()
            .find(|t| t.vendor_id == vendor_id && t.shopkeeper_id == shopkeeper_id)
            .cloned())
    }

    async fn threads_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<NegotiationThread>> {
        Ok(self
            .state
            .lock()
            .await
            .threads
            .iter()
            .filter(|t| t.vendor_id == vendor_id)
            .cloned()
            .collect())
    }

    async fn threads_for_shopkeeper(
        &self,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Vec<NegotiationThread>> {
        Ok(self
            .state
            .lock()
            .await
            .threads
            .iter()
            .filter(|t| t.shopkeeper_id == shopkeeper_id)
            .cloned()
            .collect())
    }

    async fn messages(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        Ok(self
            .state
            .lock()
            .await
            .messages
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect())
    }

    async fn total_spent_by_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Money> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| o.shopkeeper_id == shopkeeper_id)
            .fold(Money::zero(), |acc, o| acc + o.total))
    }

    async fn total_billed_by_vendor(&self, vendor_id: VendorId) -> Result<Money> {
        Ok(self
            .state
            .lock()
            .await
            .orders
            .iter()
            .filter(|o| o.vendor_id == vendor_id)
            .fold(Money::zero(), |acc, o| acc + o.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{OrderLine, Party};

    async fn seed_product(store: &MemoryStore, price: Money, stock: u32) -> Product {
        let product = Product::new(VendorId::new(), "Crate of goods", price, stock);
        store.insert_product(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn commit_makes_changes_visible() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 8).await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.deduct_stock(product.id, 3).await.unwrap());
        tx.commit().await.unwrap();

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 5);
    }

    #[tokio::test]
    async fn dropped_tx_rolls_back() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 8).await;

        {
            let mut tx = store.begin().await.unwrap();
            assert!(tx.deduct_stock(product.id, 3).await.unwrap());
            // No commit.
        }

        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 8);
    }

    #[tokio::test]
    async fn deduct_stock_guards_against_overdraw() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 2).await;

        let mut tx = store.begin().await.unwrap();
        assert!(!tx.deduct_stock(product.id, 3).await.unwrap());
        let unchanged = tx.product(product.id).await.unwrap().unwrap();
        assert_eq!(unchanged.stock, 2);

        assert!(!tx.deduct_stock(ProductId::new(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_cart_line_increments_quantity() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 8).await;
        let shopkeeper = ShopkeeperId::new();

        let mut tx = store.begin().await.unwrap();
        let first = tx
            .upsert_cart_line(CartLine::new(shopkeeper, product.id, 2))
            .await
            .unwrap();
        assert_eq!(first.quantity, 2);

        let second = tx
            .upsert_cart_line(CartLine::new(shopkeeper, product.id, 3))
            .await
            .unwrap();
        assert_eq!(second.quantity, 5);
        assert_eq!(second.added_at, first.added_at);
        tx.commit().await.unwrap();

        let lines = store.cart_lines(shopkeeper).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 5);
    }

    #[tokio::test]
    async fn clear_cart_removes_only_that_shopkeeper() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 8).await;
        let keeper_a = ShopkeeperId::new();
        let keeper_b = ShopkeeperId::new();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_cart_line(CartLine::new(keeper_a, product.id, 1))
            .await
            .unwrap();
        tx.upsert_cart_line(CartLine::new(keeper_b, product.id, 4))
            .await
            .unwrap();
        tx.clear_cart(keeper_a).await.unwrap();
        tx.commit().await.unwrap();

        assert!(store.cart_lines(keeper_a).await.unwrap().is_empty());
        assert_eq!(store.cart_lines(keeper_b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn order_update_persists_after_commit() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(25), 8).await;
        let order = Order::direct(
            ShopkeeperId::new(),
            product.vendor_id,
            vec![OrderLine::new(product.id, 2, product.unit_price)],
        )
        .unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut loaded = tx.order_for_update(order.id).await.unwrap().unwrap();
        loaded.advance(domain::OrderStatus::Confirmed).unwrap();
        loaded.transaction_id = Some("TXN-1".to_string());
        tx.update_order(&loaded).await.unwrap();
        tx.commit().await.unwrap();

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, domain::OrderStatus::Confirmed);
        assert_eq!(stored.transaction_id.as_deref(), Some("TXN-1"));
        assert_eq!(stored.lines, order.lines);
    }

    #[tokio::test]
    async fn thread_pair_conflict() {
        let store = MemoryStore::new();
        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_thread(&NegotiationThread::new(vendor, shopkeeper))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .insert_thread(&NegotiationThread::new(vendor, shopkeeper))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        drop(tx);

        // A different pair is fine.
        let mut tx = store.begin().await.unwrap();
        tx.insert_thread(&NegotiationThread::new(vendor, ShopkeeperId::new()))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn messages_keep_append_order() {
        let store = MemoryStore::new();
        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();
        let thread = NegotiationThread::new(vendor, shopkeeper);

        let mut tx = store.begin().await.unwrap();
        tx.insert_thread(&thread).await.unwrap();
        for body in ["first", "second", "third"] {
            let message = Message::text(thread.id, Party::Vendor(vendor), body).unwrap();
            tx.insert_message(&message).await.unwrap();
        }
        tx.commit().await.unwrap();

        let messages = store.messages(thread.id).await.unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn totals_sum_order_amounts() {
        let store = MemoryStore::new();
        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();
        let product = Product::new(vendor, "Bulk tea", Money::from_dollars(20), 50);
        store.insert_product(&product).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        for quantity in [1u32, 3] {
            let order = Order::direct(
                shopkeeper,
                vendor,
                vec![OrderLine::new(product.id, quantity, product.unit_price)],
            )
            .unwrap();
            tx.insert_order(&order).await.unwrap();
        }
        tx.commit().await.unwrap();

        let spent = store.total_spent_by_shopkeeper(shopkeeper).await.unwrap();
        assert_eq!(spent, Money::from_dollars(80));
        let billed = store.total_billed_by_vendor(vendor).await.unwrap();
        assert_eq!(billed, Money::from_dollars(80));
        assert_eq!(
            store
                .total_spent_by_shopkeeper(ShopkeeperId::new())
                .await
                .unwrap(),
            Money::zero()
        );
    }

    #[tokio::test]
    async fn sequential_units_of_work_serialize() {
        let store = MemoryStore::new();
        let product = seed_product(&store, Money::from_dollars(10), 5).await;

        // Five workers race to take 2 units each; only two can win.
        let mut successes = 0;
        for _ in 0..5 {
            let mut tx = store.begin().await.unwrap();
            if tx.deduct_stock(product.id, 2).await.unwrap() {
                tx.commit().await.unwrap();
                successes += 1;
            }
        }

        assert_eq!(successes, 2);
        let stored = store.product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.stock, 1);
    }
}
