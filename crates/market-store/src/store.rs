use async_trait::async_trait;

use common::{OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
use domain::{CartLine, Message, Money, NegotiationThread, Order, Product};

use crate::Result;

/// One unit of work against the store.
///
/// Everything performed through a transaction becomes visible atomically
/// when `commit` succeeds. Dropping a transaction without committing
/// rolls back every change made through it, including stock deductions.
///
/// The `*_for_update` reads lock the row for the lifetime of the
/// transaction, so concurrent units of work touching the same product
/// or order serialize instead of racing.
#[async_trait]
pub trait StoreTx: Send {
    /// Reads a product without locking it.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Reads a product and locks its row until the transaction ends.
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Decrements stock by `quantity` if at least that much remains.
    ///
    /// Returns false when the guard fails; the row is left untouched.
    async fn deduct_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool>;

    /// Adds `quantity` back to the product's stock.
    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Returns the shopkeeper's cart lines in the order they were added.
    async fn cart_lines(&mut self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>>;

    /// Inserts the line, or increases the quantity of the existing line
    /// for the same (shopkeeper, product) pair.
    ///
    /// Returns the resulting line.
    async fn upsert_cart_line(&mut self, line: CartLine) -> Result<CartLine>;

    /// Removes every line of the shopkeeper's cart.
    async fn clear_cart(&mut self, shopkeeper_id: ShopkeeperId) -> Result<()>;

    /// Inserts a new order with its lines.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Reads an order and locks its row until the transaction ends.
    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Persists the mutable fields of an order (status, transaction id).
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    /// Reads a thread by ID.
    async fn thread(&mut self, id: ThreadId) -> Result<Option<NegotiationThread>>;

    /// Reads the thread for a (vendor, shopkeeper) pair, if one exists.
    async fn thread_for_pair(
        &mut self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>>;

    /// Inserts a new thread.
    ///
    /// Fails with `StoreError::Conflict` if a thread already exists for
    /// the pair.
    async fn insert_thread(&mut self, thread: &NegotiationThread) -> Result<()>;

    /// Appends a message to its thread.
    async fn insert_message(&mut self, message: &Message) -> Result<()>;

    /// Commits the unit of work.
    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Core trait for market store implementations.
///
/// The read side serves queries directly; every mutation goes through a
/// [`StoreTx`] obtained from [`begin`](MarketStore::begin). All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Starts a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Inserts a catalog product. Used when syncing the catalog in.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Reads a product by ID.
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Returns the shopkeeper's cart lines in the order they were added.
    async fn cart_lines(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>>;

    /// Reads an order with its lines.
    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Returns a shopkeeper's orders, oldest first.
    async fn orders_for_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<Order>>;

    /// Returns a vendor's orders, oldest first.
    async fn orders_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>>;

    /// Returns every order, oldest first.
    async fn all_orders(&self) -> Result<Vec<Order>>;

    /// Reads a thread by ID.
    async fn thread(&self, id: ThreadId) -> Result<Option<NegotiationThread>>;

    /// Reads the thread for a (vendor, shopkeeper) pair, if one exists.
    async fn thread_for_pair(
        &self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>>;

    /// Returns the threads a vendor participates in.
    async fn threads_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<NegotiationThread>>;

    /// Returns the threads a shopkeeper participates in.
    async fn threads_for_shopkeeper(
        &self,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Vec<NegotiationThread>>;

    /// Returns a thread's messages in append order.
    async fn messages(&self, thread_id: ThreadId) -> Result<Vec<Message>>;

    /// Sums `total` over the shopkeeper's orders.
    async fn total_spent_by_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Money>;

    /// Sums `total` over the vendor's orders.
    async fn total_billed_by_vendor(&self, vendor_id: VendorId) -> Result<Money>;
}
