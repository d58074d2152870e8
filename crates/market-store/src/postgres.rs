use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use common::{MessageId, OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
use domain::{CartLine, Message, Money, NegotiationThread, Order, OrderLine, Party, Product};

use crate::{
    Result, StoreError,
    store::{MarketStore, StoreTx},
};

/// PostgreSQL-backed market store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL market store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and wraps the pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Loads the lines for each order header in one query.
    async fn attach_lines(&self, mut orders: Vec<Order>) -> Result<Vec<Order>> {
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, product_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id: Uuid = row.try_get("order_id")?;
            grouped.entry(order_id).or_default().push(row_to_line(row)?);
        }

        for order in &mut orders {
            order.lines = grouped.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(orders)
    }
}

fn row_to_product(row: PgRow) -> Result<Product> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
        vendor_id: VendorId::from_uuid(row.try_get::<Uuid, _>("vendor_id")?),
        name: row.try_get("name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
        stock: row.try_get::<i64, _>("stock")? as u32,
    })
}

fn row_to_cart_line(row: PgRow) -> Result<CartLine> {
    Ok(CartLine {
        shopkeeper_id: ShopkeeperId::from_uuid(row.try_get::<Uuid, _>("shopkeeper_id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get::<i64, _>("quantity")? as u32,
        added_at: row.try_get("added_at")?,
    })
}

fn row_to_thread(row: PgRow) -> Result<NegotiationThread> {
    Ok(NegotiationThread {
        id: ThreadId::from_uuid(row.try_get::<Uuid, _>("id")?),
        vendor_id: VendorId::from_uuid(row.try_get::<Uuid, _>("vendor_id")?),
        shopkeeper_id: ShopkeeperId::from_uuid(row.try_get::<Uuid, _>("shopkeeper_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let origin: String = row.try_get("origin")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        shopkeeper_id: ShopkeeperId::from_uuid(row.try_get::<Uuid, _>("shopkeeper_id")?),
        vendor_id: VendorId::from_uuid(row.try_get::<Uuid, _>("vendor_id")?),
        lines: Vec::new(),
        total: Money::from_cents(row.try_get("total_cents")?),
        status: status.parse()?,
        origin: origin.parse()?,
        thread_id: row
            .try_get::<Option<Uuid>, _>("thread_id")?
            .map(ThreadId::from_uuid),
        transaction_id: row.try_get("transaction_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_line(row: PgRow) -> Result<OrderLine> {
    Ok(OrderLine {
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get::<i64, _>("quantity")? as u32,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn row_to_message(row: PgRow) -> Result<Message> {
    let role: String = row.try_get("sender_role")?;
    let kind: String = row.try_get("kind")?;

    Ok(Message {
        id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
        thread_id: ThreadId::from_uuid(row.try_get::<Uuid, _>("thread_id")?),
        sender: Party::from_parts(&role, row.try_get::<Uuid, _>("sender_id")?)?,
        kind: kind.parse()?,
        body: row.try_get("body")?,
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
        sent_at: row.try_get("sent_at")?,
    })
}

struct PostgresStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresStoreTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, name, unit_price_cents, stock
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_product(row)?)),
            None => Ok(None),
        }
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, name, unit_price_cents, stock
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_product(row)?)),
            None => Ok(None),
        }
    }

    async fn deduct_stock(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        // The stock guard lives in the WHERE clause so the decrement can
        // never push a row below zero, whatever interleaving happens.
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(quantity as i64)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn restore_stock(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity as i64)
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn cart_lines(&mut self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT shopkeeper_id, product_id, quantity, added_at
            FROM cart_lines
            WHERE shopkeeper_id = $1
            ORDER BY added_at ASC, product_id ASC
            "#,
        )
        .bind(shopkeeper_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart_line).collect()
    }

    async fn upsert_cart_line(&mut self, line: CartLine) -> Result<CartLine> {
        let row = sqlx::query(
            r#"
            INSERT INTO cart_lines (shopkeeper_id, product_id, quantity, added_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (shopkeeper_id, product_id)
            DO UPDATE SET quantity = cart_lines.quantity + EXCLUDED.quantity
            RETURNING shopkeeper_id, product_id, quantity, added_at
            "#,
        )
        .bind(line.shopkeeper_id.as_uuid())
        .bind(line.product_id.as_uuid())
        .bind(line.quantity as i64)
        .bind(line.added_at)
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_cart_line(row)
    }

    async fn clear_cart(&mut self, shopkeeper_id: ShopkeeperId) -> Result<()> {
        sqlx::query("DELETE FROM cart_lines WHERE shopkeeper_id = $1")
            .bind(shopkeeper_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.shopkeeper_id.as_uuid())
        .bind(order.vendor_id.as_uuid())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.origin.as_str())
        .bind(order.thread_id.map(|id| id.as_uuid()))
        .bind(order.transaction_id.as_deref())
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await?;

        for line in &order.lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(line.product_id.as_uuid())
            .bind(line.quantity as i64)
            .bind(line.unit_price.cents())
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn order_for_update(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at
            FROM orders
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        let mut order = match row {
            Some(row) => row_to_order(row)?,
            None => return Ok(None),
        };

        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents
            FROM order_lines
            WHERE order_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        order.lines = rows.into_iter().map(row_to_line).collect::<Result<_>>()?;
        Ok(Some(order))
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        // Lines and totals are immutable after creation; only the status
        // and the payment transaction id ever change.
        sqlx::query("UPDATE orders SET status = $2, transaction_id = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.transaction_id.as_deref())
            .execute(&mut *self.tx)
            .await?;

        Ok(())
    }

    async fn thread(&mut self, id: ThreadId) -> Result<Option<NegotiationThread>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_thread(row)?)),
            None => Ok(None),
        }
    }

    async fn thread_for_pair(
        &mut self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE vendor_id = $1 AND shopkeeper_id = $2
            "#,
        )
        .bind(vendor_id.as_uuid())
        .bind(shopkeeper_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_thread(row)?)),
            None => Ok(None),
        }
    }

    async fn insert_thread(&mut self, thread: &NegotiationThread) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO negotiation_threads (id, vendor_id, shopkeeper_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(thread.id.as_uuid())
        .bind(thread.vendor_id.as_uuid())
        .bind(thread.shopkeeper_id.as_uuid())
        .bind(thread.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            // A duplicate (vendor, shopkeeper) pair trips the unique
            // constraint; callers re-read the winning thread instead.
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("thread_pair_unique")
            {
                return StoreError::Conflict {
                    constraint: "thread_pair_unique".to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn insert_message(&mut self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, thread_id, sender_role, sender_id, kind, body, order_id, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id.as_uuid())
        .bind(message.thread_id.as_uuid())
        .bind(message.sender.role())
        .bind(message.sender.id())
        .bind(message.kind.as_str())
        .bind(&message.body)
        .bind(message.order_id.map(|id| id.as_uuid()))
        .bind(message.sent_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl MarketStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresStoreTx { tx }))
    }

    async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, vendor_id, name, unit_price_cents, stock)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(product.vendor_id.as_uuid())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(product.stock as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, name, unit_price_cents, stock
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_product(row)?)),
            None => Ok(None),
        }
    }

    async fn cart_lines(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<CartLine>> {
        let rows = sqlx::query(
            r#"
            SELECT shopkeeper_id, product_id, quantity, added_at
            FROM cart_lines
            WHERE shopkeeper_id = $1
            ORDER BY added_at ASC, product_id ASC
            "#,
        )
        .bind(shopkeeper_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_cart_line).collect()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let order = match row {
            Some(row) => row_to_order(row)?,
            None => return Ok(None),
        };

        let mut orders = self.attach_lines(vec![order]).await?;
        Ok(orders.pop())
    }

    async fn orders_for_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at
            FROM orders
            WHERE shopkeeper_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(shopkeeper_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let orders = rows.into_iter().map(row_to_order).collect::<Result<_>>()?;
        self.attach_lines(orders).await
    }

    async fn orders_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at
            FROM orders
            WHERE vendor_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let orders = rows.into_iter().map(row_to_order).collect::<Result<_>>()?;
        self.attach_lines(orders).await
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, shopkeeper_id, vendor_id, total_cents, status, origin, thread_id, transaction_id, created_at
            FROM orders
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let orders = rows.into_iter().map(row_to_order).collect::<Result<_>>()?;
        self.attach_lines(orders).await
    }

    async fn thread(&self, id: ThreadId) -> Result<Option<NegotiationThread>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_thread(row)?)),
            None => Ok(None),
        }
    }

    async fn thread_for_pair(
        &self,
        vendor_id: VendorId,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Option<NegotiationThread>> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE vendor_id = $1 AND shopkeeper_id = $2
            "#,
        )
        .bind(vendor_id.as_uuid())
        .bind(shopkeeper_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_thread(row)?)),
            None => Ok(None),
        }
    }

    async fn threads_for_vendor(&self, vendor_id: VendorId) -> Result<Vec<NegotiationThread>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE vendor_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(vendor_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_thread).collect()
    }

    async fn threads_for_shopkeeper(
        &self,
        shopkeeper_id: ShopkeeperId,
    ) -> Result<Vec<NegotiationThread>> {
        let rows = sqlx::query(
            r#"
            SELECT id, vendor_id, shopkeeper_id, created_at
            FROM negotiation_threads
            WHERE shopkeeper_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(shopkeeper_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_thread).collect()
    }

    async fn messages(&self, thread_id: ThreadId) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, thread_id, sender_role, sender_id, kind, body, order_id, sent_at
            FROM messages
            WHERE thread_id = $1
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(thread_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_message).collect()
    }

    async fn total_spent_by_shopkeeper(&self, shopkeeper_id: ShopkeeperId) -> Result<Money> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(total_cents)::BIGINT FROM orders WHERE shopkeeper_id = $1",
        )
        .bind(shopkeeper_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(total.unwrap_or(0)))
    }

    async fn total_billed_by_vendor(&self, vendor_id: VendorId) -> Result<Money> {
        let total: Option<i64> =
            sqlx::query_scalar("SELECT SUM(total_cents)::BIGINT FROM orders WHERE vendor_id = $1")
                .bind(vendor_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(Money::from_cents(total.unwrap_or(0)))
    }
}
