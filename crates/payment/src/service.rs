//! Payment flows over the order engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use common::OrderId;
use domain::{Money, Order};
use engine::OrderEngine;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayOrder, PaymentGateway};
use crate::signature::CallbackSignature;

/// Bound on a single provider call.
const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates provider orders and applies verified callbacks.
///
/// Cloning is cheap; clones share the engine and the gateway.
#[derive(Clone)]
pub struct PaymentService {
    engine: OrderEngine,
    gateway: Arc<dyn PaymentGateway>,
    secret: String,
    gateway_timeout: Duration,
}

impl PaymentService {
    /// Creates a payment service over an engine and a gateway.
    pub fn new(
        engine: OrderEngine,
        gateway: Arc<dyn PaymentGateway>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            gateway,
            secret: secret.into(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    /// Overrides the provider call bound.
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Creates a provider order ahead of a checkout.
    ///
    /// The provider collects against this order; the callback that
    /// follows names it as `provider_order_id`.
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    pub async fn create_gateway_order(&self, amount: Money) -> Result<GatewayOrder> {
        if !amount.is_positive() {
            return Err(PaymentError::InvalidAmount(amount));
        }

        let receipt = format!("txn_{}", Utc::now().timestamp_millis());
        let order = tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.create_order(amount, &receipt),
        )
        .await
        .map_err(|_| PaymentError::GatewayTimeout(self.gateway_timeout))??;

        metrics::counter!("gateway_orders_total").increment(1);
        tracing::info!(
            provider_order_id = %order.provider_order_id,
            "Created provider order"
        );

        Ok(order)
    }

    /// Verifies a payment callback and confirms the order.
    ///
    /// The signature check comes first; an unverifiable callback never
    /// reaches the order engine. Repeats with the same payment ID are
    /// idempotent.
    #[tracing::instrument(skip(self, signature), fields(order_id = %order_id))]
    pub async fn verify(
        &self,
        order_id: OrderId,
        payment_id: &str,
        provider_order_id: &str,
        signature: &str,
    ) -> Result<Order> {
        if let Err(e) =
            CallbackSignature::verify(&self.secret, provider_order_id, payment_id, signature)
        {
            metrics::counter!("payment_signature_rejections_total").increment(1);
            tracing::warn!(provider_order_id, "Rejected payment callback");
            return Err(e);
        }

        let order = self.engine.confirm_via_payment(order_id, payment_id).await?;

        metrics::counter!("payment_verifications_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            transaction_id = ?order.transaction_id,
            "Payment verified"
        );

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use common::{ShopkeeperId, VendorId};
    use domain::{OrderStatus, Product};
    use engine::{CartService, EngineConfig, EngineError, MessageFeed};
    use market_store::{MarketStore, MemoryStore};

    use crate::gateway::MockGateway;

    const SECRET: &str = "test-secret";

    async fn setup() -> (PaymentService, OrderEngine, OrderId) {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::default();
        let feed = MessageFeed::new(config.feed_capacity);
        let engine = OrderEngine::new(store.clone(), feed, config.clone());
        let cart = CartService::new(store.clone(), config);

        let vendor = VendorId::new();
        let shopkeeper = ShopkeeperId::new();
        let product = Product::new(vendor, "Crate of tea", Money::from_dollars(10), 5);
        store.insert_product(&product).await.unwrap();
        cart.add_line(shopkeeper, product.id, 1).await.unwrap();
        let order = engine.create_from_cart(shopkeeper).await.unwrap();

        let service = PaymentService::new(engine.clone(), Arc::new(MockGateway::new()), SECRET);
        (service, engine, order.id)
    }

    #[tokio::test]
    async fn test_verified_callback_confirms_order() {
        let (service, _, order_id) = setup().await;
        let sig = CallbackSignature::sign(SECRET, "PORD-0001", "pay_1").unwrap();

        let order = service
            .verify(order_id, "pay_1", "PORD-0001", &sig)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.transaction_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_bad_signature_never_touches_the_order() {
        let (service, engine, order_id) = setup().await;

        let err = service
            .verify(order_id, "pay_1", "PORD-0001", "deadbeef")
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::SignatureMismatch));

        let order = engine.order(order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.transaction_id, None);
    }

    #[tokio::test]
    async fn test_repeat_callback_is_idempotent() {
        let (service, _, order_id) = setup().await;
        let sig = CallbackSignature::sign(SECRET, "PORD-0001", "pay_1").unwrap();

        service
            .verify(order_id, "pay_1", "PORD-0001", &sig)
            .await
            .unwrap();
        let again = service
            .verify(order_id, "pay_1", "PORD-0001", &sig)
            .await
            .unwrap();
        assert_eq!(again.status, OrderStatus::Confirmed);
        assert_eq!(again.transaction_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_second_payment_id_is_rejected() {
        let (service, _, order_id) = setup().await;
        let first = CallbackSignature::sign(SECRET, "PORD-0001", "pay_1").unwrap();
        let second = CallbackSignature::sign(SECRET, "PORD-0001", "pay_2").unwrap();

        service
            .verify(order_id, "pay_1", "PORD-0001", &first)
            .await
            .unwrap();
        let err = service
            .verify(order_id, "pay_2", "PORD-0001", &second)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Engine(EngineError::AlreadyConfirmed { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_gateway_order() {
        let (service, _, _) = setup().await;

        let order = service
            .create_gateway_order(Money::from_dollars(25))
            .await
            .unwrap();
        assert_eq!(order.provider_order_id, "PORD-0001");
        assert_eq!(order.amount, Money::from_dollars(25));
    }

    #[tokio::test]
    async fn test_create_gateway_order_rejects_non_positive_amount() {
        let (service, _, _) = setup().await;

        let err = service
            .create_gateway_order(Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::InvalidAmount(_)));
    }

    struct HangingGateway;

    #[async_trait]
    impl PaymentGateway for HangingGateway {
        async fn create_order(&self, amount: Money, _receipt: &str) -> Result<GatewayOrder> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(GatewayOrder {
                provider_order_id: "PORD-late".to_string(),
                amount,
            })
        }
    }

    #[tokio::test]
    async fn test_slow_gateway_times_out_as_retryable() {
        let (_, engine, _) = setup().await;
        let service = PaymentService::new(engine, Arc::new(HangingGateway), SECRET)
            .with_gateway_timeout(Duration::from_millis(5));

        let err = service
            .create_gateway_order(Money::from_dollars(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::GatewayTimeout(_)));
        assert!(err.is_retryable());
    }
}
