//! Payment provider trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;

use crate::error::{PaymentError, Result};

/// A provider-side order, created before the buyer is shown a checkout.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    /// The order ID assigned by the provider.
    pub provider_order_id: String,
    /// The amount the provider will collect.
    pub amount: Money,
}

/// Trait for the opaque external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a provider order for `amount`, tagged with `receipt`.
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<GatewayOrder>;
}

#[derive(Debug, Default)]
struct MockGatewayState {
    orders: HashMap<String, (Money, String)>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct MockGateway {
    state: Arc<RwLock<MockGatewayState>>,
}

impl MockGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail on the next create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of provider orders created.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Returns true if a provider order exists with the given ID.
    pub fn has_order(&self, provider_order_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .orders
            .contains_key(provider_order_id)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(&self, amount: Money, receipt: &str) -> Result<GatewayOrder> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(PaymentError::Gateway("Provider declined".to_string()));
        }

        state.next_id += 1;
        let provider_order_id = format!("PORD-{:04}", state.next_id);
        state
            .orders
            .insert(provider_order_id.clone(), (amount, receipt.to_string()));

        Ok(GatewayOrder {
            provider_order_id,
            amount,
        })
    }
}
