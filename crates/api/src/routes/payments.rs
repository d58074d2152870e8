//! Payment gateway endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::OrderId;
use domain::Money;
use payment::GatewayOrder;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::orders::OrderResponse;
use crate::routes::parse_uuid;

// -- Request types --

#[derive(Deserialize)]
pub struct GatewayOrderRequest {
    pub amount_cents: i64,
}

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub order_id: String,
    pub payment_id: String,
    pub provider_order_id: String,
    pub signature: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct GatewayOrderResponse {
    pub provider_order_id: String,
    pub amount_cents: i64,
}

impl From<GatewayOrder> for GatewayOrderResponse {
    fn from(order: GatewayOrder) -> Self {
        Self {
            provider_order_id: order.provider_order_id,
            amount_cents: order.amount.cents(),
        }
    }
}

// -- Handlers --

/// POST /payments/order — open a provider-side order for the amount.
#[tracing::instrument(skip(state, req))]
pub async fn create_gateway_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GatewayOrderRequest>,
) -> Result<(StatusCode, Json<GatewayOrderResponse>), ApiError> {
    let order = state
        .payments
        .create_gateway_order(Money::from_cents(req.amount_cents))
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// POST /payments/verify — verify the provider callback and confirm
/// the order it pays for.
#[tracing::instrument(skip(state, req))]
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(parse_uuid(&req.order_id)?);

    let order = state
        .payments
        .verify(order_id, &req.payment_id, &req.provider_order_id, &req.signature)
        .await?;

    Ok(Json(order.into()))
}
