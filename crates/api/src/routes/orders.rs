//! Checkout, order lifecycle and dashboard endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ShopkeeperId, VendorId};
use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_uuid;

// -- Request types --

#[derive(Deserialize)]
pub struct AdvanceStatusRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub shopkeeper_id: String,
    pub vendor_id: String,
    pub lines: Vec<OrderLineResponse>,
    pub total_cents: i64,
    pub status: String,
    pub origin: String,
    pub thread_id: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

#[derive(Serialize)]
pub struct TotalResponse {
    pub total_cents: i64,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            shopkeeper_id: order.shopkeeper_id.to_string(),
            vendor_id: order.vendor_id.to_string(),
            lines: order
                .lines
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                })
                .collect(),
            total_cents: order.total.cents(),
            status: order.status.to_string(),
            origin: order.origin.to_string(),
            thread_id: order.thread_id.map(|id| id.to_string()),
            transaction_id: order.transaction_id,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /checkout/:shopkeeper_id — convert the cart into an order.
#[tracing::instrument(skip(state))]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    Path(shopkeeper_id): Path<String>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&shopkeeper_id)?);

    let order = state.engine.create_from_cart(shopkeeper_id).await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// GET /orders — list every order.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.engine.all_orders().await?;

    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/:id — load one order with its lines.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(parse_uuid(&id)?);

    let order = state.engine.order(order_id).await?;

    Ok(Json(order.into()))
}

/// GET /orders/shopkeeper/:id — orders placed by a shopkeeper.
#[tracing::instrument(skip(state))]
pub async fn list_for_shopkeeper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&id)?);

    let orders = state.engine.orders_for_shopkeeper(shopkeeper_id).await?;

    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /orders/vendor/:id — orders billed to a vendor.
#[tracing::instrument(skip(state))]
pub async fn list_for_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let vendor_id = VendorId::from_uuid(parse_uuid(&id)?);

    let orders = state.engine.orders_for_vendor(vendor_id).await?;

    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// POST /orders/:id/status — advance the order lifecycle.
#[tracing::instrument(skip(state, req))]
pub async fn advance_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AdvanceStatusRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(parse_uuid(&id)?);
    let status: OrderStatus = req
        .status
        .parse()
        .map_err(|e: domain::UnknownTag| ApiError::BadRequest(e.to_string()))?;

    let order = state.engine.advance_status(order_id, status).await?;

    Ok(Json(order.into()))
}

/// GET /dashboard/shopkeeper/:id/total — sum of the shopkeeper's orders.
#[tracing::instrument(skip(state))]
pub async fn shopkeeper_total(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TotalResponse>, ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&id)?);

    let total = state.engine.total_spent_by_shopkeeper(shopkeeper_id).await?;

    Ok(Json(TotalResponse {
        total_cents: total.cents(),
    }))
}

/// GET /dashboard/vendor/:id/total — sum of the vendor's orders.
#[tracing::instrument(skip(state))]
pub async fn vendor_total(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TotalResponse>, ApiError> {
    let vendor_id = VendorId::from_uuid(parse_uuid(&id)?);

    let total = state.engine.total_billed_by_vendor(vendor_id).await?;

    Ok(Json(TotalResponse {
        total_cents: total.cents(),
    }))
}
