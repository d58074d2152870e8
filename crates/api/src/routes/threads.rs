//! Negotiation thread endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId, ShopkeeperId, ThreadId, VendorId};
use domain::{Message, NegotiationThread};
use engine::EstimationLine;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::{parse_party, parse_uuid};
use crate::routes::orders::OrderResponse;

// -- Request types --

#[derive(Deserialize)]
pub struct OpenThreadRequest {
    pub vendor_id: String,
    pub shopkeeper_id: String,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub sender_role: String,
    pub sender_id: String,
    pub body: String,
}

#[derive(Deserialize)]
pub struct EstimationRequest {
    pub sender_role: String,
    pub sender_id: String,
    pub body: String,
    pub lines: Vec<EstimationLineRequest>,
}

#[derive(Deserialize)]
pub struct EstimationLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct InvoiceRequest {
    pub sender_role: String,
    pub sender_id: String,
    pub order_id: String,
    pub body: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct ThreadResponse {
    pub id: String,
    pub vendor_id: String,
    pub shopkeeper_id: String,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub thread_id: String,
    pub sender_role: String,
    pub sender_id: String,
    pub kind: String,
    pub body: String,
    pub order_id: Option<String>,
    pub sent_at: String,
}

impl From<NegotiationThread> for ThreadResponse {
    fn from(thread: NegotiationThread) -> Self {
        Self {
            id: thread.id.to_string(),
            vendor_id: thread.vendor_id.to_string(),
            shopkeeper_id: thread.shopkeeper_id.to_string(),
            created_at: thread.created_at.to_rfc3339(),
        }
    }
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            thread_id: message.thread_id.to_string(),
            sender_role: message.sender.role().to_string(),
            sender_id: message.sender.id().to_string(),
            kind: message.kind.to_string(),
            body: message.body,
            order_id: message.order_id.map(|id| id.to_string()),
            sent_at: message.sent_at.to_rfc3339(),
        }
    }
}

// -- Handlers --

/// POST /threads — open the thread for a pair, or return the existing
/// one.
#[tracing::instrument(skip(state, req))]
pub async fn open(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OpenThreadRequest>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let vendor_id = VendorId::from_uuid(parse_uuid(&req.vendor_id)?);
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&req.shopkeeper_id)?);

    let thread = state.chat.open_thread(vendor_id, shopkeeper_id).await?;

    Ok(Json(thread.into()))
}

/// GET /threads/vendor/:id — threads the vendor participates in.
#[tracing::instrument(skip(state))]
pub async fn list_for_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ThreadResponse>>, ApiError> {
    let vendor_id = VendorId::from_uuid(parse_uuid(&id)?);

    let threads = state.chat.threads_for_vendor(vendor_id).await?;

    Ok(Json(threads.into_iter().map(Into::into).collect()))
}

/// GET /threads/shopkeeper/:id — threads the shopkeeper participates in.
#[tracing::instrument(skip(state))]
pub async fn list_for_shopkeeper(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ThreadResponse>>, ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&id)?);

    let threads = state.chat.threads_for_shopkeeper(shopkeeper_id).await?;

    Ok(Json(threads.into_iter().map(Into::into).collect()))
}

/// GET /threads/:id/messages — the thread's messages in append order.
#[tracing::instrument(skip(state))]
pub async fn messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let thread_id = ThreadId::from_uuid(parse_uuid(&id)?);

    let messages = state.chat.messages(thread_id).await?;

    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// POST /threads/:id/messages — append a text message.
#[tracing::instrument(skip(state, req))]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let thread_id = ThreadId::from_uuid(parse_uuid(&id)?);
    let sender = parse_party(&req.sender_role, &req.sender_id)?;

    let message = state.chat.send_text(thread_id, sender, req.body).await?;

    Ok((StatusCode::CREATED, Json(message.into())))
}

/// POST /threads/:id/estimation — send an estimation, creating a
/// pending order from its lines.
#[tracing::instrument(skip(state, req))]
pub async fn send_estimation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EstimationRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let thread_id = ThreadId::from_uuid(parse_uuid(&id)?);
    let sender = parse_party(&req.sender_role, &req.sender_id)?;

    let mut lines = Vec::with_capacity(req.lines.len());
    for line in &req.lines {
        lines.push(EstimationLine {
            product_id: ProductId::from_uuid(parse_uuid(&line.product_id)?),
            quantity: line.quantity,
        });
    }

    let order = state
        .engine
        .create_from_estimation(thread_id, sender, lines, req.body)
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// POST /threads/:id/invoice — send an invoice, confirming the order.
#[tracing::instrument(skip(state, req))]
pub async fn send_invoice(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<InvoiceRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let thread_id = ThreadId::from_uuid(parse_uuid(&id)?);
    let sender = parse_party(&req.sender_role, &req.sender_id)?;
    let order_id = OrderId::from_uuid(parse_uuid(&req.order_id)?);

    let order = state
        .engine
        .confirm_via_invoice(thread_id, sender, order_id, req.body)
        .await?;

    Ok(Json(order.into()))
}
