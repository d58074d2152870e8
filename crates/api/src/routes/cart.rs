//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ProductId, ShopkeeperId};
use domain::CartLine;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::parse_uuid;

#[derive(Deserialize)]
pub struct AddLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct CartLineResponse {
    pub shopkeeper_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub added_at: String,
}

impl From<CartLine> for CartLineResponse {
    fn from(line: CartLine) -> Self {
        Self {
            shopkeeper_id: line.shopkeeper_id.to_string(),
            product_id: line.product_id.to_string(),
            quantity: line.quantity,
            added_at: line.added_at.to_rfc3339(),
        }
    }
}

/// POST /cart/:shopkeeper_id/lines — add a line, merging with an
/// existing line for the same product.
#[tracing::instrument(skip(state, req))]
pub async fn add_line(
    State(state): State<Arc<AppState>>,
    Path(shopkeeper_id): Path<String>,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartLineResponse>), ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&shopkeeper_id)?);
    let product_id = ProductId::from_uuid(parse_uuid(&req.product_id)?);

    let line = state
        .cart
        .add_line(shopkeeper_id, product_id, req.quantity)
        .await?;

    Ok((StatusCode::CREATED, Json(line.into())))
}

/// GET /cart/:shopkeeper_id — current snapshot of the cart.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(shopkeeper_id): Path<String>,
) -> Result<Json<Vec<CartLineResponse>>, ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&shopkeeper_id)?);

    let lines = state.cart.lines(shopkeeper_id).await?;

    Ok(Json(lines.into_iter().map(Into::into).collect()))
}

/// DELETE /cart/:shopkeeper_id — drop every line of the cart.
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    Path(shopkeeper_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let shopkeeper_id = ShopkeeperId::from_uuid(parse_uuid(&shopkeeper_id)?);

    state.cart.clear(shopkeeper_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
