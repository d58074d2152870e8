//! Route handlers grouped by resource.

pub mod cart;
pub mod feed;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod threads;

use domain::Party;
use uuid::Uuid;

use crate::error::ApiError;

pub(crate) fn parse_uuid(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

pub(crate) fn parse_party(role: &str, id: &str) -> Result<Party, ApiError> {
    let uuid = parse_uuid(id)?;
    Party::from_parts(role, uuid).map_err(|e| ApiError::BadRequest(e.to_string()))
}
