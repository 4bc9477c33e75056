// Domain services: each holds its own handles and is cheap to clone

pub mod carrier;
pub mod carts;
pub mod catalog;
pub mod order_status;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod shipments;
pub mod signature;

use uuid::Uuid;

use crate::errors::ServiceError;

/// Parses a path or body identifier, rejecting malformed ids with 400
pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ServiceError::ValidationError(format!("invalid {} '{}'", what, raw)))
}
