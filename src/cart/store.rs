use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::cart::CartLine;
use crate::errors::ServiceError;

/// Client-side key for a line: product id plus variant
pub fn line_uid(product_id: &str, size: Option<&str>) -> String {
    match size.map(str::trim).filter(|s| !s.is_empty()) {
        Some(size) => format!("{}_{}", product_id, size),
        None => product_id.to_string(),
    }
}

/// A cart line as the client holds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCartLine {
    #[serde(rename = "_uid")]
    pub uid: String,
    pub product_id: String,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    pub price: Decimal,
    /// Stock ceiling when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_qty: Option<u32>,
}

impl ClientCartLine {
    pub fn new(
        product_id: impl Into<String>,
        size: Option<String>,
        quantity: u32,
        price: Decimal,
        available_qty: Option<u32>,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            uid: line_uid(&product_id, size.as_deref()),
            product_id,
            quantity,
            size,
            price,
            available_qty,
        }
    }

    pub fn to_server_line(&self) -> CartLine {
        CartLine {
            product_id: self.product_id.clone(),
            quantity: self.quantity,
            size: self.size.clone(),
            price: self.price,
        }
    }
}

impl From<CartLine> for ClientCartLine {
    fn from(line: CartLine) -> Self {
        ClientCartLine::new(line.product_id, line.size, line.quantity, line.price, None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Only {available} of {product_id} left in stock")]
    InsufficientStock {
        product_id: String,
        requested: u32,
        available: u32,
    },
    #[error("Quantity must be at least 1")]
    InvalidQuantity,
    #[error("No cart line {0}")]
    UnknownLine(String),
}

impl From<CartError> for ServiceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::InsufficientStock { .. } => ServiceError::InsufficientStock(err.to_string()),
            CartError::InvalidQuantity => ServiceError::ValidationError(err.to_string()),
            CartError::UnknownLine(_) => ServiceError::NotFound(err.to_string()),
        }
    }
}

/// Ordered cart lines keyed by uid.
///
/// Every line satisfies `1 <= quantity` and, when `available_qty` is known,
/// `quantity <= available_qty`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartStore {
    lines: Vec<ClientCartLine>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: Vec<ClientCartLine>) -> Self {
        Self { lines }
    }

    pub fn lines(&self) -> &[ClientCartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<&ClientCartLine> {
        self.lines.iter().find(|l| l.uid == uid)
    }

    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.price * Decimal::from(l.quantity))
            .sum()
    }

    /// Adds `line.quantity` units, merging into an existing line with the same uid.
    /// The incoming `available_qty`, when known, replaces the line's ceiling.
    /// Rejected adds leave the store unchanged.
    pub fn add(&mut self, line: ClientCartLine) -> Result<&ClientCartLine, CartError> {
        if line.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        match self.lines.iter().position(|l| l.uid == line.uid) {
            Some(index) => {
                let existing = &self.lines[index];
                let ceiling = line.available_qty.or(existing.available_qty);
                let requested = existing.quantity.saturating_add(line.quantity);
                check_ceiling(&line.product_id, requested, ceiling)?;

                let existing = &mut self.lines[index];
                existing.quantity = requested;
                existing.available_qty = ceiling;
                existing.price = line.price;
                Ok(&self.lines[index])
            }
            None => {
                check_ceiling(&line.product_id, line.quantity, line.available_qty)?;
                self.lines.push(line);
                Ok(&self.lines[self.lines.len() - 1])
            }
        }
    }

    /// Sets a line's quantity; `0` removes the line
    pub fn set_quantity(&mut self, uid: &str, quantity: u32) -> Result<(), CartError> {
        let index = self
            .lines
            .iter()
            .position(|l| l.uid == uid)
            .ok_or_else(|| CartError::UnknownLine(uid.to_string()))?;

        if quantity == 0 {
            self.lines.remove(index);
            return Ok(());
        }

        let line = &self.lines[index];
        check_ceiling(&line.product_id, quantity, line.available_qty)?;
        self.lines[index].quantity = quantity;
        Ok(())
    }

    pub fn remove(&mut self, uid: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.uid != uid);
        self.lines.len() != before
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn to_server_lines(&self) -> Vec<CartLine> {
        self.lines.iter().map(ClientCartLine::to_server_line).collect()
    }
}

fn min_known(a: Option<u32>, b: Option<u32>) -> Option<u32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn check_ceiling(product_id: &str, requested: u32, ceiling: Option<u32>) -> Result<(), CartError> {
    match ceiling {
        Some(available) if requested > available => Err(CartError::InsufficientStock {
            product_id: product_id.to_string(),
            requested,
            available,
        }),
        _ => Ok(()),
    }
}

/// Merges the server cart into the local one.
///
/// Lines are matched by uid; a line on both sides keeps the larger quantity,
/// a line on one side is kept as is. Local order comes first.
pub fn merge_lines(local: &[ClientCartLine], server: &[ClientCartLine]) -> Vec<ClientCartLine> {
    let mut merged: Vec<ClientCartLine> = local.to_vec();
    for remote in server {
        match merged.iter_mut().find(|l| l.uid == remote.uid) {
            Some(existing) => {
                existing.quantity = existing.quantity.max(remote.quantity);
                existing.available_qty = min_known(existing.available_qty, remote.available_qty);
            }
            None => merged.push(remote.clone()),
        }
    }
    merged
}
