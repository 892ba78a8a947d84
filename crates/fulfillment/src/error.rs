//! Fulfillment error types.

use common::{OrderId, ProductId};
use inventory::InventoryError;
use thiserror::Error;

use crate::OrderStatus;

/// Errors raised by order stores.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// A conditional status write found a different status than expected.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The in-memory store was told to fail.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors returned by [`crate::OrderService`] and [`crate::CatalogService`].
///
/// Everything except `Storage` leaves no partial state change behind.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The request itself is malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The product or order does not exist, is inactive, or is not visible
    /// to the caller.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(
        "Insufficient stock for product {product_id} ({product_name}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// Lost an optimistic-concurrency race. Safe to retry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The order's status does not allow the requested action.
    #[error("Cannot {action} order {order_id} in status {status}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        action: &'static str,
    },

    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FulfillmentError {
    pub fn product_not_found(id: ProductId) -> Self {
        FulfillmentError::NotFound {
            entity: "Product",
            id: id.as_i64(),
        }
    }

    pub fn order_not_found(id: OrderId) -> Self {
        FulfillmentError::NotFound {
            entity: "Order",
            id: id.as_i64(),
        }
    }
}

impl From<InventoryError> for FulfillmentError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::ProductNotFound(id) => FulfillmentError::product_not_found(id),
            InventoryError::InsufficientStock {
                product_id,
                product_name,
                requested,
                available,
            } => FulfillmentError::InsufficientStock {
                product_id,
                product_name,
                requested,
                available,
            },
            e @ (InventoryError::StockConflict { .. } | InventoryError::Conflict { .. }) => {
                FulfillmentError::Conflict(e.to_string())
            }
            e @ (InventoryError::InvalidQuantity { .. } | InventoryError::StockOverflow { .. }) => {
                FulfillmentError::Validation(e.to_string())
            }
            e @ (InventoryError::Database(_) | InventoryError::Migration(_)) => {
                FulfillmentError::Storage(Box::new(e))
            }
        }
    }
}

impl From<OrderStoreError> for FulfillmentError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::NotFound(id) => FulfillmentError::order_not_found(id),
            e @ OrderStoreError::StatusConflict { .. } => FulfillmentError::Conflict(e.to_string()),
            e @ (OrderStoreError::Unavailable(_) | OrderStoreError::Database(_)) => {
                FulfillmentError::Storage(Box::new(e))
            }
        }
    }
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
