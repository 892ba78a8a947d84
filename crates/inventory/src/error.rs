use thiserror::Error;

use crate::{ProductId, StockVersion};

/// Errors that can occur when reading or mutating product stock.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product does not exist or is no longer active.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Not enough stock to satisfy a reservation.
    #[error(
        "Insufficient stock for product {product_id} ({product_name}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// A conditional stock write observed a different version than expected.
    ///
    /// Raised by [`crate::ProductStore::update_stock`]; reservation logic
    /// retries on it.
    #[error("Stock version conflict for product {product_id}: expected version {expected}")]
    StockConflict {
        product_id: ProductId,
        expected: StockVersion,
    },

    /// Optimistic retries were exhausted under contention. Retryable by the caller.
    #[error("Stock for product {product_id} is contended: gave up after {attempts} attempts")]
    Conflict { product_id: ProductId, attempts: u32 },

    /// A request carried a quantity of zero.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// A stock adjustment would leave the representable range.
    #[error("Stock overflow for product {product_id}")]
    StockOverflow { product_id: ProductId },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
