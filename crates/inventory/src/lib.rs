//! Product stock system of record.
//!
//! [`ProductStore`] is the persistence seam (in-memory or PostgreSQL) and
//! exposes a single conditional write, [`ProductStore::update_stock`], guarded
//! by a per-product [`StockVersion`]. [`InventoryStore`] builds all-or-nothing
//! reservations on top of it using optimistic concurrency.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod product;
pub mod reservation;
pub mod store;

pub use common::ProductId;
pub use error::{InventoryError, Result};
pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;
pub use product::{Product, StockRequest, StockVersion};
pub use reservation::{InventoryStore, Reservation, ReservedLine, StockChange};
pub use store::ProductStore;
