//! Order fulfillment: placing and cancelling orders against shared stock.
//!
//! [`OrderService`] reserves stock through [`inventory::InventoryStore`],
//! stores the order, invalidates the cached product views and publishes the
//! resulting event. [`CatalogService`] serves product reads through the cache
//! and applies admin stock writes.

pub mod catalog;
pub mod error;
pub mod order;
pub mod postgres;
pub mod service;
pub mod store;
pub mod telemetry;

pub use catalog::CatalogService;
pub use error::{FulfillmentError, OrderStoreError, Result};
pub use order::{NewOrder, Order, OrderDraft, OrderItem, OrderLine, OrderStatus, StatusChange};
pub use postgres::PostgresOrderStore;
pub use service::OrderService;
pub use store::{InMemoryOrderStore, OrderStore, StoreResult};
pub use telemetry::FulfillmentMetrics;
