//! Shared types for the order-fulfillment core.

mod money;
mod types;

pub use money::Money;
pub use types::{EventId, OrderId, ProductId, UserId};
