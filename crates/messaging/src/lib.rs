//! Domain event publishing.
//!
//! Events are a closed set ([`EventKind`]) routed to AMQP-style exchanges by
//! a [`RoutingTable`]. [`EventPublisher`] is best-effort: it bounds every
//! broker call with a timeout and never lets a broker failure reach the
//! caller. [`InMemoryBroker`] reproduces direct, fanout, topic and headers
//! exchange semantics for tests and single-process runs.

pub mod broker;
pub mod error;
pub mod event;
pub mod publisher;
pub mod routing;

pub use broker::{
    Ack, Broker, DEFAULT_MAX_QUEUE_DEPTH, Delivery, HeaderMatch, Headers, InMemoryBroker,
    OutboundMessage, topic_matches,
};
pub use error::{PublishError, Result};
pub use event::{
    DomainEvent, EventKind, EventPayload, OrderCancelled, OrderCreated, OrderCreatedItem,
    ProductStockUpdated, ReleasedItem,
};
pub use publisher::{DEFAULT_PUBLISH_TIMEOUT, DEFAULT_SOURCE, EventPublisher, PublishOutcome};
pub use routing::{DEFAULT_EXCHANGE, Destination, ExchangeKind, RoutingTable};
