//! Event-to-exchange routing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::EventKind;

/// Exchange used for events with no explicit route.
pub const DEFAULT_EXCHANGE: &str = "default.exchange";

/// AMQP exchange types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Exact routing-key match.
    Direct,
    /// Every bound queue, routing key ignored.
    Fanout,
    /// Dotted routing-key patterns with `*` and `#`.
    Topic,
    /// Match on message headers instead of the routing key.
    Headers,
}

impl ExchangeKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an event is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Destination {
    pub exchange: &'static str,
    pub kind: ExchangeKind,
    pub routing_key: &'static str,
}

impl Destination {
    pub const fn new(exchange: &'static str, kind: ExchangeKind, routing_key: &'static str) -> Self {
        Self {
            exchange,
            kind,
            routing_key,
        }
    }

    /// Destination for an event kind that has no route.
    pub const fn fallback(kind: EventKind) -> Self {
        Self::new(DEFAULT_EXCHANGE, ExchangeKind::Direct, kind.fallback_routing_key())
    }
}

const BASELINE: [(EventKind, Destination); 3] = [
    (
        EventKind::OrderCreated,
        Destination::new("orders.exchange", ExchangeKind::Direct, "orders.created"),
    ),
    (
        EventKind::OrderCancelled,
        Destination::new("orders.exchange", ExchangeKind::Direct, "orders.cancelled"),
    ),
    (
        EventKind::ProductStockUpdated,
        Destination::new("products.exchange", ExchangeKind::Fanout, ""),
    ),
];

/// Maps event kinds to destinations.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<EventKind, Destination>,
}

impl RoutingTable {
    /// A table with no routes; every event goes to [`DEFAULT_EXCHANGE`].
    pub fn empty() -> Self {
        Self::default()
    }

    /// The production routes.
    pub fn baseline() -> Self {
        Self {
            routes: BASELINE.into_iter().collect(),
        }
    }

    pub fn with_route(mut self, kind: EventKind, destination: Destination) -> Self {
        self.routes.insert(kind, destination);
        self
    }

    pub fn without_route(mut self, kind: EventKind) -> Self {
        self.routes.remove(&kind);
        self
    }

    /// Resolves a kind, falling back to [`Destination::fallback`].
    pub fn resolve(&self, kind: EventKind) -> Destination {
        self.routes
            .get(&kind)
            .copied()
            .unwrap_or_else(|| Destination::fallback(kind))
    }
}
