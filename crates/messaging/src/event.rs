//! Domain events published to the broker.

use chrono::{DateTime, Utc};
use common::{EventId, OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The closed set of events this system publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    OrderCreated,
    OrderCancelled,
    ProductStockUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::OrderCreated,
        EventKind::OrderCancelled,
        EventKind::ProductStockUpdated,
    ];

    /// Type name carried in the `event-type` header.
    pub const fn type_name(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "OrderCreatedEvent",
            EventKind::OrderCancelled => "OrderCancelledEvent",
            EventKind::ProductStockUpdated => "ProductStockUpdatedEvent",
        }
    }

    /// Lower-cased type name, used as the routing key for unrouted events.
    pub const fn fallback_routing_key(&self) -> &'static str {
        match self {
            EventKind::OrderCreated => "ordercreatedevent",
            EventKind::OrderCancelled => "ordercancelledevent",
            EventKind::ProductStockUpdated => "productstockupdatedevent",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Line of an [`OrderCreated`] event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedItem {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
}

/// An order was placed and its stock reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<OrderCreatedItem>,
}

/// Line of an [`OrderCancelled`] event: stock handed back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasedItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A pending order was cancelled and its stock released.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<ReleasedItem>,
}

/// A product's stock was set administratively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductStockUpdated {
    pub product_id: ProductId,
    pub previous_stock: u32,
    pub new_stock: u32,
    pub reason: String,
}

/// Event body, one variant per [`EventKind`].
///
/// Serializes as the bare payload object; the kind travels in headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    OrderCreated(OrderCreated),
    OrderCancelled(OrderCancelled),
    ProductStockUpdated(ProductStockUpdated),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::OrderCreated(_) => EventKind::OrderCreated,
            EventPayload::OrderCancelled(_) => EventKind::OrderCancelled,
            EventPayload::ProductStockUpdated(_) => EventKind::ProductStockUpdated,
        }
    }
}

impl From<OrderCreated> for EventPayload {
    fn from(event: OrderCreated) -> Self {
        EventPayload::OrderCreated(event)
    }
}

impl From<OrderCancelled> for EventPayload {
    fn from(event: OrderCancelled) -> Self {
        EventPayload::OrderCancelled(event)
    }
}

impl From<ProductStockUpdated> for EventPayload {
    fn from(event: ProductStockUpdated) -> Self {
        EventPayload::ProductStockUpdated(event)
    }
}

/// A payload with its identity and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    id: EventId,
    occurred_at: DateTime<Utc>,
    payload: EventPayload,
}

impl DomainEvent {
    /// Wraps a payload, stamping it with a fresh id and the current time.
    pub fn new(payload: impl Into<EventPayload>) -> Self {
        Self {
            id: EventId::new(),
            occurred_at: Utc::now(),
            payload: payload.into(),
        }
    }

    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Encodes the message body: the camelCase payload plus `occurredAt`.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        let mut body = serde_json::to_value(&self.payload)?;
        if let serde_json::Value::Object(fields) = &mut body {
            fields.insert(
                "occurredAt".to_owned(),
                serde_json::to_value(self.occurred_at)?,
            );
        }
        serde_json::to_vec(&body)
    }
}
