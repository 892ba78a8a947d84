//! Orders and their status state machine.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use inventory::StockRequest;
use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │
///    └──► Cancelled
/// ```
///
/// Forward moves may skip steps. Only `Pending` orders can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Stock reserved, awaiting fulfillment.
    #[default]
    Pending,

    /// Being picked and packed.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled by the customer, stock returned (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Position along the fulfillment path; `None` for `Cancelled`.
    fn rank(&self) -> Option<u8> {
        match self {
            OrderStatus::Pending => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::Cancelled => None,
        }
    }

    /// Returns true if the order can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if fulfillment may move the order to `next`.
    ///
    /// Cancellation is not a fulfillment move and is always rejected here.
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// A requested order line, before stock is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

impl From<OrderLine> for StockRequest {
    fn from(line: OrderLine) -> Self {
        StockRequest::new(line.product_id, line.quantity)
    }
}

/// Input to [`crate::OrderService::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderLine>,
}

/// A line of a placed order. Fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Product price when the order was placed.
    pub unit_price: Money,
}

impl OrderItem {
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Line total, or `None` if it does not fit in [`Money`].
    pub fn checked_total_price(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// An order ready to be persisted; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl OrderDraft {
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Order total, or `None` if any line or the sum does not fit in [`Money`].
    pub fn checked_total(&self) -> Option<Money> {
        self.items
            .iter()
            .try_fold(Money::zero(), |total, item| {
                total.checked_add(item.checked_total_price()?)
            })
    }

    /// Attaches the store-assigned id, producing a `Pending` order.
    pub fn into_order(self, id: OrderId) -> Order {
        let total_amount = self.total_amount();
        Order {
            id,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            total_amount,
            shipping_address: self.shipping_address,
            notes: self.notes,
            items: self.items,
            created_at: self.created_at,
            shipped_at: None,
            delivered_at: None,
        }
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Always the sum of the item totals.
    pub total_amount: Money,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Stock requests that return this order's items.
    pub fn stock_requests(&self) -> Vec<StockRequest> {
        self.items
            .iter()
            .map(|item| StockRequest::new(item.product_id, item.quantity))
            .collect()
    }

    pub fn product_ids(&self) -> impl Iterator<Item = ProductId> + '_ {
        self.items.iter().map(|item| item.product_id)
    }
}

/// A conditional status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: OrderStatus,
    /// Set when present, left untouched otherwise.
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// A move to `status`, stamping the ship/delivery date it implies.
    pub fn to(status: OrderStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            shipped_at: (status == OrderStatus::Shipped).then_some(at),
            delivered_at: (status == OrderStatus::Delivered).then_some(at),
        }
    }
}
