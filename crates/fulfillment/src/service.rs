//! Order placement and cancellation.

use std::time::Instant;

use chrono::Utc;
use common::{OrderId, ProductId, UserId};
use inventory::{InventoryStore, ProductStore, Reservation, StockRequest};
use messaging::{
    DomainEvent, EventPublisher, OrderCancelled, OrderCreated, OrderCreatedItem, PublishOutcome,
    ReleasedItem,
};
use read_cache::{ALL_PRODUCTS_KEY, CacheLayer, product_key};

use crate::{
    FulfillmentError, FulfillmentMetrics, NewOrder, Order, OrderDraft, OrderItem, OrderStatus,
    OrderStore, Result, StatusChange,
};

/// Drives orders through reservation, persistence, cache invalidation and
/// event publication.
///
/// Stock writes and order writes are the source of truth. Cache invalidation
/// and publishing happen after them and never undo them.
#[derive(Clone)]
pub struct OrderService<P, O> {
    inventory: InventoryStore<P>,
    orders: O,
    cache: CacheLayer,
    publisher: EventPublisher,
    metrics: FulfillmentMetrics,
}

impl<P, O> OrderService<P, O>
where
    P: ProductStore,
    O: OrderStore,
{
    pub fn new(
        inventory: InventoryStore<P>,
        orders: O,
        cache: CacheLayer,
        publisher: EventPublisher,
        metrics: FulfillmentMetrics,
    ) -> Self {
        Self {
            inventory,
            orders,
            cache,
            publisher,
            metrics,
        }
    }

    pub fn inventory(&self) -> &InventoryStore<P> {
        &self.inventory
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Places an order.
    ///
    /// Either every line's stock is reserved and the order is stored as
    /// `Pending`, or nothing changes.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.items.len()))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order> {
        let started = Instant::now();
        validate_new_order(&request)?;

        let requests: Vec<StockRequest> = request.items.iter().copied().map(Into::into).collect();
        let reservation = match self.inventory.try_reserve(&requests).await {
            Ok(reservation) => reservation,
            Err(e) => {
                let e = FulfillmentError::from(e);
                self.metrics.reservation_failed(&e);
                tracing::info!(error = %e, "order rejected at reservation");
                return Err(e);
            }
        };

        let draft = OrderDraft {
            user_id: request.user_id,
            shipping_address: request.shipping_address.trim().to_owned(),
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            items: items_from(&reservation),
            created_at: Utc::now(),
        };

        if draft.checked_total().is_none() {
            tracing::warn!("order total out of range, releasing reservation");
            self.release_reservation(&reservation).await;
            return Err(FulfillmentError::Validation(
                "order total exceeds the supported amount".into(),
            ));
        }

        let order = match self.orders.create(draft).await {
            Ok(order) => order,
            Err(e) => {
                self.metrics.persistence_failed();
                tracing::error!(error = %e, "order persistence failed, releasing reservation");
                self.release_reservation(&reservation).await;
                return Err(e.into());
            }
        };

        invalidate_products(&self.cache, order.product_ids()).await;
        publish(&self.publisher, &self.metrics, order_created(&order)).await;

        self.metrics.order_created(started.elapsed());
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");
        Ok(order)
    }

    /// Cancels a `Pending` order owned by `user_id` and returns its stock.
    ///
    /// The status write is conditional on the order still being `Pending`,
    /// so concurrent cancellations release stock once. If the release fails
    /// the order goes back to `Pending`, so the cancellation can be retried.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let order = self.owned_order(order_id, user_id).await?;

        if !order.status.can_cancel() {
            return Err(FulfillmentError::InvalidState {
                order_id,
                status: order.status,
                action: "cancel",
            });
        }

        let cancelled = self
            .orders
            .update_status(
                order_id,
                OrderStatus::Pending,
                StatusChange::to(OrderStatus::Cancelled, Utc::now()),
            )
            .await?;

        if let Err(e) = self.inventory.release(&cancelled.stock_requests()).await {
            tracing::error!(%order_id, error = %e, "stock release failed, returning order to pending");
            let revert = self
                .orders
                .update_status(
                    order_id,
                    OrderStatus::Cancelled,
                    StatusChange::to(OrderStatus::Pending, Utc::now()),
                )
                .await;
            if let Err(revert) = revert {
                tracing::error!(%order_id, error = %revert, "failed to return order to pending");
            }
            return Err(e.into());
        }

        invalidate_products(&self.cache, cancelled.product_ids()).await;
        publish(&self.publisher, &self.metrics, order_cancelled(&cancelled)).await;

        self.metrics.order_cancelled();
        tracing::info!(%order_id, "order cancelled");
        Ok(cancelled)
    }

    /// Moves an order forward along the fulfillment path.
    ///
    /// Steps may be skipped. Cancellation goes through
    /// [`OrderService::cancel_order`] so stock is returned.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, new_status: OrderStatus) -> Result<Order> {
        if new_status == OrderStatus::Cancelled {
            return Err(FulfillmentError::Validation(
                "orders are cancelled through the cancel operation".into(),
            ));
        }

        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::order_not_found(order_id))?;

        if !order.status.can_advance_to(new_status) {
            return Err(FulfillmentError::InvalidState {
                order_id,
                status: order.status,
                action: "advance",
            });
        }

        let updated = self
            .orders
            .update_status(order_id, order.status, StatusChange::to(new_status, Utc::now()))
            .await?;

        self.metrics.status_updated();
        tracing::info!(%order_id, from = %order.status, to = %new_status, "order status updated");
        Ok(updated)
    }

    /// Loads an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.owned_order(order_id, user_id).await
    }

    /// A user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id).await?)
    }

    /// Returns reserved stock on a failed placement. Failures are logged.
    async fn release_reservation(&self, reservation: &Reservation) {
        if let Err(e) = self.inventory.release(&reservation.to_requests()).await {
            tracing::error!(error = %e, "failed to release reservation");
        }
    }

    /// Another user's order reads as missing.
    async fn owned_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| FulfillmentError::order_not_found(order_id))
    }
}

fn validate_new_order(request: &NewOrder) -> Result<()> {
    if request.items.is_empty() {
        return Err(FulfillmentError::Validation(
            "an order needs at least one item".into(),
        ));
    }
    if let Some(line) = request.items.iter().find(|line| line.quantity == 0) {
        return Err(FulfillmentError::Validation(format!(
            "quantity for product {} must be at least 1",
            line.product_id
        )));
    }
    if request.shipping_address.trim().is_empty() {
        return Err(FulfillmentError::Validation(
            "shipping address is required".into(),
        ));
    }
    Ok(())
}

fn items_from(reservation: &Reservation) -> Vec<OrderItem> {
    reservation
        .lines()
        .iter()
        .map(|line| OrderItem {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
        })
        .collect()
}

fn order_created(order: &Order) -> DomainEvent {
    DomainEvent::new(OrderCreated {
        order_id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount.to_decimal(),
        items: order
            .items
            .iter()
            .map(|item| OrderCreatedItem {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price.to_decimal(),
            })
            .collect(),
    })
    .with_occurred_at(order.created_at)
}

fn order_cancelled(order: &Order) -> DomainEvent {
    DomainEvent::new(OrderCancelled {
        order_id: order.id,
        user_id: order.user_id,
        total_amount: order.total_amount.to_decimal(),
        items: order
            .items
            .iter()
            .map(|item| ReleasedItem {
                product_id: item.product_id,
                quantity: item.quantity,
            })
            .collect(),
    })
}

/// Drops the cached view of each product and the product list.
pub(crate) async fn invalidate_products(
    cache: &CacheLayer,
    product_ids: impl IntoIterator<Item = ProductId>,
) {
    for product_id in product_ids {
        cache.invalidate(&product_key(product_id)).await;
    }
    cache.invalidate(ALL_PRODUCTS_KEY).await;
}

/// Publishes `event`; failures are counted and logged, never returned.
pub(crate) async fn publish(
    publisher: &EventPublisher,
    metrics: &FulfillmentMetrics,
    event: DomainEvent,
) {
    let kind = event.kind();
    match publisher.publish(event).await {
        Ok(PublishOutcome::Delivered(_)) => {}
        Ok(outcome) => {
            metrics.publish_failed();
            tracing::warn!(%kind, ?outcome, "event not delivered");
        }
        Err(e) => {
            metrics.publish_failed();
            tracing::error!(%kind, error = %e, "event could not be encoded");
        }
    }
}
