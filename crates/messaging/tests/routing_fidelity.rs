//! End-to-end routing: publisher, routing table and in-memory broker.

use std::str::FromStr;

use common::{OrderId, ProductId, UserId};
use messaging::{
    DEFAULT_EXCHANGE, DomainEvent, EventKind, EventPublisher, InMemoryBroker, OrderCancelled,
    OrderCreated, OrderCreatedItem, ProductStockUpdated, PublishOutcome, ReleasedItem,
    RoutingTable,
};
use rust_decimal::Decimal;

const ALL_QUEUES: [&str; 8] = [
    "orders.created.queue",
    "orders.cancelled.queue",
    "products.inventory.queue",
    "products.notifications.queue",
    "notifications.email.queue",
    "notifications.sms.queue",
    "logs.error.queue",
    "logs.info.queue",
];

async fn queue_sizes(broker: &InMemoryBroker) -> Vec<(&'static str, usize)> {
    let mut sizes = Vec::new();
    for queue in ALL_QUEUES {
        let len = broker.messages(queue).await.len();
        if len > 0 {
            sizes.push((queue, len));
        }
    }
    sizes
}

fn order_created() -> DomainEvent {
    DomainEvent::new(OrderCreated {
        order_id: OrderId::new(1),
        user_id: UserId::new(7),
        total_amount: Decimal::from_str("800").unwrap(),
        items: vec![OrderCreatedItem {
            product_id: ProductId::new(1),
            quantity: 8,
            unit_price: Decimal::from_str("100").unwrap(),
        }],
    })
}

fn order_cancelled() -> DomainEvent {
    DomainEvent::new(OrderCancelled {
        order_id: OrderId::new(1),
        user_id: UserId::new(7),
        total_amount: Decimal::from_str("800").unwrap(),
        items: vec![ReleasedItem {
            product_id: ProductId::new(1),
            quantity: 8,
        }],
    })
}

fn stock_updated() -> DomainEvent {
    DomainEvent::new(ProductStockUpdated {
        product_id: ProductId::new(1),
        previous_stock: 0,
        new_stock: 12,
        reason: "restock".into(),
    })
}

#[tokio::test]
async fn order_created_reaches_only_its_direct_queue() {
    let broker = InMemoryBroker::with_default_topology().await.unwrap();
    let publisher = EventPublisher::new(broker.clone());

    publisher.publish(order_created()).await.unwrap();

    assert_eq!(queue_sizes(&broker).await, vec![("orders.created.queue", 1)]);
    let body = broker.messages("orders.created.queue").await[0].json().unwrap();
    assert_eq!(body["orderId"], 1);
    assert_eq!(body["items"][0]["quantity"], 8);
}

#[tokio::test]
async fn order_cancelled_reaches_only_its_direct_queue() {
    let broker = InMemoryBroker::with_default_topology().await.unwrap();
    let publisher = EventPublisher::new(broker.clone());

    publisher.publish(order_cancelled()).await.unwrap();

    assert_eq!(queue_sizes(&broker).await, vec![("orders.cancelled.queue", 1)]);
}

#[tokio::test]
async fn stock_update_fans_out_to_every_product_queue() {
    let broker = InMemoryBroker::with_default_topology().await.unwrap();
    let publisher = EventPublisher::new(broker.clone());

    publisher.publish(stock_updated()).await.unwrap();

    assert_eq!(
        queue_sizes(&broker).await,
        vec![
            ("products.inventory.queue", 1),
            ("products.notifications.queue", 1),
        ]
    );
}

#[tokio::test]
async fn unrouted_event_goes_to_default_exchange() {
    let broker = InMemoryBroker::with_default_topology().await.unwrap();
    broker.declare_queue("fallback.queue").await;
    broker
        .declare_exchange(DEFAULT_EXCHANGE, messaging::ExchangeKind::Direct)
        .await
        .unwrap();
    broker
        .bind("fallback.queue", DEFAULT_EXCHANGE, "productstockupdatedevent")
        .await
        .unwrap();
    let publisher = EventPublisher::new(broker.clone())
        .with_routes(RoutingTable::baseline().without_route(EventKind::ProductStockUpdated));

    let outcome = publisher.publish(stock_updated()).await.unwrap();

    assert!(outcome.is_delivered());
    assert_eq!(broker.messages("fallback.queue").await.len(), 1);
    assert!(queue_sizes(&broker).await.is_empty());
}

#[tokio::test]
async fn misrouted_kind_is_reported_not_raised() {
    let broker = InMemoryBroker::with_default_topology().await.unwrap();
    let publisher = EventPublisher::new(broker.clone()).with_routes(
        RoutingTable::baseline().with_route(
            EventKind::OrderCreated,
            messaging::Destination::new("products.exchange", messaging::ExchangeKind::Direct, "x"),
        ),
    );

    let outcome = publisher.publish(order_created()).await.unwrap();

    assert_eq!(outcome, PublishOutcome::Failed);
    assert_eq!(broker.total_messages().await, 0);
}
