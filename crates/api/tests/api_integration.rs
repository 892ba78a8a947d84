//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use common::{Money, ProductId};
use inventory::{InMemoryProductStore, Product, ProductStore};
use messaging::InMemoryBroker;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    products: InMemoryProductStore,
    broker: InMemoryBroker,
}

async fn setup() -> TestApp {
    let metrics_handle = get_metrics_handle();
    let (state, products, broker) = api::create_default_state(&Config::default())
        .await
        .unwrap();

    products
        .upsert(Product::new(ProductId::new(1), "Ring", Money::from_units(100), 10))
        .await
        .unwrap();
    products
        .upsert(Product::new(ProductId::new(2), "Necklace", Money::from_units(500), 10))
        .await
        .unwrap();
    products
        .upsert(Product::new(ProductId::new(3), "Brooch", Money::from_units(50), 2))
        .await
        .unwrap();

    TestApp {
        app: api::create_app(state, metrics_handle),
        products,
        broker,
    }
}

fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn order_body(items: Value) -> Value {
    json!({
        "shipping_address": "221B Baker Street",
        "items": items
    })
}

async fn place_order(app: &axum::Router, user: i64, items: Value) -> Value {
    let response = app
        .clone()
        .oneshot(request("POST", "/orders", Some(user), Some(order_body(items))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn test_health_check() {
    let TestApp { app, .. } = setup().await;

    let response = app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_order() {
    let TestApp {
        app,
        products,
        broker,
    } = setup().await;

    let json = place_order(
        &app,
        7,
        json!([
            { "product_id": 1, "quantity": 3 },
            { "product_id": 2, "quantity": 1 }
        ]),
    )
    .await;

    assert_eq!(json["status"], "Pending");
    assert_eq!(json["user_id"], 7);
    assert_eq!(json["total_cents"], 80_000);
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(products.stock_of(ProductId::new(1)).await, Some(7));
    assert_eq!(products.stock_of(ProductId::new(2)).await, Some(9));
    assert_eq!(broker.messages("orders.created.queue").await.len(), 1);
}

#[tokio::test]
async fn test_insufficient_stock_is_bad_request() {
    let TestApp {
        app,
        products,
        broker,
    } = setup().await;

    let response = app
        .oneshot(request(
            "POST",
            "/orders",
            Some(7),
            Some(order_body(json!([{ "product_id": 3, "quantity": 5 }]))),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("Insufficient stock"));
    assert_eq!(products.stock_of(ProductId::new(3)).await, Some(2));
    assert_eq!(broker.total_messages().await, 0);
}

#[tokio::test]
async fn test_empty_order_is_bad_request() {
    let TestApp { app, .. } = setup().await;

    let response = app
        .oneshot(request(
            "POST",
            "/orders",
            Some(7),
            Some(order_body(json!([]))),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_user_header_is_bad_request() {
    let TestApp { app, .. } = setup().await;

    let response = app
        .oneshot(request(
            "POST",
            "/orders",
            None,
            Some(order_body(json!([{ "product_id": 1, "quantity": 1 }]))),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_get_order_is_scoped_to_owner() {
    let TestApp { app, .. } = setup().await;
    let created = place_order(&app, 7, json!([{ "product_id": 1, "quantity": 1 }])).await;
    let uri = format!("/orders/{}", created["id"]);

    let own = app
        .clone()
        .oneshot(request("GET", &uri, Some(7), None))
        .await
        .unwrap();
    assert_eq!(own.status(), StatusCode::OK);
    assert_eq!(json_body(own).await["id"], created["id"]);

    let other = app
        .oneshot(request("GET", &uri, Some(8), None))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_order_invalid_id() {
    let TestApp { app, .. } = setup().await;

    let response = app
        .oneshot(request("GET", "/orders/not-a-number", Some(7), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_orders_newest_first() {
    let TestApp { app, .. } = setup().await;
    let first = place_order(&app, 7, json!([{ "product_id": 1, "quantity": 1 }])).await;
    let second = place_order(&app, 7, json!([{ "product_id": 2, "quantity": 1 }])).await;
    place_order(&app, 8, json!([{ "product_id": 2, "quantity": 1 }])).await;

    let response = app
        .oneshot(request("GET", "/orders", Some(7), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    let ids: Vec<&Value> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|o| &o["id"])
        .collect();
    assert_eq!(ids, vec![&second["id"], &first["id"]]);
}

#[tokio::test]
async fn test_cancel_order_restores_stock() {
    let TestApp {
        app,
        products,
        broker,
    } = setup().await;
    let created = place_order(&app, 7, json!([{ "product_id": 1, "quantity": 4 }])).await;
    let uri = format!("/orders/{}/cancel", created["id"]);

    let response = app
        .clone()
        .oneshot(request("POST", &uri, Some(7), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "Cancelled");
    assert_eq!(products.stock_of(ProductId::new(1)).await, Some(10));
    assert_eq!(broker.messages("orders.cancelled.queue").await.len(), 1);

    let again = app
        .oneshot(request("POST", &uri, Some(7), None))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(products.stock_of(ProductId::new(1)).await, Some(10));
}

#[tokio::test]
async fn test_status_updates() {
    let TestApp { app, .. } = setup().await;
    let created = place_order(&app, 7, json!([{ "product_id": 1, "quantity": 1 }])).await;
    let uri = format!("/orders/{}/status", created["id"]);

    let shipped = app
        .clone()
        .oneshot(request("PUT", &uri, None, Some(json!({ "status": "shipped" }))))
        .await
        .unwrap();
    assert_eq!(shipped.status(), StatusCode::OK);
    let json = json_body(shipped).await;
    assert_eq!(json["status"], "Shipped");
    assert!(json["shipped_at"].is_string());

    let backwards = app
        .clone()
        .oneshot(request("PUT", &uri, None, Some(json!({ "status": "Processing" }))))
        .await
        .unwrap();
    assert_eq!(backwards.status(), StatusCode::CONFLICT);

    let unknown = app
        .oneshot(request("PUT", &uri, None, Some(json!({ "status": "Lost" }))))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_products_read_and_stock_update() {
    let TestApp { app, broker, .. } = setup().await;

    let listed = app
        .clone()
        .oneshot(request("GET", "/products", None, None))
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::OK);
    assert_eq!(json_body(listed).await.as_array().unwrap().len(), 3);

    let updated = app
        .clone()
        .oneshot(request(
            "PUT",
            "/products/3/stock",
            None,
            Some(json!({ "quantity": 20, "reason": "restock" })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let change = json_body(updated).await;
    assert_eq!(change["previous_stock"], 2);
    assert_eq!(change["new_stock"], 20);
    assert_eq!(broker.messages("products.inventory.queue").await.len(), 1);

    let product = app
        .clone()
        .oneshot(request("GET", "/products/3", None, None))
        .await
        .unwrap();
    assert_eq!(product.status(), StatusCode::OK);
    assert_eq!(json_body(product).await["stock_quantity"], 20);

    let missing = app
        .oneshot(request("GET", "/products/99", None, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_product() {
    let TestApp { app, products, .. } = setup().await;

    let response = app
        .oneshot(request(
            "POST",
            "/products",
            None,
            Some(json!({
                "id": 10,
                "name": "Anklet",
                "price_cents": 2_500,
                "stock_quantity": 4,
                "material": "Gold"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = json_body(response).await;
    assert_eq!(json["name"], "Anklet");
    assert_eq!(json["material"], "Gold");
    assert_eq!(products.stock_of(ProductId::new(10)).await, Some(4));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let TestApp { app, .. } = setup().await;
    place_order(&app, 7, json!([{ "product_id": 1, "quantity": 1 }])).await;

    let response = app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_created_total"));
}
