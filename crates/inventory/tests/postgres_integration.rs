//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container and need a Docker daemon.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::Money;
use inventory::{
    InventoryError, InventoryStore, PostgresProductStore, Product, ProductId, ProductStore,
    StockRequest, StockVersion,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_products_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/002_create_orders_tables.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresProductStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, products")
        .execute(&pool)
        .await
        .unwrap();

    PostgresProductStore::new(pool)
}

fn bracelet(id: i64, stock: u32) -> Product {
    Product::new(ProductId::new(id), "Bracelet", Money::from_cents(4_999), stock)
        .with_material("Silver")
}

#[tokio::test]
#[ignore = "requires docker"]
async fn upsert_and_load_product() {
    let store = get_test_store().await;

    let stored = store.upsert(bracelet(1, 5)).await.unwrap();
    assert_eq!(stored.version, StockVersion::first());

    let loaded = store.get_by_id(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Bracelet");
    assert_eq!(loaded.price, Money::from_cents(4_999));
    assert_eq!(loaded.stock_quantity, 5);
    assert_eq!(loaded.material, "Silver");
}

#[tokio::test]
#[ignore = "requires docker"]
async fn stale_version_is_rejected() {
    let store = get_test_store().await;
    store.upsert(bracelet(1, 5)).await.unwrap();

    store
        .update_stock(ProductId::new(1), 4, StockVersion::first())
        .await
        .unwrap();
    let result = store
        .update_stock(ProductId::new(1), 3, StockVersion::first())
        .await;

    assert!(matches!(result, Err(InventoryError::StockConflict { .. })));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn update_stock_on_missing_row_is_not_found() {
    let store = get_test_store().await;
    let result = store
        .update_stock(ProductId::new(42), 3, StockVersion::first())
        .await;
    assert!(matches!(result, Err(InventoryError::ProductNotFound(_))));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn list_active_excludes_inactive() {
    let store = get_test_store().await;
    store.upsert(bracelet(1, 5)).await.unwrap();
    store
        .upsert(Product::new(ProductId::new(2), "Anklet", Money::from_units(20), 1).deactivated())
        .await
        .unwrap();

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, ProductId::new(1));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_reservations_do_not_oversell() {
    let store = get_test_store().await;
    store.upsert(bracelet(1, 5)).await.unwrap();
    let inv = InventoryStore::new(store).with_max_attempts(30);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let inv = inv.clone();
        handles.push(tokio::spawn(async move {
            inv.try_reserve(&[StockRequest::new(ProductId::new(1), 1)])
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }

    let remaining = inv
        .product(ProductId::new(1))
        .await
        .unwrap()
        .unwrap()
        .stock_quantity;
    assert!(successes <= 5);
    assert_eq!(remaining, 5 - successes);
}
