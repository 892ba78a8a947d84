//! HTTP API server with observability for the order-fulfillment core.
//!
//! Provides REST endpoints for placing, cancelling and advancing orders and
//! for cached catalog reads, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use fulfillment::{CatalogService, FulfillmentMetrics, InMemoryOrderStore, OrderService, OrderStore};
use inventory::{InMemoryProductStore, InventoryStore, ProductStore};
use messaging::{EventPublisher, InMemoryBroker};
use metrics_exporter_prometheus::PrometheusHandle;
use read_cache::{CacheLayer, InMemoryCacheBackend};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<P, O>(state: Arc<AppState<P, O>>, metrics_handle: PrometheusHandle) -> Router
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<P, O>))
        .route("/orders", get(routes::orders::list::<P, O>))
        .route("/orders/{id}", get(routes::orders::get::<P, O>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<P, O>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<P, O>))
        .route("/products", get(routes::products::list::<P, O>))
        .route("/products", post(routes::products::upsert::<P, O>))
        .route("/products/{id}", get(routes::products::get::<P, O>))
        .route("/products/{id}/stock", put(routes::products::set_stock::<P, O>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the fulfillment services over the given stores, cache and publisher.
pub fn create_state<P, O>(
    config: &Config,
    products: P,
    orders: O,
    cache: CacheLayer,
    publisher: EventPublisher,
) -> Arc<AppState<P, O>>
where
    P: ProductStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
{
    let inventory = InventoryStore::new(products).with_max_attempts(config.reserve_max_attempts);
    let cache = cache.with_default_ttl(config.cache_ttl);
    let publisher = publisher.with_timeout(config.publish_timeout);
    let metrics = FulfillmentMetrics::new();

    Arc::new(AppState {
        orders: OrderService::new(
            inventory.clone(),
            orders,
            cache.clone(),
            publisher.clone(),
            metrics.clone(),
        ),
        catalog: CatalogService::new(inventory, cache, publisher, metrics),
    })
}

/// Creates an all-in-memory application state.
///
/// Returns the product store and broker too, so callers can seed the catalog
/// and inspect published events.
pub async fn create_default_state(
    config: &Config,
) -> messaging::Result<(
    Arc<AppState<InMemoryProductStore, InMemoryOrderStore>>,
    InMemoryProductStore,
    InMemoryBroker,
)> {
    let products = InMemoryProductStore::new();
    let broker = InMemoryBroker::with_default_topology().await?;
    broker.set_max_queue_depth(config.broker_queue_depth).await;
    let state = create_state(
        config,
        products.clone(),
        InMemoryOrderStore::new(),
        CacheLayer::new(InMemoryCacheBackend::new()),
        EventPublisher::new(broker.clone()),
    );
    Ok((state, products, broker))
}

/// Builds the cache configured by `REDIS_URL`, falling back to memory.
pub async fn create_cache(config: &Config) -> CacheLayer {
    #[cfg(feature = "redis")]
    if let Some(url) = config.redis_url.as_deref() {
        match read_cache::RedisCacheBackend::connect(url).await {
            Ok(backend) => {
                tracing::info!("using redis cache");
                return CacheLayer::new(backend);
            }
            Err(e) => tracing::warn!(error = %e, "redis unavailable, using in-memory cache"),
        }
    }

    #[cfg(not(feature = "redis"))]
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL set but built without the redis feature, using in-memory cache");
    }

    CacheLayer::new(InMemoryCacheBackend::new())
}

/// Registers descriptions for the metrics the services emit.
pub fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders placed");
    metrics::describe_counter!("orders_cancelled_total", "Orders cancelled by their owner");
    metrics::describe_counter!("order_status_updates_total", "Forward status moves");
    metrics::describe_counter!("product_stock_updates_total", "Admin stock writes");
    metrics::describe_counter!(
        "reservation_failures_total",
        "Rejected reservations by reason"
    );
    metrics::describe_counter!(
        "order_persistence_failures_total",
        "Orders whose reservation was released after a failed write"
    );
    metrics::describe_counter!(
        "events_publish_failures_total",
        "Events not acknowledged by the broker"
    );
    metrics::describe_histogram!(
        "order_create_duration_seconds",
        metrics::Unit::Seconds,
        "Time to place an order"
    );
}
