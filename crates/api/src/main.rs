//! API server entry point.

use api::config::{Config, LogFormat};
use fulfillment::{InMemoryOrderStore, PostgresOrderStore};
use inventory::{InMemoryProductStore, PostgresProductStore};
use messaging::{EventPublisher, InMemoryBroker};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve(app: axum::Router, config: &Config) {
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder before any handles are taken
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    api::describe_metrics();

    // 3. Broker and cache
    let broker = InMemoryBroker::with_default_topology()
        .await
        .expect("failed to declare broker topology");
    broker.set_max_queue_depth(config.broker_queue_depth).await;
    let publisher = EventPublisher::new(broker);
    let cache = api::create_cache(&config).await;

    // 4. Stores, application state and server
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(16)
                .connect(url)
                .await
                .expect("failed to connect to database");

            let products = PostgresProductStore::new(pool.clone());
            products
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using postgres stores");

            let state = api::create_state(
                &config,
                products,
                PostgresOrderStore::new(pool),
                cache,
                publisher,
            );
            serve(api::create_app(state, metrics_handle), &config).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory stores");
            let state = api::create_state(
                &config,
                InMemoryProductStore::new(),
                InMemoryOrderStore::new(),
                cache,
                publisher,
            );
            serve(api::create_app(state, metrics_handle), &config).await;
        }
    }
}
