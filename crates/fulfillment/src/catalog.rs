//! Cached catalog reads and admin stock writes.

use common::ProductId;
use inventory::{InventoryStore, Product, ProductStore, StockChange};
use messaging::{DomainEvent, EventPublisher, ProductStockUpdated};
use read_cache::{ALL_PRODUCTS_KEY, CacheLayer, product_key};

use crate::service::{invalidate_products, publish};
use crate::{FulfillmentError, FulfillmentMetrics, Result};

/// Product reads through the cache, and stock writes that keep it coherent.
#[derive(Clone)]
pub struct CatalogService<P> {
    inventory: InventoryStore<P>,
    cache: CacheLayer,
    publisher: EventPublisher,
    metrics: FulfillmentMetrics,
}

impl<P: ProductStore> CatalogService<P> {
    pub fn new(
        inventory: InventoryStore<P>,
        cache: CacheLayer,
        publisher: EventPublisher,
        metrics: FulfillmentMetrics,
    ) -> Self {
        Self {
            inventory,
            cache,
            publisher,
            metrics,
        }
    }

    /// Loads an active product. Missing and inactive products are not cached.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: ProductId) -> Result<Product> {
        let inventory = &self.inventory;
        let product = self
            .cache
            .get_or_load_optional(&product_key(product_id), self.cache.default_ttl(), || async move {
                inventory
                    .product(product_id)
                    .await
                    .map(|found| found.filter(|p| p.is_active))
            })
            .await?;

        product.ok_or_else(|| FulfillmentError::product_not_found(product_id))
    }

    /// Lists active products by name.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let store = self.inventory.store();
        let products = self
            .cache
            .get_or_load(ALL_PRODUCTS_KEY, self.cache.default_ttl(), || async move {
                store.list_active().await
            })
            .await?;
        Ok(products)
    }

    /// Stores a product's catalog data, replacing any previous row.
    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn upsert_product(&self, product: Product) -> Result<Product> {
        let stored = self.inventory.store().upsert(product).await?;
        invalidate_products(&self.cache, [stored.id]).await;
        tracing::info!(product_id = %stored.id, "product stored");
        Ok(stored)
    }

    /// Sets a product's stock to `quantity` and announces the change.
    #[tracing::instrument(skip(self, reason))]
    pub async fn set_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        reason: impl Into<String>,
    ) -> Result<StockChange> {
        let change = self.inventory.set_stock(product_id, quantity).await?;

        invalidate_products(&self.cache, [product_id]).await;
        publish(
            &self.publisher,
            &self.metrics,
            DomainEvent::new(ProductStockUpdated {
                product_id,
                previous_stock: change.previous_stock,
                new_stock: change.new_stock,
                reason: reason.into(),
            }),
        )
        .await;

        self.metrics.stock_updated();
        tracing::info!(
            %product_id,
            previous = change.previous_stock,
            new = change.new_stock,
            "stock updated"
        );
        Ok(change)
    }
}
