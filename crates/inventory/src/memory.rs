use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::{InventoryError, Product, ProductId, ProductStore, Result, StockVersion};

/// In-memory product store for testing and single-process deployments.
///
/// Provides the same conditional-write contract as the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    products: Arc<RwLock<HashMap<ProductId, Product>>>,
    injected_conflicts: Arc<Mutex<HashMap<ProductId, u32>>>,
    injected_failures: Arc<Mutex<HashMap<ProductId, u32>>>,
}

impl InMemoryProductStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with the given products.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            // upsert on the in-memory store cannot fail
            let _ = store.upsert(product).await;
        }
        store
    }

    /// Returns the current stock of a product, if it exists.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.products
            .read()
            .await
            .get(&id)
            .map(|p| p.stock_quantity)
    }

    /// Makes the next `count` stock writes to `id` fail with a version conflict,
    /// as if another writer got there first.
    pub async fn inject_conflicts(&self, id: ProductId, count: u32) {
        self.injected_conflicts.lock().await.insert(id, count);
    }

    /// Makes the next `count` stock writes to `id` fail as if the backend
    /// were unreachable.
    pub async fn inject_failures(&self, id: ProductId, count: u32) {
        self.injected_failures.lock().await.insert(id, count);
    }

    async fn take_injected(injected: &Mutex<HashMap<ProductId, u32>>, id: ProductId) -> bool {
        let mut injected = injected.lock().await;
        match injected.get_mut(&id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Product>> {
        let products = self.products.read().await;
        let mut active: Vec<_> = products.values().filter(|p| p.is_active).cloned().collect();
        active.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn update_stock(
        &self,
        id: ProductId,
        new_quantity: u32,
        expected: StockVersion,
    ) -> Result<StockVersion> {
        if Self::take_injected(&self.injected_failures, id).await {
            return Err(InventoryError::Database(sqlx::Error::PoolTimedOut));
        }
        if Self::take_injected(&self.injected_conflicts, id).await {
            return Err(InventoryError::StockConflict {
                product_id: id,
                expected,
            });
        }

        let mut products = self.products.write().await;
        let product = products
            .get_mut(&id)
            .ok_or(InventoryError::ProductNotFound(id))?;

        if product.version != expected {
            return Err(InventoryError::StockConflict {
                product_id: id,
                expected,
            });
        }

        product.stock_quantity = new_quantity;
        product.version = product.version.next();
        product.updated_at = Some(Utc::now());
        Ok(product.version)
    }

    async fn upsert(&self, mut product: Product) -> Result<Product> {
        let mut products = self.products.write().await;
        match products.get(&product.id) {
            Some(existing) => {
                product.version = existing.version.next();
                product.created_at = existing.created_at;
                product.updated_at = Some(Utc::now());
            }
            None => product.version = StockVersion::first(),
        }
        products.insert(product.id, product.clone());
        Ok(product)
    }
}
