use async_trait::async_trait;

use crate::{Product, ProductId, Result, StockVersion};

/// Persistence seam for products.
///
/// Implementations must make [`ProductStore::update_stock`] atomic: the write
/// only lands when the stored version still equals `expected`, and a landed
/// write bumps the version. Everything else in the crate relies on that.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Loads a product by id, active or not.
    async fn get_by_id(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists active products ordered by name.
    async fn list_active(&self) -> Result<Vec<Product>>;

    /// Conditionally sets the stock quantity.
    ///
    /// Fails with [`crate::InventoryError::StockConflict`] when the stored
    /// version differs from `expected`, and with
    /// [`crate::InventoryError::ProductNotFound`] when the product is missing.
    /// Returns the new version.
    async fn update_stock(
        &self,
        id: ProductId,
        new_quantity: u32,
        expected: StockVersion,
    ) -> Result<StockVersion>;

    /// Inserts or replaces a product's catalog data, returning the stored row.
    async fn upsert(&self, product: Product) -> Result<Product>;
}
