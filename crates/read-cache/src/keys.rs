//! Cache key scheme shared by every reader and writer of product data.

use std::time::Duration;

use common::ProductId;

/// Key of the cached active-product list.
pub const ALL_PRODUCTS_KEY: &str = "products:all";

/// Pattern matching every single-product key.
pub const PRODUCT_KEY_PATTERN: &str = "product:*";

/// Default lifetime of a cached entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Key of a single cached product.
pub fn product_key(id: ProductId) -> String {
    format!("product:{id}")
}
