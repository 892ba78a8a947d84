use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Key/value storage behind the cache layer.
///
/// Values are opaque bytes. Patterns passed to
/// [`CacheBackend::delete_matching`] use Redis glob syntax, see
/// [`crate::glob_match`].
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the stored value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Removes a key. Returns whether it was present.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every key matching `pattern`. Returns how many were removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;
}
