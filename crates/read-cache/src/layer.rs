use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheBackend, DEFAULT_TTL};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Read-through, write-invalidate cache.
///
/// Values are stored as JSON. The cache is advisory: backend failures
/// degrade to misses and skipped writes and never reach the caller. There is
/// no single-flight, so concurrent misses on one key each run their loader.
#[derive(Clone)]
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    retry_delay: Duration,
}

impl CacheLayer {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            default_ttl: DEFAULT_TTL,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the TTL callers get from [`CacheLayer::default_ttl`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets how long a failed invalidation waits before its single retry.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the cached value for `key`, or runs `loader` once and caches
    /// its result for `ttl`.
    ///
    /// Loader errors are returned unchanged and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.read(key).await {
            return Ok(hit);
        }

        let value = loader().await?;
        self.write(key, &value, ttl).await;
        Ok(value)
    }

    /// Like [`CacheLayer::get_or_load`], but a `None` from the loader is
    /// returned without being cached.
    pub async fn get_or_load_optional<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.read(key).await {
            return Ok(Some(hit));
        }

        let value = loader().await?;
        if let Some(found) = &value {
            self.write(key, found, ttl).await;
        }
        Ok(value)
    }

    /// Removes `key`. Failures are logged and retried once in the background.
    pub async fn invalidate(&self, key: &str) {
        let Err(e) = self.backend.delete(key).await else {
            tracing::debug!(key, "cache entry invalidated");
            return;
        };

        tracing::warn!(key, error = %e, "cache invalidation failed, scheduling retry");
        let backend = Arc::clone(&self.backend);
        let key = key.to_owned();
        let delay = self.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = backend.delete(&key).await {
                tracing::error!(
                    key = %key,
                    error = %e,
                    "cache invalidation retry failed, entry stays until its TTL expires"
                );
            }
        });
    }

    /// Removes every key matching a Redis-style glob. Failures are logged and
    /// retried once in the background.
    pub async fn invalidate_by_pattern(&self, pattern: &str) {
        match self.backend.delete_matching(pattern).await {
            Ok(removed) => {
                tracing::debug!(pattern, removed, "cache entries invalidated");
                return;
            }
            Err(e) => {
                tracing::warn!(pattern, error = %e, "pattern invalidation failed, scheduling retry");
            }
        }

        let backend = Arc::clone(&self.backend);
        let pattern = pattern.to_owned();
        let delay = self.retry_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = backend.delete_matching(&pattern).await {
                tracing::error!(pattern = %pattern, error = %e, "pattern invalidation retry failed");
            }
        });
    }

    /// Whether `key` is cached. A failing backend reads as absent.
    pub async fn exists(&self, key: &str) -> bool {
        match self.backend.exists(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache exists check failed");
                false
            }
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cached value is unreadable, treating as miss");
                None
            }
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize value for caching");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, bytes, ttl).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }
}
