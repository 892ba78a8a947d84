use thiserror::Error;

/// Errors raised by cache backends.
///
/// [`crate::CacheLayer`] never surfaces these to its callers; they are logged
/// and the operation degrades to a miss or a skipped write.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Result type for cache backend operations.
pub type Result<T> = std::result::Result<T, CacheError>;
