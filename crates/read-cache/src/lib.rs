//! Read-through, write-invalidate caching.
//!
//! [`CacheLayer`] sits in front of a slower system of record. Reads go
//! through [`CacheLayer::get_or_load`]; writers call
//! [`CacheLayer::invalidate`] after committing. Storage is pluggable via
//! [`CacheBackend`]: [`InMemoryCacheBackend`] always, and `RedisCacheBackend`
//! with the `redis` feature.

pub mod backend;
pub mod error;
pub mod keys;
pub mod layer;
pub mod memory;
pub mod pattern;
#[cfg(feature = "redis")]
pub mod redis_backend;

pub use backend::CacheBackend;
pub use error::{CacheError, Result};
pub use keys::{ALL_PRODUCTS_KEY, DEFAULT_TTL, PRODUCT_KEY_PATTERN, product_key};
pub use layer::CacheLayer;
pub use memory::InMemoryCacheBackend;
pub use pattern::glob_match;
#[cfg(feature = "redis")]
pub use redis_backend::RedisCacheBackend;
