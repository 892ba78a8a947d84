use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{CacheBackend, CacheError, Result, glob_match};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL is too large to represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-memory cache backend for tests and single-process deployments.
///
/// Expiry is checked on read. Expired entries are purged when read, and
/// swept from the whole map on every write and pattern delete.
#[derive(Clone, Default)]
pub struct InMemoryCacheBackend {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    failing_deletes: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCacheBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Makes the next `count` deletions (single or by pattern) fail.
    pub fn fail_next_deletes(&self, count: u32) {
        self.failing_deletes.store(count, Ordering::SeqCst);
    }

    /// Makes every operation fail while `unavailable` is set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory backend switched off".into()));
        }
        Ok(())
    }

    fn check_delete(&self) -> Result<()> {
        self.check_available()?;
        let injected = self
            .failing_deletes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CacheError::Unavailable("injected delete failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: purge unless it was rewritten in between.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let now = Instant::now();
        let entry = Entry {
            value,
            expires_at: now.checked_add(ttl),
        };
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.is_live(now));
        entries.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_delete()?;
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64> {
        self.check_delete()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before - entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(removed as u64)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .is_some_and(|e| e.is_live(now)))
    }
}
