//! Process-wide cache for rendered pages.
//!
//! Entries expire purely by age. Writes elsewhere in the application never
//! invalidate them, so a cached page may lag behind the store by up to the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

struct CachedPage {
    body: String,
    stored_at: Instant,
}

pub struct PageCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedPage>>,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(page) if page.stored_at.elapsed() < self.ttl => {
                    debug!(key, "page cache hit");
                    return Some(page.body.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.evict_stale(key)
    }

    /// Removes `key` if it is still expired under the write lock. Another
    /// worker may have stored a fresh page since the read, which is returned.
    fn evict_stale(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.write();
        let page = entries.get(key)?;
        if page.stored_at.elapsed() < self.ttl {
            return Some(page.body.clone());
        }
        entries.remove(key);
        debug!(key, "page cache entry expired");
        None
    }

    pub fn insert(&self, key: impl Into<String>, body: String) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.write().insert(
            key.into(),
            CachedPage {
                body,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, page| page.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for a request: the full path with query, plus who is looking.
pub fn page_key(path_and_query: &str, viewer: Option<i64>) -> String {
    match viewer {
        Some(id) => format!("{}|user:{}", path_and_query, id),
        None => format!("{}|anonymous", path_and_query),
    }
}
