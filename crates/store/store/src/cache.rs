use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;

use crate::entity::LogEntity;
use crate::record::LogPage;

/// A bounded, TTL-based cache of search pages backed by [`moka`].
///
/// Keys are scoped by a generation counter. [`PageCache::invalidate`] bumps
/// the generation before clearing, so a page computed before a write but
/// stored after it lands under a stale key and is never served.
pub struct PageCache<E: LogEntity> {
    pages: Cache<String, Arc<LogPage<E>>>,
    generation: AtomicU64,
}

impl<E: LogEntity> PageCache<E> {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let pages = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self {
            pages,
            generation: AtomicU64::new(0),
        }
    }

    /// Prefix `key` with the current generation.
    pub fn scoped_key(&self, key: &str) -> String {
        format!("{}:{key}", self.generation.load(Ordering::Acquire))
    }

    pub async fn get(&self, scoped_key: &str) -> Option<Arc<LogPage<E>>> {
        self.pages.get(scoped_key).await
    }

    pub async fn insert(&self, scoped_key: String, page: Arc<LogPage<E>>) {
        self.pages.insert(scoped_key, page).await;
    }

    /// Drop every cached page.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.pages.invalidate_all();
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<E: LogEntity> std::fmt::Debug for PageCache<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("entity", &E::NAME)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use logscope_core::Pagination;

    use super::*;
    use crate::record::AuditEvent;

    fn empty_page() -> Arc<LogPage<AuditEvent>> {
        Arc::new(LogPage::new(
            Vec::new(),
            0,
            Pagination {
                skip: 0,
                take: 25,
                page: 1,
                limit: 25,
            },
        ))
    }

    #[tokio::test]
    async fn invalidate_hides_earlier_keys() {
        let cache = PageCache::<AuditEvent>::new(100, Duration::from_secs(60));
        let before = cache.scoped_key("audit_log:page:1:limit:25");
        cache.insert(before.clone(), empty_page()).await;
        assert!(cache.get(&before).await.is_some());

        cache.invalidate();
        assert!(cache.get(&before).await.is_none());

        // A page computed before the write and stored after it stays unreachable.
        cache.insert(before.clone(), empty_page()).await;
        let after = cache.scoped_key("audit_log:page:1:limit:25");
        assert_ne!(before, after);
        assert!(cache.get(&after).await.is_none());
    }
}
