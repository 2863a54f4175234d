use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use logscope_core::{PatternAnalysis, QueryError, QuerySpec, TimeWindow, analyze};

use crate::cache::PageCache;
use crate::entity::LogEntity;
use crate::error::StoreError;
use crate::record::{AnnotatedQueryLog, LogPage, QueryLogEntry};
use crate::stats::StatisticsAggregator;
use crate::store::LogStore;

/// Records handed to the store per `insert_batch` call.
pub const BULK_INSERT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkInsertSummary {
    pub created: u64,
    /// Records dropped because their id already existed.
    pub skipped: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub archived: u64,
}

/// Search, lookup, ingestion and statistics over one log entity.
pub struct LogService<E: LogEntity> {
    store: Arc<dyn LogStore<E>>,
    cache: Option<Arc<PageCache<E>>>,
}

impl<E: LogEntity> Clone for LogService<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cache: self.cache.clone(),
        }
    }
}

impl<E: LogEntity> LogService<E> {
    pub fn new(store: Arc<dyn LogStore<E>>) -> Self {
        Self { store, cache: None }
    }

    /// Serve repeated searches from `cache`. Every write invalidates it.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<PageCache<E>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate `spec`, run it against the store and assemble the page.
    pub async fn search(&self, spec: &QuerySpec<E::Filter>) -> Result<LogPage<E>, StoreError> {
        spec.validate(E::is_sortable)?;
        let sort = E::resolve_sort(&spec.sort)?;

        let key = self
            .cache
            .as_ref()
            .map(|cache| cache.scoped_key(&spec.cache_key(E::NAME)));
        if let (Some(cache), Some(key)) = (&self.cache, &key)
            && let Some(hit) = cache.get(key).await
        {
            debug!(entity = E::NAME, %key, "search served from cache");
            return Ok(LogPage::clone(&hit));
        }

        let predicates = E::compile_filter(&spec.filter, spec.search_term());
        let pagination = spec.effective_pagination();
        let (items, total) = self
            .store
            .find_page(&predicates, &sort, pagination)
            .await?;

        debug!(
            entity = E::NAME,
            predicates = predicates.len(),
            page = pagination.page,
            limit = pagination.limit,
            total,
            "search"
        );

        let page = LogPage::new(items, total, pagination);
        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, Arc::new(page.clone())).await;
        }
        Ok(page)
    }

    pub async fn get(&self, id: i64) -> Result<E, StoreError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: E::NAME,
                id,
            })
    }

    pub async fn record(&self, new: E::New) -> Result<E, StoreError> {
        let record = self.store.insert(new).await?;
        self.invalidate_cache();
        debug!(entity = E::NAME, id = record.id(), "recorded");
        Ok(record)
    }

    /// Insert `records` in chunks of [`BULK_INSERT_BATCH_SIZE`], one store
    /// call per chunk. A failing chunk aborts the remaining ones; chunks
    /// already written stay written. The cache is invalidated after every
    /// chunk that wrote rows, so a caller that stops polling this future
    /// midway never leaves stale pages behind.
    pub async fn bulk_insert(
        &self,
        records: Vec<E::New>,
    ) -> Result<BulkInsertSummary, StoreError> {
        let attempted = records.len();
        let mut summary = BulkInsertSummary::default();
        let mut pending = records.into_iter().peekable();
        let mut batch_no = 0usize;

        while pending.peek().is_some() {
            let batch: Vec<E::New> = pending.by_ref().take(BULK_INSERT_BATCH_SIZE).collect();
            let size = batch.len() as u64;
            batch_no += 1;

            let inserted = match self.store.insert_batch(batch).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        entity = E::NAME,
                        batch = batch_no,
                        created = summary.created,
                        error = %e,
                        "bulk insert aborted"
                    );
                    return Err(e);
                }
            };
            if inserted > 0 {
                self.invalidate_cache();
            }

            summary.created += inserted;
            summary.skipped += size.saturating_sub(inserted);
            info!(
                entity = E::NAME,
                batch = batch_no,
                size,
                inserted,
                "bulk insert batch written"
            );
        }

        info!(
            entity = E::NAME,
            attempted,
            created = summary.created,
            skipped = summary.skipped,
            "bulk insert complete"
        );
        Ok(summary)
    }

    /// Archive records whose business timestamp is older than
    /// `older_than_days` days.
    pub async fn archive_old_logs(
        &self,
        older_than_days: u32,
    ) -> Result<ArchiveSummary, StoreError> {
        let cutoff = Duration::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or(QueryError::ArchiveAgeOutOfRange(older_than_days))?;
        let archived = self.store.archive_before(cutoff).await?;
        if archived > 0 {
            self.invalidate_cache();
        }
        info!(entity = E::NAME, %cutoff, archived, "archive run");
        Ok(ArchiveSummary { archived })
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate();
        }
    }
}

impl<E: StatisticsAggregator> LogService<E> {
    pub async fn statistics(&self, window: TimeWindow) -> Result<E::Statistics, StoreError> {
        let stats = E::aggregate(self.store.as_ref(), window).await?;
        debug!(entity = E::NAME, bounded = window.is_bounded(), "statistics computed");
        Ok(stats)
    }
}

impl LogService<QueryLogEntry> {
    /// Search and annotate every entry with its operation and slow-query flag.
    pub async fn search_annotated(
        &self,
        spec: &QuerySpec<<QueryLogEntry as LogEntity>::Filter>,
    ) -> Result<LogPage<AnnotatedQueryLog>, StoreError> {
        Ok(self.search(spec).await?.map(AnnotatedQueryLog::from))
    }

    pub async fn analyze_patterns(
        &self,
        window: TimeWindow,
    ) -> Result<PatternAnalysis, StoreError> {
        let analysis = analyze(self.statistics(window).await?);
        debug!(
            findings = analysis.performance_insights.len(),
            "query log patterns analyzed"
        );
        Ok(analysis)
    }
}
