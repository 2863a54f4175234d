use async_trait::async_trait;
use chrono::{DateTime, Utc};

use logscope_core::Pagination;

use crate::entity::LogEntity;
use crate::error::StoreError;
use crate::predicate::{GroupKey, Predicate, Sort};

/// Trait for log storage backends.
///
/// Every method takes a predicate list that is ANDed together. Implementations
/// must be `Send + Sync` to be shared across async tasks.
#[async_trait]
pub trait LogStore<E: LogEntity>: Send + Sync {
    /// Fetch one page in `sort` order plus the total number of matching
    /// records. Both are computed against the same predicates.
    async fn find_page(
        &self,
        predicates: &[Predicate<E::Column>],
        sort: &[Sort<E::Column>],
        pagination: Pagination,
    ) -> Result<(Vec<E>, u64), StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<E>, StoreError>;

    /// Persist one record. An explicit id that is already taken is a
    /// [`StoreError::Conflict`].
    async fn insert(&self, record: E::New) -> Result<E, StoreError>;

    /// Persist a batch in a single backend call. Records whose explicit id
    /// is already taken are skipped. Returns the number actually inserted.
    async fn insert_batch(&self, records: Vec<E::New>) -> Result<u64, StoreError>;

    async fn count(&self, predicates: &[Predicate<E::Column>]) -> Result<u64, StoreError>;

    /// Distinct non-null values of `column`.
    async fn count_distinct(
        &self,
        column: E::Column,
        predicates: &[Predicate<E::Column>],
    ) -> Result<u64, StoreError>;

    /// `(label, count)` pairs ordered by count descending, then label
    /// ascending, truncated to `limit`.
    async fn group_counts(
        &self,
        key: GroupKey<E::Column>,
        predicates: &[Predicate<E::Column>],
        limit: Option<usize>,
    ) -> Result<Vec<(String, u64)>, StoreError>;

    /// Move records whose business timestamp is before `cutoff` out of the
    /// live table. Returns the number archived.
    ///
    /// No backend implements archival yet, so the default archives nothing.
    async fn archive_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        tracing::debug!(entity = E::NAME, %cutoff, "archival not supported by this store");
        Ok(0)
    }
}
