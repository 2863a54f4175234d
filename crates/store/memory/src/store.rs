use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use logscope_core::{Pagination, SortDirection, rank_counts};
use logscope_store::entity::LogEntity;
use logscope_store::error::StoreError;
use logscope_store::predicate::{GroupKey, Predicate, Sort, matches_all};
use logscope_store::store::LogStore;

/// In-memory log store using `DashMap`. Suitable for development and testing.
///
/// Records are keyed by id. Fresh ids come from a counter that is raised past
/// every explicit id seen, so replayed legacy rows never collide with later
/// fresh ones.
pub struct MemoryLogStore<E: LogEntity> {
    records: DashMap<i64, E>,
    /// Highest id handed out or observed.
    last_id: AtomicI64,
}

impl<E: LogEntity> MemoryLogStore<E> {
    /// Create a new empty in-memory log store.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            last_id: AtomicI64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Store `new` unless its explicit id is taken. The duplicate check and
    /// the write happen under one map-entry lock.
    fn place(&self, new: E::New, created_at: DateTime<Utc>) -> Result<E, i64> {
        if let Some(id) = E::requested_id(&new) {
            self.last_id.fetch_max(id, Ordering::SeqCst);
            return match self.records.entry(id) {
                Entry::Occupied(_) => Err(id),
                Entry::Vacant(slot) => {
                    let record = E::materialize(new, id, created_at);
                    slot.insert(record.clone());
                    Ok(record)
                }
            };
        }

        loop {
            let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
            if let Entry::Vacant(slot) = self.records.entry(id) {
                let record = E::materialize(new, id, created_at);
                slot.insert(record.clone());
                return Ok(record);
            }
        }
    }

    fn matching(&self, predicates: &[Predicate<E::Column>]) -> Vec<E> {
        self.records
            .iter()
            .filter(|entry| matches_all(predicates, entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }
}

impl<E: LogEntity> Default for MemoryLogStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn compare<E: LogEntity>(a: &E, b: &E, sort: &[Sort<E::Column>]) -> CmpOrdering {
    sort.iter()
        .map(|s| {
            let ord = a.field(s.column).cmp(&b.field(s.column));
            match s.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(CmpOrdering::Equal)
}

#[async_trait]
impl<E: LogEntity> LogStore<E> for MemoryLogStore<E> {
    async fn find_page(
        &self,
        predicates: &[Predicate<E::Column>],
        sort: &[Sort<E::Column>],
        pagination: Pagination,
    ) -> Result<(Vec<E>, u64), StoreError> {
        let mut matching = self.matching(predicates);
        matching.sort_by(|a, b| compare(a, b, sort));

        let total = matching.len() as u64;
        let skip = usize::try_from(pagination.skip).unwrap_or(usize::MAX);
        let take = usize::try_from(pagination.take).unwrap_or(usize::MAX);
        let items = matching.into_iter().skip(skip).take(take).collect();
        Ok((items, total))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<E>, StoreError> {
        Ok(self.records.get(&id).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: E::New) -> Result<E, StoreError> {
        self.place(record, Utc::now())
            .map_err(|id| StoreError::Conflict {
                entity: E::NAME,
                id,
            })
    }

    async fn insert_batch(&self, records: Vec<E::New>) -> Result<u64, StoreError> {
        let created_at = Utc::now();
        let inserted = records
            .into_iter()
            .filter_map(|new| self.place(new, created_at).ok())
            .count();
        Ok(inserted as u64)
    }

    async fn count(&self, predicates: &[Predicate<E::Column>]) -> Result<u64, StoreError> {
        let count = self
            .records
            .iter()
            .filter(|entry| matches_all(predicates, entry.value()))
            .count();
        Ok(count as u64)
    }

    async fn count_distinct(
        &self,
        column: E::Column,
        predicates: &[Predicate<E::Column>],
    ) -> Result<u64, StoreError> {
        let distinct: HashSet<String> = self
            .records
            .iter()
            .filter(|entry| matches_all(predicates, entry.value()))
            .filter_map(|entry| entry.value().field(column).label())
            .collect();
        Ok(distinct.len() as u64)
    }

    async fn group_counts(
        &self,
        key: GroupKey<E::Column>,
        predicates: &[Predicate<E::Column>],
        limit: Option<usize>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in &self.records {
            let record = entry.value();
            if !matches_all(predicates, record) {
                continue;
            }
            if let Some(label) = key.label_of(record) {
                *counts.entry(label).or_default() += 1;
            }
        }
        Ok(rank_counts(counts, limit))
    }
}
