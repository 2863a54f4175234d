use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;

use logscope_core::{AuditStatistics, GroupCount, QueryLogStatistics, TimeWindow};

use crate::entity::{AuditColumn, Column, LogEntity, QueryLogColumn};
use crate::error::StoreError;
use crate::filter::status_change;
use crate::predicate::{GroupKey, Predicate};
use crate::record::{AuditEvent, QueryLogEntry};
use crate::store::LogStore;

/// Length of every top-N list.
pub const TOP_N: usize = 10;

/// Predicates restricting `column` to `window`.
pub fn window_predicates<C: Column>(column: C, window: &TimeWindow) -> Vec<Predicate<C>> {
    let mut out = Vec::with_capacity(2);
    if let Some(from) = window.from {
        out.push(Predicate::AtOrAfter(column, from));
    }
    if let Some(to) = window.to {
        out.push(Predicate::Before(column, to));
    }
    out
}

/// Entity-specific grouped statistics over a time window.
///
/// The independent counts run concurrently against the store.
#[async_trait]
pub trait StatisticsAggregator: LogEntity {
    type Statistics: Debug + Clone + Serialize + Send + Sync + 'static;

    async fn aggregate(
        store: &dyn LogStore<Self>,
        window: TimeWindow,
    ) -> Result<Self::Statistics, StoreError>;
}

#[async_trait]
impl StatisticsAggregator for AuditEvent {
    type Statistics = AuditStatistics;

    async fn aggregate(
        store: &dyn LogStore<Self>,
        window: TimeWindow,
    ) -> Result<AuditStatistics, StoreError> {
        let scope = window_predicates(AuditColumn::Timestamp, &window);
        let mut changes = scope.clone();
        changes.push(status_change());

        let (total, unique_users, unique_orders, status_changes, top_actions, by_user_type) =
            tokio::try_join!(
                store.count(&scope),
                store.count_distinct(AuditColumn::UserId, &scope),
                store.count_distinct(AuditColumn::OrderId, &scope),
                store.count(&changes),
                store.group_counts(GroupKey::Column(AuditColumn::Action), &scope, Some(TOP_N)),
                store.group_counts(GroupKey::Column(AuditColumn::UserType), &scope, None),
            )?;

        Ok(AuditStatistics {
            window,
            total,
            unique_users,
            unique_orders,
            status_changes,
            top_actions: GroupCount::from_ranked(top_actions, total),
            by_user_type: GroupCount::from_ranked(by_user_type, total),
        })
    }
}

#[async_trait]
impl StatisticsAggregator for QueryLogEntry {
    type Statistics = QueryLogStatistics;

    async fn aggregate(
        store: &dyn LogStore<Self>,
        window: TimeWindow,
    ) -> Result<QueryLogStatistics, StoreError> {
        let scope = window_predicates(QueryLogColumn::Timestamp, &window);

        let (total, unique_users, top_pages, top_queries, operations) = tokio::try_join!(
            store.count(&scope),
            store.count_distinct(QueryLogColumn::UserId, &scope),
            store.group_counts(GroupKey::Column(QueryLogColumn::Page), &scope, Some(TOP_N)),
            store.group_counts(GroupKey::Column(QueryLogColumn::Query), &scope, Some(TOP_N)),
            store.group_counts(GroupKey::Operation(QueryLogColumn::Query), &scope, None),
        )?;

        Ok(QueryLogStatistics {
            window,
            total,
            unique_users,
            top_pages: GroupCount::from_ranked(top_pages, total),
            top_queries: GroupCount::from_ranked(top_queries, total),
            operations: GroupCount::from_ranked(operations, total),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn window_predicates_are_half_open() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let window = TimeWindow::new(Some(from), Some(to)).unwrap();
        assert_eq!(
            window_predicates(AuditColumn::Timestamp, &window),
            vec![
                Predicate::AtOrAfter(AuditColumn::Timestamp, from),
                Predicate::Before(AuditColumn::Timestamp, to),
            ]
        );
        assert!(window_predicates(AuditColumn::Timestamp, &TimeWindow::unbounded()).is_empty());
    }
}
