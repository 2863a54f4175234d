use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use logscope_core::{Pagination, SlowQueryHeuristic, SqlOperation, slow_query_reasons};

/// One user action, optionally tied to an order status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: i64,
    pub user_id: i64,
    pub user_type: i32,
    pub order_id: Option<i64>,
    /// Free-text description of what happened.
    pub action: String,
    pub order_status_from: Option<i32>,
    pub order_status_to: Option<i32>,
    /// Business time. May be backdated by migrated rows.
    pub timestamp: DateTime<Utc>,
    /// Ingestion time, set by the store.
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Both the before- and after-status are present.
    pub fn is_status_change(&self) -> bool {
        self.order_status_from.is_some() && self.order_status_to.is_some()
    }
}

/// Write-side shape of an [`AuditEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEvent {
    /// Original id of a migrated row. Fresh rows leave this empty.
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: i64,
    pub user_type: i32,
    #[serde(default)]
    pub order_id: Option<i64>,
    pub action: String,
    #[serde(default)]
    pub order_status_from: Option<i32>,
    #[serde(default)]
    pub order_status_to: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// One SQL statement captured by the application, with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub query: String,
    /// Endpoint path that issued the statement.
    pub page: String,
    pub backtrace: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Write-side shape of a [`QueryLogEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQueryLogEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub query: String,
    pub page: String,
    #[serde(default)]
    pub backtrace: String,
    pub timestamp: DateTime<Utc>,
}

/// A query-log entry plus the record-level heuristics computed on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedQueryLog {
    #[serde(flatten)]
    pub entry: QueryLogEntry,
    pub potentially_slow: bool,
    /// Heuristics that fired, empty when `potentially_slow` is false.
    pub slow_reasons: Vec<SlowQueryHeuristic>,
    pub operation: SqlOperation,
}

impl From<QueryLogEntry> for AnnotatedQueryLog {
    fn from(entry: QueryLogEntry) -> Self {
        let slow_reasons = slow_query_reasons(&entry.query);
        Self {
            potentially_slow: !slow_reasons.is_empty(),
            slow_reasons,
            operation: SqlOperation::classify(&entry.query),
            entry,
        }
    }
}

/// Pagination metadata returned alongside every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Records matching the query, before pagination.
    pub total: u64,
    pub page: u64,
    pub limit: u32,
    pub total_pages: u64,
    pub has_next_page: bool,
    /// Records on this page.
    pub count: u64,
}

/// A page of records and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPage<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> LogPage<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let count = items.len() as u64;
        Self {
            meta: PageMeta {
                total,
                page: pagination.page,
                limit: pagination.limit,
                total_pages: total.div_ceil(u64::from(pagination.limit.max(1))),
                has_next_page: pagination.skip.saturating_add(count) < total,
                count,
            },
            items,
        }
    }

    /// Convert every item, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> LogPage<U> {
        LogPage {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pagination(skip: u64, limit: u32) -> Pagination {
        Pagination {
            skip,
            take: limit,
            page: skip / u64::from(limit) + 1,
            limit,
        }
    }

    #[test]
    fn meta_for_middle_and_last_page() {
        let page = LogPage::new(vec![1, 2, 3, 4, 5], 12, pagination(5, 5));
        assert_eq!(page.meta.page, 2);
        assert_eq!(page.meta.total_pages, 3);
        assert_eq!(page.meta.count, 5);
        assert!(page.meta.has_next_page);

        let last = LogPage::new(vec![11, 12], 12, pagination(10, 5));
        assert_eq!(last.meta.page, 3);
        assert_eq!(last.meta.count, 2);
        assert!(!last.meta.has_next_page);
    }

    #[test]
    fn empty_result_has_zero_pages() {
        let page: LogPage<i32> = LogPage::new(Vec::new(), 0, pagination(0, 25));
        assert_eq!(page.meta.total_pages, 0);
        assert!(!page.meta.has_next_page);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let page = LogPage::new(vec!["a"], 1, pagination(0, 10)).map(str::to_uppercase);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["items"][0], "A");
        assert_eq!(json["meta"]["totalPages"], 1);
        assert_eq!(json["meta"]["hasNextPage"], false);
    }

    #[test]
    fn annotation_classifies_statement() {
        let now = Utc::now();
        let annotated = AnnotatedQueryLog::from(QueryLogEntry {
            id: 1,
            user_id: None,
            query: "SELECT * FROM orders".into(),
            page: "/orders".into(),
            backtrace: String::new(),
            timestamp: now,
            created_at: now,
        });
        assert!(annotated.potentially_slow);
        assert_eq!(annotated.operation, SqlOperation::Select);

        let json = serde_json::to_value(&annotated).unwrap();
        assert_eq!(json["potentiallySlow"], true);
        assert_eq!(json["slowReasons"], serde_json::json!(["select_star"]));
        assert_eq!(json["operation"], "SELECT");
        assert_eq!(json["page"], "/orders");
    }
}
