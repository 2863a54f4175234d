use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use logscope_core::SqlOperation;

use crate::entity::{AuditColumn, QueryLogColumn};
use crate::predicate::Predicate;

/// `[date 00:00 UTC, date + 1 day)`.
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1))
}

fn day_predicates<C: Copy>(column: C, date: NaiveDate) -> [Predicate<C>; 2] {
    let (start, end) = day_bounds(date);
    [Predicate::AtOrAfter(column, start), Predicate::Before(column, end)]
}

/// Filters accepted by audit-log searches. Every field is optional; an
/// absent field places no constraint, and zero or empty values are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditEventFilter {
    pub user_id: Option<i64>,
    pub user_type: Option<i32>,
    pub order_id: Option<i64>,
    /// Exact action text.
    pub action: Option<String>,
    pub action_contains: Option<String>,
    pub order_status_from: Option<i32>,
    pub order_status_to: Option<i32>,
    /// Inclusive.
    pub timestamp_from: Option<DateTime<Utc>>,
    /// Inclusive.
    pub timestamp_to: Option<DateTime<Utc>>,
    /// Whole calendar day (UTC).
    pub date: Option<NaiveDate>,
    /// `true`: order id present, `false`: absent.
    pub has_order: Option<bool>,
    /// `true`: both status fields present, `false`: not both present.
    pub is_status_change: Option<bool>,
}

/// Both the before- and after-status are recorded.
pub fn status_change() -> Predicate<AuditColumn> {
    Predicate::And(vec![
        Predicate::IsNotNull(AuditColumn::OrderStatusFrom),
        Predicate::IsNotNull(AuditColumn::OrderStatusTo),
    ])
}

impl AuditEventFilter {
    /// Compile into ANDed predicates. `search` matches anywhere in the
    /// action text.
    pub fn compile(&self, search: Option<&str>) -> Vec<Predicate<AuditColumn>> {
        let mut out = Vec::new();

        if let Some(v) = self.user_id {
            out.push(Predicate::equals(AuditColumn::UserId, v));
        }
        if let Some(v) = self.user_type {
            out.push(Predicate::equals(AuditColumn::UserType, v));
        }
        if let Some(v) = self.order_id {
            out.push(Predicate::equals(AuditColumn::OrderId, v));
        }
        if let Some(v) = &self.action {
            out.push(Predicate::equals(AuditColumn::Action, v.as_str()));
        }
        if let Some(v) = &self.action_contains {
            out.push(Predicate::contains(AuditColumn::Action, v.as_str()));
        }
        if let Some(v) = self.order_status_from {
            out.push(Predicate::equals(AuditColumn::OrderStatusFrom, v));
        }
        if let Some(v) = self.order_status_to {
            out.push(Predicate::equals(AuditColumn::OrderStatusTo, v));
        }
        if let Some(v) = self.timestamp_from {
            out.push(Predicate::AtOrAfter(AuditColumn::Timestamp, v));
        }
        if let Some(v) = self.timestamp_to {
            out.push(Predicate::AtOrBefore(AuditColumn::Timestamp, v));
        }
        if let Some(date) = self.date {
            out.extend(day_predicates(AuditColumn::Timestamp, date));
        }
        match self.has_order {
            Some(true) => out.push(Predicate::IsNotNull(AuditColumn::OrderId)),
            Some(false) => out.push(Predicate::IsNull(AuditColumn::OrderId)),
            None => {}
        }
        match self.is_status_change {
            Some(true) => out.push(status_change()),
            Some(false) => out.push(Predicate::negate(status_change())),
            None => {}
        }
        if let Some(term) = search {
            out.push(Predicate::contains(AuditColumn::Action, term));
        }

        out
    }
}

/// Filters accepted by query-log searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryLogFilter {
    pub user_id: Option<i64>,
    /// Exact endpoint path.
    pub page: Option<String>,
    pub page_contains: Option<String>,
    pub query_contains: Option<String>,
    pub backtrace_contains: Option<String>,
    pub timestamp_from: Option<DateTime<Utc>>,
    pub timestamp_to: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
    pub operation: Option<SqlOperation>,
    /// `true`: a slow-query heuristic fires, `false`: none does.
    pub potentially_slow: Option<bool>,
}

impl QueryLogFilter {
    /// Compile into ANDed predicates. `search` matches the statement text
    /// or the endpoint path.
    pub fn compile(&self, search: Option<&str>) -> Vec<Predicate<QueryLogColumn>> {
        let mut out = Vec::new();

        if let Some(v) = self.user_id {
            out.push(Predicate::equals(QueryLogColumn::UserId, v));
        }
        if let Some(v) = &self.page {
            out.push(Predicate::equals(QueryLogColumn::Page, v.as_str()));
        }
        for (column, needle) in [
            (QueryLogColumn::Page, &self.page_contains),
            (QueryLogColumn::Query, &self.query_contains),
            (QueryLogColumn::Backtrace, &self.backtrace_contains),
        ] {
            if let Some(needle) = needle {
                out.push(Predicate::contains(column, needle.as_str()));
            }
        }
        if let Some(v) = self.timestamp_from {
            out.push(Predicate::AtOrAfter(QueryLogColumn::Timestamp, v));
        }
        if let Some(v) = self.timestamp_to {
            out.push(Predicate::AtOrBefore(QueryLogColumn::Timestamp, v));
        }
        if let Some(date) = self.date {
            out.extend(day_predicates(QueryLogColumn::Timestamp, date));
        }
        if let Some(op) = self.operation {
            out.push(Predicate::Operation(QueryLogColumn::Query, op));
        }
        match self.potentially_slow {
            Some(true) => out.push(Predicate::PotentiallySlow(QueryLogColumn::Query)),
            Some(false) => out.push(Predicate::negate(Predicate::PotentiallySlow(
                QueryLogColumn::Query,
            ))),
            None => {}
        }
        if let Some(term) = search {
            out.push(Predicate::Or(vec![
                Predicate::contains(QueryLogColumn::Query, term),
                Predicate::contains(QueryLogColumn::Page, term),
            ]));
        }

        out
    }
}
