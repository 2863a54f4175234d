use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Optional half-open `[from, to)` window on the business timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Build a window, rejecting one whose start is not before its end.
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Result<Self, QueryError> {
        if let (Some(from), Some(to)) = (from, to)
            && from >= to
        {
            return Err(QueryError::InvalidWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// The whole table.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at < to)
    }
}

/// One row of a grouped count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub label: String,
    pub count: u64,
    /// Share of the window total, 0.0 to 100.0.
    pub percentage: f64,
}

impl GroupCount {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(label: impl Into<String>, count: u64, total: u64) -> Self {
        let percentage = if total > 0 {
            (count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            label: label.into(),
            count,
            percentage,
        }
    }

    /// Attach percentages to already ranked `(label, count)` pairs.
    pub fn from_ranked(ranked: Vec<(String, u64)>, total: u64) -> Vec<Self> {
        ranked
            .into_iter()
            .map(|(label, count)| Self::new(label, count, total))
            .collect()
    }
}

/// Order grouped counts by count descending, then label ascending, and keep
/// at most `limit` entries.
///
/// The label tie-break makes top-N output independent of hash or storage
/// order.
pub fn rank_counts(
    counts: impl IntoIterator<Item = (String, u64)>,
    limit: Option<usize>,
) -> Vec<(String, u64)> {
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| (Reverse(a.1), &a.0).cmp(&(Reverse(b.1), &b.0)));
    if let Some(limit) = limit {
        ranked.truncate(limit);
    }
    ranked
}

/// Aggregates over audit events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStatistics {
    pub window: TimeWindow,
    pub total: u64,
    pub unique_users: u64,
    pub unique_orders: u64,
    /// Events carrying both a before- and an after-status.
    pub status_changes: u64,
    pub top_actions: Vec<GroupCount>,
    pub by_user_type: Vec<GroupCount>,
}

/// Aggregates over query-log entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogStatistics {
    pub window: TimeWindow,
    pub total: u64,
    pub unique_users: u64,
    pub top_pages: Vec<GroupCount>,
    /// Most frequent statements, verbatim.
    pub top_queries: Vec<GroupCount>,
    pub operations: Vec<GroupCount>,
}
