//! Query-string and body shapes accepted by the log endpoints.
//!
//! Filter fields are spelled out per entity instead of flattening the store
//! filters, so numeric and boolean parameters decode straight from the
//! query string.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use logscope_core::{QueryError, QuerySpec, SqlOperation, TimeWindow, parse_sort_list};
use logscope_store::{AuditEventFilter, QueryLogFilter};

use crate::error::ServerError;

/// Pagination, sort and search parameters shared by every search endpoint.
struct Paging {
    page: Option<u64>,
    limit: Option<u32>,
    skip: Option<u64>,
    take: Option<u32>,
    sort: Option<String>,
    search: Option<String>,
}

impl Paging {
    fn into_spec<F>(self, filter: F, default_limit: u32) -> Result<QuerySpec<F>, QueryError> {
        let mut spec = QuerySpec::new(filter).with_default_limit(default_limit);
        spec.page = self.page;
        spec.limit = self.limit;
        spec.skip = self.skip;
        spec.take = self.take;
        spec.search = self.search;
        if let Some(raw) = self.sort.as_deref() {
            spec.sort = parse_sort_list(raw)?;
        }
        Ok(spec)
    }
}

/// `GET /v1/audit-logs` parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSearchParams {
    pub page: Option<u64>,
    pub limit: Option<u32>,
    pub skip: Option<u64>,
    pub take: Option<u32>,
    /// Compact sort list, e.g. `timestamp:desc,userId:asc`.
    pub sort: Option<String>,
    /// Free text matched against the action.
    pub search: Option<String>,
    pub user_id: Option<i64>,
    pub user_type: Option<i32>,
    pub order_id: Option<i64>,
    pub action: Option<String>,
    pub action_contains: Option<String>,
    pub order_status_from: Option<i32>,
    pub order_status_to: Option<i32>,
    pub timestamp_from: Option<DateTime<Utc>>,
    pub timestamp_to: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
    pub has_order: Option<bool>,
    pub is_status_change: Option<bool>,
}

impl AuditSearchParams {
    pub fn into_spec(self, default_limit: u32) -> Result<QuerySpec<AuditEventFilter>, QueryError> {
        let filter = AuditEventFilter {
            user_id: self.user_id,
            user_type: self.user_type,
            order_id: self.order_id,
            action: self.action,
            action_contains: self.action_contains,
            order_status_from: self.order_status_from,
            order_status_to: self.order_status_to,
            timestamp_from: self.timestamp_from,
            timestamp_to: self.timestamp_to,
            date: self.date,
            has_order: self.has_order,
            is_status_change: self.is_status_change,
        };
        Paging {
            page: self.page,
            limit: self.limit,
            skip: self.skip,
            take: self.take,
            sort: self.sort,
            search: self.search,
        }
        .into_spec(filter, default_limit)
    }
}

/// `GET /v1/query-logs` parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLogSearchParams {
    pub page: Option<u64>,
    pub limit: Option<u32>,
    pub skip: Option<u64>,
    pub take: Option<u32>,
    pub sort: Option<String>,
    /// Free text matched against the statement or the endpoint path.
    pub search: Option<String>,
    pub user_id: Option<i64>,
    /// Exact endpoint path. The page number is `page`.
    #[serde(rename = "pagePath")]
    pub page_path: Option<String>,
    pub page_contains: Option<String>,
    pub query_contains: Option<String>,
    pub backtrace_contains: Option<String>,
    pub timestamp_from: Option<DateTime<Utc>>,
    pub timestamp_to: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
    pub operation: Option<SqlOperation>,
    pub potentially_slow: Option<bool>,
}

impl QueryLogSearchParams {
    pub fn into_spec(self, default_limit: u32) -> Result<QuerySpec<QueryLogFilter>, QueryError> {
        let filter = QueryLogFilter {
            user_id: self.user_id,
            page: self.page_path,
            page_contains: self.page_contains,
            query_contains: self.query_contains,
            backtrace_contains: self.backtrace_contains,
            timestamp_from: self.timestamp_from,
            timestamp_to: self.timestamp_to,
            date: self.date,
            operation: self.operation,
            potentially_slow: self.potentially_slow,
        };
        Paging {
            page: self.page,
            limit: self.limit,
            skip: self.skip,
            take: self.take,
            sort: self.sort,
            search: self.search,
        }
        .into_spec(filter, default_limit)
    }
}

/// `fromDate` / `toDate` bounds of a statistics window.
///
/// Each accepts an RFC 3339 instant or a plain `YYYY-MM-DD` date, read as
/// midnight UTC. The window is `[fromDate, toDate)`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowParams {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

impl WindowParams {
    pub fn into_window(self) -> Result<TimeWindow, ServerError> {
        let from = self.from_date.as_deref().map(parse_instant).transpose()?;
        let to = self.to_date.as_deref().map(parse_instant).transpose()?;
        Ok(TimeWindow::new(from, to)?)
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, ServerError> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| ServerError::BadRequest(format!("invalid date `{raw}`")))
}

/// `POST /v1/*/archive` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRequest {
    pub older_than_days: u32,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use logscope_core::SortDirection;

    use super::*;

    #[test]
    fn audit_params_build_a_spec() {
        let params = AuditSearchParams {
            page: Some(3),
            sort: Some("userId:asc,timestamp".into()),
            user_id: Some(0),
            is_status_change: Some(true),
            ..Default::default()
        };
        let spec = params.into_spec(25).unwrap();
        let pagination = spec.effective_pagination();
        assert_eq!((pagination.skip, pagination.limit, pagination.page), (50, 25, 3));
        assert_eq!(spec.sort.len(), 2);
        assert_eq!(spec.sort[0].field, "userId");
        assert_eq!(spec.sort[0].direction, SortDirection::Asc);
        assert_eq!(spec.sort[1].direction, SortDirection::Desc);
        assert_eq!(spec.filter.user_id, Some(0));
        assert_eq!(spec.filter.is_status_change, Some(true));
    }

    #[test]
    fn query_log_params_use_the_endpoint_default_limit() {
        let params = QueryLogSearchParams {
            page_path: Some("/orders".into()),
            ..Default::default()
        };
        let spec = params.into_spec(100).unwrap();
        assert_eq!(spec.effective_pagination().limit, 100);
        assert_eq!(spec.filter.page.as_deref(), Some("/orders"));
    }

    #[test]
    fn bad_sort_direction_is_rejected() {
        let params = AuditSearchParams {
            sort: Some("timestamp:sideways".into()),
            ..Default::default()
        };
        assert!(matches!(
            params.into_spec(25),
            Err(QueryError::InvalidSortDirection(_))
        ));
    }

    #[test]
    fn window_accepts_dates_and_instants() {
        let window = WindowParams {
            from_date: Some("2024-01-01".into()),
            to_date: Some("2024-02-01T12:00:00+02:00".into()),
        }
        .into_window()
        .unwrap();
        assert_eq!(
            window.from,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            window.to,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn inverted_or_garbled_windows_are_rejected() {
        let inverted = WindowParams {
            from_date: Some("2024-02-01".into()),
            to_date: Some("2024-01-01".into()),
        };
        assert!(matches!(
            inverted.into_window(),
            Err(ServerError::Store(_))
        ));

        let garbled = WindowParams {
            from_date: Some("last tuesday".into()),
            to_date: None,
        };
        assert!(matches!(garbled.into_window(), Err(ServerError::BadRequest(_))));
    }
}
