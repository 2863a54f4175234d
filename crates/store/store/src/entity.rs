use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use logscope_core::{QueryError, SortField};

use crate::filter::{AuditEventFilter, QueryLogFilter};
use crate::predicate::{Predicate, Sort};
use crate::record::{AuditEvent, NewAuditEvent, NewQueryLogEntry, QueryLogEntry};

/// A whitelisted column of a log entity.
///
/// Columns are the only way a caller-supplied field name reaches a backend,
/// so every identifier that ends up in SQL comes from [`Column::name`].
pub trait Column: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    const ALL: &'static [Self];

    /// Database column name.
    fn name(self) -> &'static str;

    /// External (camelCase) field name.
    fn field(self) -> &'static str;

    /// Whether callers may sort on this column.
    fn sortable(self) -> bool;

    /// Look a column up by external or database name.
    fn parse(field: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.field() == field || c.name() == field)
    }
}

/// A borrowed column value used for in-memory evaluation and ordering.
///
/// `Null` is declared last so it sorts after every value, matching
/// Postgres' default `NULLS LAST` for ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue<'a> {
    Int(i64),
    Text(&'a str),
    Time(DateTime<Utc>),
    Null,
}

impl<'a> FieldValue<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text form used as a group label. `None` for null.
    pub fn label(&self) -> Option<String> {
        match self {
            Self::Int(v) => Some(v.to_string()),
            Self::Text(s) => Some((*s).to_owned()),
            Self::Time(t) => Some(t.to_rfc3339()),
            Self::Null => None,
        }
    }
}

impl From<Option<i64>> for FieldValue<'_> {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Null, Self::Int)
    }
}

impl From<Option<i32>> for FieldValue<'_> {
    fn from(value: Option<i32>) -> Self {
        value.map_or(Self::Null, |v| Self::Int(i64::from(v)))
    }
}

/// A stored log record kind.
pub trait LogEntity:
    Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Column: Column;
    type Filter: Debug + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static;
    type New: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Short entity name, used in errors, logs and cache keys.
    const NAME: &'static str;
    const ID: Self::Column;
    /// Business timestamp column.
    const TIMESTAMP: Self::Column;

    fn id(&self) -> i64;

    fn field(&self, column: Self::Column) -> FieldValue<'_>;

    /// Translate a filter payload and optional search term into predicates
    /// that are ANDed together.
    fn compile_filter(
        filter: &Self::Filter,
        search: Option<&str>,
    ) -> Vec<Predicate<Self::Column>>;

    /// Explicit id carried by a write, if any.
    fn requested_id(new: &Self::New) -> Option<i64>;

    /// Build the stored record from a write.
    fn materialize(new: Self::New, id: i64, created_at: DateTime<Utc>) -> Self;

    fn is_sortable(field: &str) -> bool {
        Self::Column::parse(field).is_some_and(Column::sortable)
    }

    /// Resolve a requested sort list. An empty list means `timestamp desc`;
    /// `id desc` is appended as a tie-break unless already present.
    fn resolve_sort(fields: &[SortField]) -> Result<Vec<Sort<Self::Column>>, QueryError> {
        let mut sort = fields
            .iter()
            .map(|f| {
                Self::Column::parse(&f.field)
                    .filter(|c| c.sortable())
                    .map(|column| Sort::new(column, f.direction))
                    .ok_or_else(|| QueryError::UnknownSortField(f.field.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if sort.is_empty() {
            sort.push(Sort::desc(Self::TIMESTAMP));
        }
        if !sort.iter().any(|s| s.column == Self::ID) {
            sort.push(Sort::desc(Self::ID));
        }
        Ok(sort)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditColumn {
    Id,
    UserId,
    UserType,
    OrderId,
    Action,
    OrderStatusFrom,
    OrderStatusTo,
    Timestamp,
    CreatedAt,
}

impl Column for AuditColumn {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::UserId,
        Self::UserType,
        Self::OrderId,
        Self::Action,
        Self::OrderStatusFrom,
        Self::OrderStatusTo,
        Self::Timestamp,
        Self::CreatedAt,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "user_id",
            Self::UserType => "user_type",
            Self::OrderId => "order_id",
            Self::Action => "action",
            Self::OrderStatusFrom => "order_status_from",
            Self::OrderStatusTo => "order_status_to",
            Self::Timestamp => "timestamp",
            Self::CreatedAt => "created_at",
        }
    }

    fn field(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "userId",
            Self::UserType => "userType",
            Self::OrderId => "orderId",
            Self::Action => "action",
            Self::OrderStatusFrom => "orderStatusFrom",
            Self::OrderStatusTo => "orderStatusTo",
            Self::Timestamp => "timestamp",
            Self::CreatedAt => "createdAt",
        }
    }

    fn sortable(self) -> bool {
        true
    }
}

impl LogEntity for AuditEvent {
    type Column = AuditColumn;
    type Filter = AuditEventFilter;
    type New = NewAuditEvent;

    const NAME: &'static str = "audit_log";
    const ID: AuditColumn = AuditColumn::Id;
    const TIMESTAMP: AuditColumn = AuditColumn::Timestamp;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: AuditColumn) -> FieldValue<'_> {
        match column {
            AuditColumn::Id => FieldValue::Int(self.id),
            AuditColumn::UserId => FieldValue::Int(self.user_id),
            AuditColumn::UserType => FieldValue::Int(i64::from(self.user_type)),
            AuditColumn::OrderId => self.order_id.into(),
            AuditColumn::Action => FieldValue::Text(&self.action),
            AuditColumn::OrderStatusFrom => self.order_status_from.into(),
            AuditColumn::OrderStatusTo => self.order_status_to.into(),
            AuditColumn::Timestamp => FieldValue::Time(self.timestamp),
            AuditColumn::CreatedAt => FieldValue::Time(self.created_at),
        }
    }

    fn compile_filter(
        filter: &AuditEventFilter,
        search: Option<&str>,
    ) -> Vec<Predicate<AuditColumn>> {
        filter.compile(search)
    }

    fn requested_id(new: &NewAuditEvent) -> Option<i64> {
        new.id
    }

    fn materialize(new: NewAuditEvent, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            user_type: new.user_type,
            order_id: new.order_id,
            action: new.action,
            order_status_from: new.order_status_from,
            order_status_to: new.order_status_to,
            timestamp: new.timestamp,
            created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryLogColumn {
    Id,
    UserId,
    Query,
    Page,
    Backtrace,
    Timestamp,
    CreatedAt,
}

impl Column for QueryLogColumn {
    const ALL: &'static [Self] = &[
        Self::Id,
        Self::UserId,
        Self::Query,
        Self::Page,
        Self::Backtrace,
        Self::Timestamp,
        Self::CreatedAt,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "user_id",
            Self::Query => "query",
            Self::Page => "page",
            Self::Backtrace => "backtrace",
            Self::Timestamp => "timestamp",
            Self::CreatedAt => "created_at",
        }
    }

    fn field(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::UserId => "userId",
            Self::Query => "query",
            Self::Page => "page",
            Self::Backtrace => "backtrace",
            Self::Timestamp => "timestamp",
            Self::CreatedAt => "createdAt",
        }
    }

    // Statement and backtrace text are unbounded; sorting on them is refused.
    fn sortable(self) -> bool {
        !matches!(self, Self::Query | Self::Backtrace)
    }
}

impl LogEntity for QueryLogEntry {
    type Column = QueryLogColumn;
    type Filter = QueryLogFilter;
    type New = NewQueryLogEntry;

    const NAME: &'static str = "query_log";
    const ID: QueryLogColumn = QueryLogColumn::Id;
    const TIMESTAMP: QueryLogColumn = QueryLogColumn::Timestamp;

    fn id(&self) -> i64 {
        self.id
    }

    fn field(&self, column: QueryLogColumn) -> FieldValue<'_> {
        match column {
            QueryLogColumn::Id => FieldValue::Int(self.id),
            QueryLogColumn::UserId => self.user_id.into(),
            QueryLogColumn::Query => FieldValue::Text(&self.query),
            QueryLogColumn::Page => FieldValue::Text(&self.page),
            QueryLogColumn::Backtrace => FieldValue::Text(&self.backtrace),
            QueryLogColumn::Timestamp => FieldValue::Time(self.timestamp),
            QueryLogColumn::CreatedAt => FieldValue::Time(self.created_at),
        }
    }

    fn compile_filter(
        filter: &QueryLogFilter,
        search: Option<&str>,
    ) -> Vec<Predicate<QueryLogColumn>> {
        filter.compile(search)
    }

    fn requested_id(new: &NewQueryLogEntry) -> Option<i64> {
        new.id
    }

    fn materialize(new: NewQueryLogEntry, id: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: new.user_id,
            query: new.query,
            page: new.page,
            backtrace: new.backtrace,
            timestamp: new.timestamp,
            created_at,
        }
    }
}
