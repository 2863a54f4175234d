use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::QueryError;

/// Page size used when a request names neither `limit` nor `take`.
pub const DEFAULT_LIMIT: u32 = 25;

/// Largest accepted `limit` / `take`.
pub const MAX_LIMIT: u32 = 1000;

/// Largest accepted row offset, explicit or derived from `page`.
pub const MAX_SKIP: u64 = i64::MAX.unsigned_abs();

/// Direction of a single sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// SQL keyword for this direction.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(QueryError::InvalidSortDirection(s.to_owned()))
        }
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_direction() -> SortDirection {
    SortDirection::Desc
}

/// One entry of a sort list. The first entry is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default = "default_direction")]
    pub direction: SortDirection,
}

impl SortField {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Parse the compact query-string form `field:dir,field2:dir`.
///
/// The direction is optional and defaults to `desc`. Empty segments are
/// skipped, so `""` parses to an empty list.
pub fn parse_sort_list(raw: &str) -> Result<Vec<SortField>, QueryError> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(':') {
            Some((field, dir)) => Ok(SortField::new(field.trim(), dir.parse()?)),
            None => Ok(SortField::desc(segment)),
        })
        .collect()
}

/// Fully resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Rows to skip.
    pub skip: u64,
    /// Rows to fetch. Always equal to `limit`.
    pub take: u32,
    /// 1-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u32,
}

impl Pagination {
    /// Whether `skip` lands exactly on a page boundary.
    pub fn is_page_aligned(&self) -> bool {
        self.skip == self.page.saturating_sub(1).saturating_mul(u64::from(self.limit))
    }
}

/// Request-scoped pagination, filter, sort and search bundle.
///
/// `F` is the entity-specific filter payload. A query is never persisted;
/// it is built per request and reduced to a [`Pagination`] and a list of
/// predicates by the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec<F> {
    /// 1-based page number (default 1).
    #[serde(default)]
    pub page: Option<u64>,
    /// Page size (default depends on the endpoint).
    #[serde(default)]
    pub limit: Option<u32>,
    /// Low-level offset. Wins over `page` when present.
    #[serde(default)]
    pub skip: Option<u64>,
    /// Low-level page size. Wins over `limit` when present.
    #[serde(default)]
    pub take: Option<u32>,
    /// Entity-specific filter payload.
    #[serde(default)]
    pub filter: F,
    /// Sort list, primary field first.
    #[serde(default)]
    pub sort: Vec<SortField>,
    /// Free-text search term.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(skip, default = "default_limit")]
    default_limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

impl<F: Default> Default for QuerySpec<F> {
    fn default() -> Self {
        Self::new(F::default())
    }
}

impl<F> QuerySpec<F> {
    pub fn new(filter: F) -> Self {
        Self {
            page: None,
            limit: None,
            skip: None,
            take: None,
            filter,
            sort: Vec::new(),
            search: None,
            default_limit: DEFAULT_LIMIT,
        }
    }

    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn with_take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn with_sort(mut self, field: SortField) -> Self {
        self.sort.push(field);
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set the page size used when neither `limit` nor `take` is given.
    #[must_use]
    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    /// The trimmed search term, if it is non-empty.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Resolve `page`/`limit`/`skip`/`take` into a single window.
    ///
    /// `take` wins over `limit`; `skip` wins over `page`, in which case the
    /// page is back-computed as `skip / limit + 1`.
    pub fn effective_pagination(&self) -> Pagination {
        let limit = self
            .take
            .or(self.limit)
            .unwrap_or(self.default_limit)
            .max(1);
        let wide_limit = u64::from(limit);

        match self.skip {
            Some(skip) => Pagination {
                skip,
                take: limit,
                page: (skip / wide_limit).saturating_add(1),
                limit,
            },
            None => {
                let page = self.page.unwrap_or(1).max(1);
                Pagination {
                    skip: (page - 1).saturating_mul(wide_limit),
                    take: limit,
                    page,
                    limit,
                }
            }
        }
    }

    /// Check pagination bounds and that every sort field is accepted.
    pub fn validate(&self, is_sortable: impl Fn(&str) -> bool) -> Result<(), QueryError> {
        if self.page == Some(0) {
            return Err(QueryError::InvalidPage);
        }
        let skip = self.effective_pagination().skip;
        if skip > MAX_SKIP {
            return Err(QueryError::SkipOutOfRange {
                value: skip,
                max: MAX_SKIP,
            });
        }
        for (field, value) in [("limit", self.limit), ("take", self.take)] {
            if let Some(value) = value
                && !(1..=MAX_LIMIT).contains(&value)
            {
                return Err(QueryError::LimitOutOfRange {
                    field,
                    value,
                    max: MAX_LIMIT,
                });
            }
        }
        if let Some(unknown) = self.sort.iter().find(|s| !is_sortable(&s.field)) {
            return Err(QueryError::UnknownSortField(unknown.field.clone()));
        }
        Ok(())
    }

    /// The order-by expression used in cache keys: `field.dir` pairs in
    /// sort-list order, comma separated.
    pub fn order_expression(&self) -> String {
        self.sort
            .iter()
            .map(|s| format!("{}.{}", s.field, s.direction))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<F: Serialize> QuerySpec<F> {
    /// Deterministic cache key for this query.
    ///
    /// Segments are joined with `:` and absent segments are omitted. The
    /// search term is written as a JSON string so it cannot forge the
    /// segments that follow it. The filter payload is serialized as
    /// canonical JSON (sorted keys, `null` members dropped), so two specs
    /// with the same effective filters produce the same key regardless of
    /// key order in the source object.
    pub fn cache_key(&self, prefix: &str) -> String {
        let pagination = self.effective_pagination();
        let mut segments = Vec::with_capacity(7);

        if !prefix.is_empty() {
            segments.push(prefix.to_owned());
        }
        segments.push(format!("page:{}", pagination.page));
        segments.push(format!("limit:{}", pagination.limit));
        if !pagination.is_page_aligned() {
            segments.push(format!("skip:{}", pagination.skip));
        }

        let order = self.order_expression();
        if !order.is_empty() {
            segments.push(format!("order:{order}"));
        }
        if let Some(term) = self.search_term() {
            segments.push(format!("search:{}", Value::from(term)));
        }
        if let Some(filters) = canonical_filter_json(&self.filter) {
            segments.push(format!("filters:{filters}"));
        }

        segments.join(":")
    }
}

fn canonical_filter_json<F: Serialize>(filter: &F) -> Option<String> {
    let value = canonicalize(serde_json::to_value(filter).ok()?);
    match &value {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        _ => Some(value.to_string()),
    }
}

/// Sort object keys recursively and drop `null` members.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
