use chrono::{DateTime, Utc};

/// Errors raised while validating a query before it reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// `page` was zero.
    #[error("page must be at least 1")]
    InvalidPage,

    /// `limit` or `take` fell outside the accepted range.
    #[error("{field} must be between 1 and {max}, got {value}")]
    LimitOutOfRange {
        /// Which parameter was rejected (`limit` or `take`).
        field: &'static str,
        /// The rejected value.
        value: u32,
        /// Upper bound (inclusive).
        max: u32,
    },

    /// The row offset, given as `skip` or derived from `page`, is too large.
    #[error("row offset must be at most {max}, got {value}")]
    SkipOutOfRange { value: u64, max: u64 },

    /// An archive age that reaches past the representable time range.
    #[error("olderThanDays {0} is out of range")]
    ArchiveAgeOutOfRange(u32),

    /// A sort field is not in the entity's whitelist.
    #[error("unknown sort field `{0}`")]
    UnknownSortField(String),

    /// A sort direction was neither `asc` nor `desc`.
    #[error("invalid sort direction `{0}` (expected asc or desc)")]
    InvalidSortDirection(String),

    /// An SQL operation name was not recognized.
    #[error("unknown sql operation `{0}`")]
    UnknownOperation(String),

    /// A statistics window whose start is not before its end.
    #[error("invalid time window: {from} is not before {to}")]
    InvalidWindow {
        /// Inclusive start.
        from: DateTime<Utc>,
        /// Exclusive end.
        to: DateTime<Utc>,
    },
}
