pub mod analysis;
pub mod error;
pub mod query;
pub mod sql;
pub mod stats;

pub use analysis::{Impact, OptimizationFinding, PatternAnalysis, analyze};
pub use error::QueryError;
pub use query::{
    DEFAULT_LIMIT, MAX_LIMIT, MAX_SKIP, Pagination, QuerySpec, SortDirection, SortField,
    canonicalize, parse_sort_list,
};
pub use sql::{SlowQueryHeuristic, SqlOperation, is_potentially_slow, slow_query_reasons};
pub use stats::{AuditStatistics, GroupCount, QueryLogStatistics, TimeWindow, rank_counts};
