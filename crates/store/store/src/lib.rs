pub mod cache;
pub mod entity;
pub mod error;
pub mod filter;
pub mod predicate;
pub mod record;
pub mod service;
pub mod stats;
pub mod store;

pub use cache::PageCache;
pub use entity::{AuditColumn, Column, FieldValue, LogEntity, QueryLogColumn};
pub use error::{BoxError, StoreError};
pub use filter::{AuditEventFilter, QueryLogFilter, day_bounds};
pub use predicate::{GroupKey, Predicate, Scalar, Sort, matches_all};
pub use record::{
    AnnotatedQueryLog, AuditEvent, LogPage, NewAuditEvent, NewQueryLogEntry, PageMeta,
    QueryLogEntry,
};
pub use service::{ArchiveSummary, BULK_INSERT_BATCH_SIZE, BulkInsertSummary, LogService};
pub use stats::{StatisticsAggregator, TOP_N};
pub use store::LogStore;
