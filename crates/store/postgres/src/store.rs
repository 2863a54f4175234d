use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, info};

use logscope_core::Pagination;
use logscope_store::entity::{Column, LogEntity};
use logscope_store::error::StoreError;
use logscope_store::predicate::{GroupKey, Predicate, Sort};
use logscope_store::record::{AuditEvent, NewAuditEvent, NewQueryLogEntry, QueryLogEntry};
use logscope_store::store::LogStore;

use crate::config::PostgresLogConfig;
use crate::migrations;
use crate::sql::{column, group_label_expr, push_order, push_where};

/// Connect a pool sized by `config` and run migrations.
pub async fn connect(config: &PostgresLogConfig) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| StoreError::storage("connect", e))?;

    migrations::run_migrations(&pool, &config.prefix)
        .await
        .map_err(|e| StoreError::storage("migrate", e))?;

    info!(prefix = %config.prefix, "postgres log store ready");
    Ok(pool)
}

/// A log entity with a Postgres table.
pub trait PgEntity: LogEntity {
    /// Row type decoded by `SELECT *`.
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin + Into<Self>;

    /// Every column except `id`, in the order [`PgEntity::push_row`] binds them.
    const INSERT_COLUMNS: &'static str;

    /// Bind one write's values (all columns but `id`).
    fn push_row<'args>(
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        new: Self::New,
        created_at: DateTime<Utc>,
    );
}

/// Postgres-backed log store using `sqlx`.
///
/// One store per entity; both share a pool. The table is
/// `<prefix><entity name>`, e.g. `logscope_audit_log`.
pub struct PostgresLogStore<E> {
    pool: PgPool,
    table: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: PgEntity> PostgresLogStore<E> {
    /// Create from an existing, migrated pool.
    pub fn from_pool(pool: PgPool, prefix: &str) -> Self {
        Self {
            pool,
            table: format!("{prefix}{}", E::NAME),
            _entity: PhantomData,
        }
    }

    fn insert_prefix(&self) -> String {
        format!("INSERT INTO {} (id, {}) ", self.table, E::INSERT_COLUMNS)
    }

    /// Explicit id, or the next sequence value when absent.
    fn push_id(&self, row: &mut Separated<'_, '_, Postgres, &'static str>, id: Option<i64>) {
        row.push("COALESCE(")
            .push_bind_unseparated(id)
            .push_unseparated(format!(
                ", nextval(pg_get_serial_sequence('{}', 'id')))",
                self.table
            ));
    }

    fn insert_query(
        &self,
        records: impl IntoIterator<Item = E::New>,
    ) -> QueryBuilder<'static, Postgres> {
        let created_at = Utc::now();
        let mut qb = QueryBuilder::new(self.insert_prefix());
        qb.push_values(records, |mut row, new| {
            self.push_id(&mut row, E::requested_id(&new));
            E::push_row(&mut row, new, created_at);
        });
        qb
    }

    /// Open a transaction for writes that carry explicit ids.
    ///
    /// The table lock conflicts with the one every `INSERT` takes, so a
    /// concurrent fresh insert draws its id only after the sequence has been
    /// moved past the explicit ones.
    async fn begin_explicit(
        &self,
        operation: &'static str,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::storage(operation, e))?;
        sqlx::query(&lock_table_sql(&self.table))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::storage(operation, e))?;
        Ok(tx)
    }

    /// Move the id sequence past explicitly supplied ids.
    async fn resync_sequence(&self, conn: &mut PgConnection) -> Result<(), StoreError> {
        sqlx::query(&resync_sequence_sql(&self.table))
            .execute(conn)
            .await
            .map_err(|e| StoreError::storage("resync_sequence", e))?;
        Ok(())
    }

    async fn scalar(
        &self,
        operation: &'static str,
        mut qb: QueryBuilder<'_, Postgres>,
    ) -> Result<u64, StoreError> {
        let n: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::storage(operation, e))?;
        to_count(n)
    }
}

/// Grouped counts for `key`, skipping rows where the grouped column is null.
fn group_counts_query<C: Column>(
    table: &str,
    key: GroupKey<C>,
    predicates: &[Predicate<C>],
    limit: Option<usize>,
) -> QueryBuilder<'static, Postgres> {
    let grouped = match key {
        GroupKey::Column(c) | GroupKey::Operation(c) => c,
    };
    let mut scoped = predicates.to_vec();
    scoped.push(Predicate::IsNotNull(grouped));

    // "C" collation orders labels bytewise, the same as Rust string order.
    let mut qb = QueryBuilder::new(format!(
        r#"SELECT ({}) COLLATE "C" AS label, COUNT(*) AS cnt FROM {table}"#,
        group_label_expr(key)
    ));
    push_where(&mut qb, &scoped);
    qb.push(" GROUP BY 1 ORDER BY cnt DESC, label ASC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    qb
}

fn lock_table_sql(table: &str) -> String {
    format!("LOCK TABLE {table} IN SHARE ROW EXCLUSIVE MODE")
}

fn resync_sequence_sql(table: &str) -> String {
    format!(
        "SELECT setval(pg_get_serial_sequence('{table}', 'id'), \
         GREATEST((SELECT MAX(id) FROM {table}), 1))"
    )
}

fn to_count(n: i64) -> Result<u64, StoreError> {
    u64::try_from(n).map_err(|_| StoreError::Serialization(format!("negative count {n}")))
}

#[async_trait]
impl<E: PgEntity> LogStore<E> for PostgresLogStore<E> {
    async fn find_page(
        &self,
        predicates: &[Predicate<E::Column>],
        sort: &[Sort<E::Column>],
        pagination: Pagination,
    ) -> Result<(Vec<E>, u64), StoreError> {
        let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_where(&mut count, predicates);
        let total = self.scalar("find_page", count).await?;

        let mut data = QueryBuilder::new(format!("SELECT * FROM {}", self.table));
        push_where(&mut data, predicates);
        push_order(&mut data, sort);
        data.push(" LIMIT ")
            .push_bind(i64::from(pagination.take))
            .push(" OFFSET ")
            .push_bind(i64::try_from(pagination.skip).unwrap_or(i64::MAX));

        let rows: Vec<E::Row> = data
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::storage("find_page", e))?;

        debug!(table = %self.table, total, rows = rows.len(), "page fetched");
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<E>, StoreError> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table);

        let row = sqlx::query_as::<_, E::Row>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::storage("find_by_id", e))?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, record: E::New) -> Result<E, StoreError> {
        let requested = E::requested_id(&record);
        let mut qb = self.insert_query(std::iter::once(record));
        qb.push(" ON CONFLICT (id) DO NOTHING RETURNING *");

        let row: Option<E::Row> = if requested.is_some() {
            let mut tx = self.begin_explicit("insert").await?;
            let row = qb
                .build_query_as()
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StoreError::storage("insert", e))?;
            if row.is_some() {
                self.resync_sequence(&mut tx).await?;
            }
            tx.commit()
                .await
                .map_err(|e| StoreError::storage("insert", e))?;
            row
        } else {
            qb.build_query_as()
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::storage("insert", e))?
        };

        row.map(Into::into).ok_or(StoreError::Conflict {
            entity: E::NAME,
            id: requested.unwrap_or_default(),
        })
    }

    async fn insert_batch(&self, records: Vec<E::New>) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let has_explicit_ids = records.iter().any(|r| E::requested_id(r).is_some());
        let mut qb = self.insert_query(records);
        qb.push(" ON CONFLICT (id) DO NOTHING");

        if !has_explicit_ids {
            return Ok(qb
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::storage("insert_batch", e))?
                .rows_affected());
        }

        let mut tx = self.begin_explicit("insert_batch").await?;
        let inserted = qb
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::storage("insert_batch", e))?
            .rows_affected();
        if inserted > 0 {
            self.resync_sequence(&mut tx).await?;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::storage("insert_batch", e))?;
        Ok(inserted)
    }

    async fn count(&self, predicates: &[Predicate<E::Column>]) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_where(&mut qb, predicates);
        self.scalar("count", qb).await
    }

    async fn count_distinct(
        &self,
        col: E::Column,
        predicates: &[Predicate<E::Column>],
    ) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT COUNT(DISTINCT {}) FROM {}",
            column(col),
            self.table
        ));
        push_where(&mut qb, predicates);
        self.scalar("count_distinct", qb).await
    }

    async fn group_counts(
        &self,
        key: GroupKey<E::Column>,
        predicates: &[Predicate<E::Column>],
        limit: Option<usize>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let mut qb = group_counts_query(&self.table, key, predicates, limit);
        let rows: Vec<GroupRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::storage("group_counts", e))?;

        rows.into_iter()
            .map(|r| Ok((r.label, to_count(r.cnt)?)))
            .collect()
    }
}

/// Row type for grouped counts.
#[derive(sqlx::FromRow)]
struct GroupRow {
    label: String,
    cnt: i64,
}

/// Internal row type for mapping database rows to `AuditEvent`.
#[derive(sqlx::FromRow)]
pub struct AuditRow {
    id: i64,
    user_id: i64,
    user_type: i32,
    order_id: Option<i64>,
    action: String,
    order_status_from: Option<i32>,
    order_status_to: Option<i32>,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEvent {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            user_type: row.user_type,
            order_id: row.order_id,
            action: row.action,
            order_status_from: row.order_status_from,
            order_status_to: row.order_status_to,
            timestamp: row.timestamp,
            created_at: row.created_at,
        }
    }
}

impl PgEntity for AuditEvent {
    type Row = AuditRow;

    const INSERT_COLUMNS: &'static str = r#"user_id, user_type, order_id, action, order_status_from, order_status_to, "timestamp", created_at"#;

    fn push_row<'args>(
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        new: NewAuditEvent,
        created_at: DateTime<Utc>,
    ) {
        row.push_bind(new.user_id)
            .push_bind(new.user_type)
            .push_bind(new.order_id)
            .push_bind(new.action)
            .push_bind(new.order_status_from)
            .push_bind(new.order_status_to)
            .push_bind(new.timestamp)
            .push_bind(created_at);
    }
}

/// Internal row type for mapping database rows to `QueryLogEntry`.
#[derive(sqlx::FromRow)]
pub struct QueryLogRow {
    id: i64,
    user_id: Option<i64>,
    query: String,
    page: String,
    backtrace: String,
    timestamp: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<QueryLogRow> for QueryLogEntry {
    fn from(row: QueryLogRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            query: row.query,
            page: row.page,
            backtrace: row.backtrace,
            timestamp: row.timestamp,
            created_at: row.created_at,
        }
    }
}

impl PgEntity for QueryLogEntry {
    type Row = QueryLogRow;

    const INSERT_COLUMNS: &'static str =
        r#"user_id, query, page, backtrace, "timestamp", created_at"#;

    fn push_row<'args>(
        row: &mut Separated<'_, 'args, Postgres, &'static str>,
        new: NewQueryLogEntry,
        created_at: DateTime<Utc>,
    ) {
        row.push_bind(new.user_id)
            .push_bind(new.query)
            .push_bind(new.page)
            .push_bind(new.backtrace)
            .push_bind(new.timestamp)
            .push_bind(created_at);
    }
}
